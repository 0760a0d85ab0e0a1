//! In-memory backend double for tests.
//!
//! Implements both backend traits over plain maps, counts every call, can
//! fail the next call of a given operation, and can hold responses until
//! released so tests can interleave session changes with in-flight requests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use uuid::Uuid;

use super::{BackendError, DataBackend, IdentityBackend, SessionListeners, Subscription};
use crate::model::{Link, LinkPatch, NewLink, Profile, Session, SessionEvent, SessionUser};

/// Backend operations, for call counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    CurrentSession,
    SignIn,
    SignUp,
    Reset,
    SignOut,
    FetchProfile,
    FetchLinks,
    Insert,
    Update,
    Delete,
}

struct Account {
    user_id: Uuid,
    password: String,
    confirmed: bool,
}

#[derive(Default)]
struct FakeState {
    persisted: Option<Session>,
    accounts: HashMap<String, Account>,
    auto_confirm: bool,
    profiles: HashMap<Uuid, Profile>,
    links: Vec<Link>,
    clock: i64,
    calls: HashMap<Op, usize>,
    failures: HashMap<Op, String>,
}

#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<FakeState>,
    listeners: SessionListeners,
    gate: Mutex<Option<Arc<Notify>>>,
}

/// Build a session for `user_id` the way the backend would issue it.
#[must_use]
pub fn session_for(user_id: Uuid) -> Session {
    Session {
        access_token: format!("access-{user_id}"),
        refresh_token: Some(format!("refresh-{user_id}")),
        expires_at: None,
        user: SessionUser { id: user_id, email: None },
    }
}

/// Build a link row with an explicit `created_at` offset in seconds.
#[must_use]
pub fn link_row(user_id: Uuid, title: &str, url: &str, at_secs: i64) -> Link {
    Link {
        id: Uuid::new_v4(),
        user_id,
        title: title.to_owned(),
        url: url.to_owned(),
        logo_url: None,
        created_at: time::OffsetDateTime::UNIX_EPOCH + time::Duration::seconds(at_secs),
    }
}

impl FakeBackend {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a confirmed account and return its user id.
    pub fn add_account(&self, email: &str, password: &str) -> Uuid {
        let user_id = Uuid::new_v4();
        self.state.lock().unwrap().accounts.insert(
            email.to_owned(),
            Account { user_id, password: password.to_owned(), confirmed: true },
        );
        user_id
    }

    /// Register an account that has not confirmed its email yet.
    pub fn add_unconfirmed_account(&self, email: &str, password: &str) {
        self.state.lock().unwrap().accounts.insert(
            email.to_owned(),
            Account { user_id: Uuid::new_v4(), password: password.to_owned(), confirmed: false },
        );
    }

    /// Issue sessions immediately on sign-up instead of requiring confirmation.
    pub fn set_auto_confirm(&self, on: bool) {
        self.state.lock().unwrap().auto_confirm = on;
    }

    pub fn set_persisted(&self, session: Option<Session>) {
        self.state.lock().unwrap().persisted = session;
    }

    pub fn put_profile(&self, profile: Profile) {
        self.state
            .lock()
            .unwrap()
            .profiles
            .insert(profile.user_id, profile);
    }

    /// Insert a row directly, bypassing the trait (e.g. another user's link).
    pub fn put_link(&self, link: Link) {
        self.state.lock().unwrap().links.push(link);
    }

    /// Fail the next call of `op` with `message`.
    pub fn fail_next(&self, op: Op, message: &str) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(op, message.to_owned());
    }

    #[must_use]
    pub fn calls(&self, op: Op) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(&op)
            .copied()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn data_calls(&self) -> usize {
        [Op::FetchProfile, Op::FetchLinks, Op::Insert, Op::Update, Op::Delete]
            .into_iter()
            .map(|op| self.calls(op))
            .sum()
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Emit a session event as if the backend had observed it.
    pub fn emit(&self, event: &SessionEvent) {
        self.listeners.emit(event);
    }

    /// Hold every subsequent response until [`FakeBackend::release`].
    pub fn hold(&self) {
        *self.gate.lock().unwrap() = Some(Arc::new(Notify::new()));
    }

    /// Release held responses and stop holding new ones.
    pub fn release(&self) {
        if let Some(gate) = self.gate.lock().unwrap().take() {
            gate.notify_waiters();
            gate.notify_one();
        }
    }

    /// Record the call, wait on the gate, then consume an injected failure.
    async fn enter(&self, op: Op) -> Result<(), BackendError> {
        *self.state.lock().unwrap().calls.entry(op).or_default() += 1;
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        match self.state.lock().unwrap().failures.remove(&op) {
            Some(message) => Err(BackendError::with_status(400, message)),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl IdentityBackend for FakeBackend {
    async fn current_session(&self) -> Result<Option<Session>, BackendError> {
        self.enter(Op::CurrentSession).await?;
        Ok(self.state.lock().unwrap().persisted.clone())
    }

    fn on_session_change(&self) -> Subscription {
        self.listeners.subscribe()
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        self.enter(Op::SignIn).await?;
        let session = {
            let mut state = self.state.lock().unwrap();
            let account = state
                .accounts
                .get(email)
                .filter(|a| a.password == password)
                .ok_or_else(|| BackendError::with_status(400, "Invalid login credentials"))?;
            if !account.confirmed {
                return Err(BackendError::with_status(400, "Email not confirmed"));
            }
            let session = session_for(account.user_id);
            state.persisted = Some(session.clone());
            session
        };
        self.listeners.emit(&SessionEvent::signed_in(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str, full_name: &str) -> Result<Option<Session>, BackendError> {
        self.enter(Op::SignUp).await?;
        let session = {
            let mut state = self.state.lock().unwrap();
            if state.accounts.contains_key(email) {
                return Err(BackendError::with_status(422, "User already registered"));
            }
            let user_id = Uuid::new_v4();
            let confirmed = state.auto_confirm;
            state
                .accounts
                .insert(email.to_owned(), Account { user_id, password: password.to_owned(), confirmed });
            state.profiles.insert(
                user_id,
                Profile { user_id, full_name: full_name.to_owned(), bio: None, avatar_url: None },
            );
            if !confirmed {
                return Ok(None);
            }
            let session = session_for(user_id);
            state.persisted = Some(session.clone());
            session
        };
        self.listeners.emit(&SessionEvent::signed_in(session.clone()));
        Ok(Some(session))
    }

    async fn send_password_reset(&self, _email: &str) -> Result<(), BackendError> {
        self.enter(Op::Reset).await
    }

    async fn sign_out(&self, _session: &Session) -> Result<(), BackendError> {
        self.enter(Op::SignOut).await?;
        self.state.lock().unwrap().persisted = None;
        self.listeners.emit(&SessionEvent::signed_out());
        Ok(())
    }
}

#[async_trait::async_trait]
impl DataBackend for FakeBackend {
    async fn fetch_profile(&self, session: &Session) -> Result<Option<Profile>, BackendError> {
        self.enter(Op::FetchProfile).await?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .profiles
            .get(&session.user_id())
            .cloned())
    }

    async fn fetch_links(&self, session: &Session) -> Result<Vec<Link>, BackendError> {
        self.enter(Op::FetchLinks).await?;
        let state = self.state.lock().unwrap();
        let mut rows: Vec<Link> = state
            .links
            .iter()
            .filter(|l| l.user_id == session.user_id())
            .cloned()
            .collect();
        rows.sort_by_key(|l| l.created_at);
        Ok(rows)
    }

    async fn insert_link(&self, _session: &Session, link: &NewLink) -> Result<Link, BackendError> {
        self.enter(Op::Insert).await?;
        let mut state = self.state.lock().unwrap();
        state.clock += 1;
        let row = Link {
            logo_url: link.logo_url.clone(),
            ..link_row(link.user_id, &link.title, &link.url, 1_700_000_000 + state.clock)
        };
        state.links.push(row.clone());
        Ok(row)
    }

    async fn update_link(&self, session: &Session, id: Uuid, patch: &LinkPatch) -> Result<(), BackendError> {
        self.enter(Op::Update).await?;
        let mut state = self.state.lock().unwrap();
        let row = state
            .links
            .iter_mut()
            .find(|l| l.id == id && l.user_id == session.user_id())
            .ok_or_else(|| BackendError::with_status(404, "link not found"))?;
        row.title.clone_from(&patch.title);
        row.url.clone_from(&patch.url);
        Ok(())
    }

    async fn delete_link(&self, session: &Session, id: Uuid) -> Result<(), BackendError> {
        self.enter(Op::Delete).await?;
        let mut state = self.state.lock().unwrap();
        let before = state.links.len();
        state
            .links
            .retain(|l| !(l.id == id && l.user_id == session.user_id()));
        if state.links.len() == before {
            return Err(BackendError::with_status(404, "link not found"));
        }
        Ok(())
    }
}
