//! Session manager: sole owner of the current session.
//!
//! DESIGN
//! ======
//! The manager subscribes to the backend's session-change notifications
//! before recovering the persisted session, so no event can slip between the
//! two. A background task is the only writer of the state and applies each
//! notification in delivery order; everyone else reads through a
//! `watch::Receiver`.
//!
//! LIFECYCLE
//! =========
//! `start` acquires exactly one subscription. It is owned by the listener
//! task and released when that task ends, either through `shutdown` or when
//! the manager is dropped (which aborts the task).

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::backend::{BackendError, IdentityBackend};
use crate::model::{Session, SessionEvent};
use crate::navigation::{self, Route};

/// Authentication state as seen by the rest of the application.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Unauthenticated,
    Authenticated(Session),
}

impl SessionState {
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        match self {
            Self::Authenticated(session) => Some(session),
            Self::Unauthenticated => None,
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

impl From<Option<Session>> for SessionState {
    fn from(session: Option<Session>) -> Self {
        session.map_or(Self::Unauthenticated, Self::Authenticated)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignOutError {
    #[error("not signed in")]
    NotSignedIn,
    #[error("sign-out failed: {0}")]
    Backend(#[from] BackendError),
}

pub struct SessionManager {
    identity: Arc<dyn IdentityBackend>,
    state: watch::Receiver<SessionState>,
    listener: Option<JoinHandle<()>>,
}

impl SessionManager {
    /// Subscribe, recover the persisted session, and start applying notifications.
    ///
    /// A failed recovery is logged and treated as no session.
    pub async fn start(identity: Arc<dyn IdentityBackend>) -> Self {
        let mut subscription = identity.on_session_change();

        let initial = match identity.current_session().await {
            Ok(session) => SessionState::from(session),
            Err(e) => {
                warn!(error = %e, "session recovery failed; starting signed out");
                SessionState::Unauthenticated
            }
        };
        match initial.session() {
            Some(session) => info!(user_id = %session.user_id(), "session recovered"),
            None => info!("no session to recover"),
        }

        let (tx, rx) = watch::channel(initial);
        let listener = tokio::spawn(async move {
            while let Some(event) = subscription.next().await {
                apply(&tx, event);
            }
            info!("session notification stream closed");
        });

        Self { identity, state: rx, listener: Some(listener) }
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    /// A receiver that observes every state change.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Where `current` should redirect to under the current state.
    #[must_use]
    pub fn redirect_for(&self, current: Route) -> Option<Route> {
        navigation::redirect(current, &self.state.borrow())
    }

    /// Ask the backend to end the session.
    ///
    /// Local state is not touched here; it changes when the backend's
    /// signed-out notification arrives.
    ///
    /// # Errors
    ///
    /// [`SignOutError::NotSignedIn`] without a session, or the backend failure.
    pub async fn sign_out(&self) -> Result<(), SignOutError> {
        let session = self
            .state
            .borrow()
            .session()
            .cloned()
            .ok_or(SignOutError::NotSignedIn)?;
        if let Err(e) = self.identity.sign_out(&session).await {
            warn!(user_id = %session.user_id(), error = %e, "sign-out failed");
            return Err(e.into());
        }
        info!(user_id = %session.user_id(), "sign-out requested");
        Ok(())
    }

    /// Stop applying notifications and release the subscription.
    pub async fn shutdown(mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
            let _ = listener.await;
        }
        info!("session manager stopped");
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

fn apply(tx: &watch::Sender<SessionState>, event: SessionEvent) {
    let next = SessionState::from(event.session);
    match next.session() {
        Some(session) => info!(kind = ?event.kind, user_id = %session.user_id(), "session changed"),
        None => info!(kind = ?event.kind, "session ended"),
    }
    tx.send_replace(next);
}
