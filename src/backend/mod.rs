//! Backend seams: identity/session provider and row-level data service.
//!
//! ARCHITECTURE
//! ============
//! Everything remote sits behind two traits so the session manager, auth
//! dispatcher and entity store can be driven by the HTTP adapter in
//! production and by an in-memory double in tests.
//!
//! ERROR HANDLING
//! ==============
//! Backends report failures as a single opaque [`BackendError`] carrying the
//! raw message. Classification into user-facing categories happens in the
//! layer that owns the user flow, not here.

pub mod http;
pub mod listeners;

#[cfg(test)]
pub mod fake;

use uuid::Uuid;

use crate::model::{Link, LinkPatch, NewLink, Profile, Session};
pub use listeners::{SessionListeners, Subscription};

/// Raw failure reported by a backend call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct BackendError {
    /// HTTP status when the failure came from a response.
    pub status: Option<u16>,
    pub message: String,
}

impl BackendError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self { status: None, message: message.into() }
    }

    #[must_use]
    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self { status: Some(status), message: message.into() }
    }

    /// `true` for a 4xx answer: the backend refused the request itself.
    /// Transport failures and 5xx answers are not rejections.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        self.status.is_some_and(|s| (400..500).contains(&s))
    }
}

/// Remote identity provider.
#[async_trait::async_trait]
pub trait IdentityBackend: Send + Sync {
    /// Recover the persisted session, if any.
    async fn current_session(&self) -> Result<Option<Session>, BackendError>;

    /// Register for session-change notifications. Dropping the handle unsubscribes.
    fn on_session_change(&self) -> Subscription;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError>;

    /// Returns `Some` when the backend issued a live session immediately and
    /// `None` when the account awaits email confirmation.
    async fn sign_up(&self, email: &str, password: &str, full_name: &str) -> Result<Option<Session>, BackendError>;

    async fn send_password_reset(&self, email: &str) -> Result<(), BackendError>;

    async fn sign_out(&self, session: &Session) -> Result<(), BackendError>;
}

/// Row-level CRUD over `profiles` and `links`, always scoped to the session's user.
#[async_trait::async_trait]
pub trait DataBackend: Send + Sync {
    /// At most one row. `Ok(None)` when the profile does not exist.
    async fn fetch_profile(&self, session: &Session) -> Result<Option<Profile>, BackendError>;

    /// All links of the session's user, ascending by `created_at`.
    async fn fetch_links(&self, session: &Session) -> Result<Vec<Link>, BackendError>;

    /// Persist a new link and return the row with backend-assigned `id`/`created_at`.
    async fn insert_link(&self, session: &Session, link: &NewLink) -> Result<Link, BackendError>;

    async fn update_link(&self, session: &Session, id: Uuid, patch: &LinkPatch) -> Result<(), BackendError>;

    async fn delete_link(&self, session: &Session, id: Uuid) -> Result<(), BackendError>;
}
