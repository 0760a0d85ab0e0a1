//! Auth request dispatcher: sign-in, sign-up and password reset.
//!
//! The dispatcher never writes session state. A successful sign-in (or a
//! sign-up that issues a session immediately) makes the backend emit a
//! session-change notification, which the session manager applies.

#[cfg(test)]
#[path = "dispatch_test.rs"]
mod tests;

use std::sync::Arc;

use tracing::{info, warn};

use super::validate::{Email, Password};
use crate::backend::{BackendError, IdentityBackend};
use crate::model::Session;

const FALLBACK_AUTH_MESSAGE: &str = "Authentication failed. Please try again.";

/// Categorized auth failure. `Display` is the user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid email or password. Please try again.")]
    InvalidCredentials,
    #[error("This email is already registered. Please login instead.")]
    EmailAlreadyRegistered,
    #[error("Please check your email and confirm your account first.")]
    EmailNotConfirmed,
    #[error("{0}")]
    Unknown(String),
}

impl AuthError {
    /// Map a raw backend message onto the taxonomy by substring.
    #[must_use]
    pub fn classify(message: &str) -> Self {
        if message.contains("Invalid login credentials") {
            Self::InvalidCredentials
        } else if message.contains("already registered") {
            Self::EmailAlreadyRegistered
        } else if message.contains("Email not confirmed") {
            Self::EmailNotConfirmed
        } else if message.trim().is_empty() {
            Self::Unknown(FALLBACK_AUTH_MESSAGE.to_owned())
        } else {
            Self::Unknown(message.to_owned())
        }
    }
}

impl From<BackendError> for AuthError {
    fn from(e: BackendError) -> Self {
        Self::classify(&e.message)
    }
}

/// Result of a successful sign-up request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
    /// The backend logged the new user in immediately.
    SessionIssued(Session),
    /// The account exists but must be confirmed by email first.
    ConfirmationPending,
}

#[derive(Clone)]
pub struct AuthDispatcher {
    identity: Arc<dyn IdentityBackend>,
}

impl AuthDispatcher {
    #[must_use]
    pub fn new(identity: Arc<dyn IdentityBackend>) -> Self {
        Self { identity }
    }

    /// # Errors
    ///
    /// Returns the classified backend failure.
    pub async fn sign_in(&self, email: &Email, password: &Password) -> Result<Session, AuthError> {
        let session = self
            .identity
            .sign_in_with_password(email.as_str(), password.as_str())
            .await
            .map_err(|e| log_failure("sign-in", e))?;
        info!(user_id = %session.user_id(), "signed in");
        Ok(session)
    }

    /// # Errors
    ///
    /// Returns the classified backend failure.
    pub async fn sign_up(&self, email: &Email, password: &Password, full_name: &str) -> Result<SignUpOutcome, AuthError> {
        let session = self
            .identity
            .sign_up(email.as_str(), password.as_str(), full_name)
            .await
            .map_err(|e| log_failure("sign-up", e))?;
        Ok(match session {
            Some(session) => {
                info!(user_id = %session.user_id(), "signed up with immediate session");
                SignUpOutcome::SessionIssued(session)
            }
            None => {
                info!("signed up, awaiting email confirmation");
                SignUpOutcome::ConfirmationPending
            }
        })
    }

    /// # Errors
    ///
    /// Returns the classified backend failure.
    pub async fn request_password_reset(&self, email: &Email) -> Result<(), AuthError> {
        self.identity
            .send_password_reset(email.as_str())
            .await
            .map_err(|e| log_failure("password reset", e))?;
        info!("password reset email requested");
        Ok(())
    }
}

fn log_failure(action: &'static str, e: BackendError) -> AuthError {
    warn!(action, status = ?e.status, error = %e, "auth request failed");
    AuthError::from(e)
}
