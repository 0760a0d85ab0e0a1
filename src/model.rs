//! Domain records shared by the session, auth and store layers.
//!
//! DESIGN
//! ======
//! Field names mirror the backend's JSON rows so the HTTP adapter can
//! deserialize them directly. `Session` is owned by the session manager;
//! everyone else receives clones or references and never mutates it.

#[cfg(test)]
#[path = "model_test.rs"]
mod tests;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// SESSION
// =============================================================================

/// Identity embedded in a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

/// Proof of authenticated identity plus the identity itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque bearer token sent with every data request.
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Expiry as unix seconds, when the backend reports one.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: SessionUser,
}

impl Session {
    #[must_use]
    pub fn user_id(&self) -> Uuid {
        self.user.id
    }

    /// `true` when the token expires within `margin_secs` of `now` (unix seconds).
    #[must_use]
    pub fn expires_within(&self, now: i64, margin_secs: i64) -> bool {
        self.expires_at.is_some_and(|at| at - now <= margin_secs)
    }
}

/// Why the backend reported a session change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEventKind {
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

/// One session-change notification. `session` is the new current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    pub kind: SessionEventKind,
    pub session: Option<Session>,
}

impl SessionEvent {
    #[must_use]
    pub fn signed_in(session: Session) -> Self {
        Self { kind: SessionEventKind::SignedIn, session: Some(session) }
    }

    #[must_use]
    pub fn signed_out() -> Self {
        Self { kind: SessionEventKind::SignedOut, session: None }
    }

    #[must_use]
    pub fn refreshed(session: Session) -> Self {
        Self { kind: SessionEventKind::TokenRefreshed, session: Some(session) }
    }
}

// =============================================================================
// PROFILE
// =============================================================================

/// Fallback bio shown when the profile has none.
pub const DEFAULT_BIO: &str = "Welcome to my link tree!";

/// Profile row, one per user. Mirrors the `profiles` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(rename = "id")]
    pub user_id: Uuid,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl Profile {
    /// Bio to render, falling back to [`DEFAULT_BIO`] when absent or blank.
    #[must_use]
    pub fn display_bio(&self) -> &str {
        self.bio
            .as_deref()
            .filter(|b| !b.trim().is_empty())
            .unwrap_or(DEFAULT_BIO)
    }
}

// =============================================================================
// LINK
// =============================================================================

/// Link row. Mirrors the `links` table; `id` and `created_at` are backend-assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Insert payload for a new link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewLink {
    pub user_id: Uuid,
    pub title: String,
    pub url: String,
    pub logo_url: Option<String>,
}

/// Update payload. Only title and url are editable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkPatch {
    pub title: String,
    pub url: String,
}
