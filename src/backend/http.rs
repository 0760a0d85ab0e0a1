//! HTTP adapter for a GoTrue/PostgREST-style backend.
//!
//! ARCHITECTURE
//! ============
//! Auth calls go to `/auth/v1/*`, row CRUD to `/rest/v1/<table>`. The adapter
//! keeps the current session the way a browser SDK would: in memory, mirrored
//! to an optional JSON file so it can be recovered on the next start, and it
//! emits local change notifications for every state-affecting call.
//!
//! ERROR HANDLING
//! ==============
//! Transport failures and non-2xx responses both become [`BackendError`].
//! Response bodies are mined for the provider's message field so callers can
//! classify them; pure parsing lives in free functions for testability.

#[cfg(test)]
#[path = "http_test.rs"]
mod tests;

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{BackendError, DataBackend, IdentityBackend, SessionListeners, Subscription};
use crate::config::BackendConfig;
use crate::model::{Link, LinkPatch, NewLink, Profile, Session, SessionEvent, SessionUser};

const PROFILE_COLUMNS: &str = "id,full_name,bio,avatar_url";
/// Floor between refresh attempts when tokens are shorter-lived than the margin.
const MIN_REFRESH_DELAY_SECS: u64 = 5;

// =============================================================================
// CLIENT
// =============================================================================

pub struct HttpBackend {
    http: reqwest::Client,
    config: BackendConfig,
    session: Mutex<Option<Session>>,
    listeners: SessionListeners,
}

impl HttpBackend {
    /// Build the adapter and its HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| BackendError::new(format!("HTTP client build failed: {e}")))?;
        Ok(Self { http, config, session: Mutex::new(None), listeners: SessionListeners::new() })
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.config.base_url)
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.config.base_url)
    }

    fn request(&self, method: Method, url: &str, bearer: Option<&str>) -> RequestBuilder {
        let bearer = bearer.unwrap_or(&self.config.anon_key);
        self.http
            .request(method, url)
            .header("apikey", &self.config.anon_key)
            .header("Authorization", format!("Bearer {bearer}"))
    }

    fn cached(&self) -> Option<Session> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the held session and mirror it to the session file.
    async fn store(&self, session: Option<Session>) {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone_from(&session);
        self.persist(session.as_ref()).await;
    }

    /// Swap the held session only if it still carries `refresh_token`.
    ///
    /// Returns `false` when a sign-in, sign-out or another refresh replaced
    /// the session while the exchange was in flight.
    async fn replace_if_current(&self, refresh_token: &str, next: Option<Session>) -> bool {
        {
            let mut held = self.session.lock().unwrap_or_else(PoisonError::into_inner);
            if held.as_ref().and_then(|s| s.refresh_token.as_deref()) != Some(refresh_token) {
                return false;
            }
            held.clone_from(&next);
        }
        self.persist(next.as_ref()).await;
        true
    }

    async fn persist(&self, session: Option<&Session>) {
        if let Some(path) = &self.config.session_file {
            if let Err(e) = persist_session(path, session).await {
                warn!(path = %path.display(), error = %e, "failed to persist session");
            }
        }
    }

    /// Exchange the refresh token for a new session.
    ///
    /// On success the new session is stored and `TokenRefreshed` is emitted.
    /// Only a 4xx answer invalidates the session: it is cleared and
    /// `SignedOut` is emitted. Transport failures and 5xx answers leave the
    /// session and its file in place so the next attempt can retry. A result
    /// that arrives after the session was replaced is discarded.
    ///
    /// # Errors
    ///
    /// Returns the backend failure, or an error when no refresh token is held
    /// or the session changed during the exchange.
    pub async fn refresh_session(&self) -> Result<Session, BackendError> {
        let Some(refresh_token) = self.cached().and_then(|s| s.refresh_token) else {
            return Err(BackendError::new("no refresh token"));
        };
        match self.exchange_refresh_token(&refresh_token).await {
            Ok(session) => {
                if !self.replace_if_current(&refresh_token, Some(session.clone())).await {
                    info!("session changed during refresh, discarding new token");
                    return Err(BackendError::new("session changed during refresh"));
                }
                info!(user_id = %session.user_id(), "session token refreshed");
                self.listeners.emit(&SessionEvent::refreshed(session.clone()));
                Ok(session)
            }
            Err(e) if e.is_rejection() => {
                warn!(status = ?e.status, error = %e, "refresh token rejected, signing out");
                if self.replace_if_current(&refresh_token, None).await {
                    self.listeners.emit(&SessionEvent::signed_out());
                }
                Err(e)
            }
            Err(e) => {
                warn!(status = ?e.status, error = %e, "session refresh failed, keeping session for retry");
                Err(e)
            }
        }
    }

    async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<Session, BackendError> {
        let body = serde_json::json!({ "refresh_token": refresh_token });
        let text = send(
            self.request(Method::POST, &self.auth_url("token"), None)
                .query(&[("grant_type", "refresh_token")])
                .json(&body),
        )
        .await?;
        parse_token_response(&text, unix_now())
    }

    /// Time until the held session should be refreshed. `None` without a refreshable session.
    fn next_refresh_delay(&self) -> Option<Duration> {
        let session = self.cached()?;
        session.refresh_token.as_ref()?;
        let due = session.expires_at? - self.config.refresh_margin_secs - unix_now();
        Some(Duration::from_secs(u64::try_from(due).unwrap_or(0).max(MIN_REFRESH_DELAY_SECS)))
    }

    /// Spawn a background task that refreshes the session shortly before expiry.
    ///
    /// The task holds only a weak reference and ends once the adapter is dropped.
    #[must_use]
    pub fn spawn_auto_refresh(self: &Arc<Self>) -> JoinHandle<()> {
        let mut events = self.listeners.subscribe();
        let backend: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                let delay = match backend.upgrade() {
                    Some(b) => b.next_refresh_delay(),
                    None => return,
                };
                match delay {
                    Some(delay) => {
                        tokio::select! {
                            () = tokio::time::sleep(delay) => {
                                let Some(b) = backend.upgrade() else { return };
                                let _ = b.refresh_session().await;
                            }
                            event = events.next() => if event.is_none() { return },
                        }
                    }
                    None => {
                        if events.next().await.is_none() {
                            return;
                        }
                    }
                }
            }
        })
    }
}

#[async_trait::async_trait]
impl IdentityBackend for HttpBackend {
    async fn current_session(&self) -> Result<Option<Session>, BackendError> {
        let mut session = self.cached();
        if session.is_none() {
            if let Some(path) = &self.config.session_file {
                session = load_session(path).await?;
                self.session
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone_from(&session);
            }
        }
        let Some(session) = session else {
            return Ok(None);
        };
        if !session.expires_within(unix_now(), self.config.refresh_margin_secs) {
            return Ok(Some(session));
        }
        debug!(user_id = %session.user_id(), "recovered session is expiring, refreshing");
        let Some(refresh_token) = session.refresh_token.as_deref() else {
            self.store(None).await;
            return Ok(None);
        };
        match self.exchange_refresh_token(refresh_token).await {
            Ok(fresh) => {
                if self.replace_if_current(refresh_token, Some(fresh.clone())).await {
                    Ok(Some(fresh))
                } else {
                    Ok(self.cached())
                }
            }
            Err(e) if e.is_rejection() => {
                warn!(status = ?e.status, error = %e, "recovered session was rejected");
                self.replace_if_current(refresh_token, None).await;
                Ok(None)
            }
            Err(e) => {
                warn!(status = ?e.status, error = %e, "recovered session could not be refreshed yet, keeping it");
                Ok(Some(session))
            }
        }
    }

    fn on_session_change(&self) -> Subscription {
        self.listeners.subscribe()
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        debug!("signing in with password");
        let body = serde_json::json!({ "email": email, "password": password });
        let text = send(
            self.request(Method::POST, &self.auth_url("token"), None)
                .query(&[("grant_type", "password")])
                .json(&body),
        )
        .await?;
        let session = parse_token_response(&text, unix_now())?;
        self.store(Some(session.clone())).await;
        self.listeners.emit(&SessionEvent::signed_in(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str, full_name: &str) -> Result<Option<Session>, BackendError> {
        debug!("signing up");
        let body = serde_json::json!({
            "email": email,
            "password": password,
            "data": { "full_name": full_name },
        });
        let mut request = self.request(Method::POST, &self.auth_url("signup"), None);
        if let Some(redirect) = &self.config.redirect_url {
            request = request.query(&[("redirect_to", redirect)]);
        }
        let text = send(request.json(&body)).await?;
        let session = parse_sign_up_response(&text, unix_now())?;
        if let Some(session) = &session {
            self.store(Some(session.clone())).await;
            self.listeners.emit(&SessionEvent::signed_in(session.clone()));
        }
        Ok(session)
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), BackendError> {
        let body = serde_json::json!({ "email": email });
        let mut request = self.request(Method::POST, &self.auth_url("recover"), None);
        if let Some(redirect) = &self.config.redirect_url {
            request = request.query(&[("redirect_to", redirect)]);
        }
        send(request.json(&body)).await?;
        Ok(())
    }

    async fn sign_out(&self, session: &Session) -> Result<(), BackendError> {
        send(self.request(Method::POST, &self.auth_url("logout"), Some(&session.access_token))).await?;
        self.store(None).await;
        self.listeners.emit(&SessionEvent::signed_out());
        Ok(())
    }
}

#[async_trait::async_trait]
impl DataBackend for HttpBackend {
    async fn fetch_profile(&self, session: &Session) -> Result<Option<Profile>, BackendError> {
        let id = format!("eq.{}", session.user_id());
        let text = send(
            self.request(Method::GET, &self.rest_url("profiles"), Some(&session.access_token))
                .query(&[("select", PROFILE_COLUMNS), ("id", id.as_str()), ("limit", "1")]),
        )
        .await?;
        let rows: Vec<Profile> = parse_rows(&text)?;
        Ok(rows.into_iter().next())
    }

    async fn fetch_links(&self, session: &Session) -> Result<Vec<Link>, BackendError> {
        let owner = format!("eq.{}", session.user_id());
        let text = send(
            self.request(Method::GET, &self.rest_url("links"), Some(&session.access_token))
                .query(&[("select", "*"), ("user_id", owner.as_str()), ("order", "created_at.asc")]),
        )
        .await?;
        parse_rows(&text)
    }

    async fn insert_link(&self, session: &Session, link: &NewLink) -> Result<Link, BackendError> {
        let text = send(
            self.request(Method::POST, &self.rest_url("links"), Some(&session.access_token))
                .header("Prefer", "return=representation")
                .json(link),
        )
        .await?;
        let rows: Vec<Link> = parse_rows(&text)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::new("insert returned no row"))
    }

    async fn update_link(&self, session: &Session, id: Uuid, patch: &LinkPatch) -> Result<(), BackendError> {
        let text = send(
            self.request(Method::PATCH, &self.rest_url("links"), Some(&session.access_token))
                .query(&owner_filter(id, session.user_id()))
                .header("Prefer", "return=representation")
                .json(patch),
        )
        .await?;
        let rows: Vec<Link> = parse_rows(&text)?;
        if rows.is_empty() {
            return Err(BackendError::with_status(404, format!("link {id} not found")));
        }
        Ok(())
    }

    async fn delete_link(&self, session: &Session, id: Uuid) -> Result<(), BackendError> {
        let text = send(
            self.request(Method::DELETE, &self.rest_url("links"), Some(&session.access_token))
                .query(&owner_filter(id, session.user_id()))
                .header("Prefer", "return=representation"),
        )
        .await?;
        let rows: Vec<Link> = parse_rows(&text)?;
        if rows.is_empty() {
            return Err(BackendError::with_status(404, format!("link {id} not found")));
        }
        Ok(())
    }
}

// =============================================================================
// TRANSPORT
// =============================================================================

/// Send a request and return the body of a 2xx response.
async fn send(request: RequestBuilder) -> Result<String, BackendError> {
    let response = request
        .send()
        .await
        .map_err(|e| BackendError::new(e.to_string()))?;
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| BackendError::new(e.to_string()))?;
    if !status.is_success() {
        return Err(parse_error_body(status, &text));
    }
    Ok(text)
}

fn owner_filter(id: Uuid, user_id: Uuid) -> [(&'static str, String); 2] {
    [("id", format!("eq.{id}")), ("user_id", format!("eq.{user_id}"))]
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}

// =============================================================================
// SESSION FILE
// =============================================================================

async fn load_session(path: &Path) -> Result<Option<Session>, BackendError> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => match serde_json::from_str::<Session>(&text) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable session file");
                Ok(None)
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(BackendError::new(format!("reading session file: {e}"))),
    }
}

async fn persist_session(path: &Path, session: Option<&Session>) -> std::io::Result<()> {
    match session {
        Some(session) => {
            let json = serde_json::to_string(session).map_err(std::io::Error::other)?;
            tokio::fs::write(path, json).await
        }
        None => match tokio::fs::remove_file(path).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        },
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: UserResponse,
}

#[derive(Deserialize)]
struct UserResponse {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

// =============================================================================
// PARSING
// =============================================================================

fn parse_token_response(json: &str, now: i64) -> Result<Session, BackendError> {
    let token: TokenResponse =
        serde_json::from_str(json).map_err(|e| BackendError::new(format!("unexpected token response: {e}")))?;
    let expires_at = token
        .expires_at
        .or_else(|| token.expires_in.map(|secs| now + secs));
    Ok(Session {
        access_token: token.access_token,
        refresh_token: token.refresh_token,
        expires_at,
        user: SessionUser { id: token.user.id, email: token.user.email },
    })
}

/// A sign-up response carries a session only when the account is usable
/// immediately; otherwise it is a bare user object awaiting confirmation.
fn parse_sign_up_response(json: &str, now: i64) -> Result<Option<Session>, BackendError> {
    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| BackendError::new(format!("unexpected sign-up response: {e}")))?;
    if value.get("access_token").is_some_and(|t| !t.is_null()) {
        parse_token_response(json, now).map(Some)
    } else {
        Ok(None)
    }
}

fn parse_rows<T: serde::de::DeserializeOwned>(json: &str) -> Result<Vec<T>, BackendError> {
    serde_json::from_str(json).map_err(|e| BackendError::new(format!("unexpected row payload: {e}")))
}

fn parse_error_body(status: StatusCode, body: &str) -> BackendError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.msg.or(b.message).or(b.error_description).or(b.error))
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                status.to_string()
            } else {
                body.trim().to_owned()
            }
        });
    BackendError::with_status(status.as_u16(), message)
}
