//! Backend configuration parsed from environment variables.

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

use std::path::PathBuf;

pub const DEFAULT_FAVICON_SIZE: u32 = 128;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    Missing(&'static str),
    #[error("invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// Project base URL, without trailing slash.
    pub base_url: String,
    /// Public API key sent as `apikey` on every request.
    pub anon_key: String,
    /// Where the session token is persisted between runs. `None` keeps it in memory only.
    pub session_file: Option<PathBuf>,
    /// Redirect target for confirmation and password-reset emails.
    pub redirect_url: Option<String>,
    pub favicon_size: u32,
    pub timeouts: HttpTimeouts,
    /// Refresh tokens this many seconds before they expire.
    pub refresh_margin_secs: i64,
}

impl BackendConfig {
    /// Build typed backend config from environment variables.
    ///
    /// Required:
    /// - `LINKBIO_BACKEND_URL`
    /// - `LINKBIO_ANON_KEY`
    ///
    /// Optional:
    /// - `LINKBIO_SESSION_FILE`: persisted session path
    /// - `LINKBIO_REDIRECT_URL`: email redirect target
    /// - `LINKBIO_FAVICON_SIZE`: default 128
    /// - `LINKBIO_REQUEST_TIMEOUT_SECS`: default 30
    /// - `LINKBIO_CONNECT_TIMEOUT_SECS`: default 10
    /// - `LINKBIO_REFRESH_MARGIN_SECS`: default 60
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a numeric one does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`BackendConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let base_url = required(&lookup, "LINKBIO_BACKEND_URL")?
            .trim_end_matches('/')
            .to_owned();
        let anon_key = required(&lookup, "LINKBIO_ANON_KEY")?;

        Ok(Self {
            base_url,
            anon_key,
            session_file: optional(&lookup, "LINKBIO_SESSION_FILE").map(PathBuf::from),
            redirect_url: optional(&lookup, "LINKBIO_REDIRECT_URL"),
            favicon_size: parse_or(&lookup, "LINKBIO_FAVICON_SIZE", DEFAULT_FAVICON_SIZE)?,
            timeouts: HttpTimeouts {
                request_secs: parse_or(&lookup, "LINKBIO_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?,
                connect_secs: parse_or(&lookup, "LINKBIO_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS)?,
            },
            refresh_margin_secs: parse_or(&lookup, "LINKBIO_REFRESH_MARGIN_SECS", DEFAULT_REFRESH_MARGIN_SECS)?,
        })
    }
}

fn optional(lookup: &impl Fn(&str) -> Option<String>, var: &str) -> Option<String> {
    lookup(var).filter(|v| !v.trim().is_empty())
}

fn required(lookup: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<String, ConfigError> {
    optional(lookup, var).ok_or(ConfigError::Missing(var))
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match optional(lookup, var) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { var, value: raw }),
    }
}
