//! Best-effort logo lookup for new links.
//!
//! Failures never block link creation; the store degrades them to an empty logo.

#[cfg(test)]
#[path = "favicon_test.rs"]
mod tests;

use reqwest::Url;

use crate::config::DEFAULT_FAVICON_SIZE;

const FAVICON_ENDPOINT: &str = "https://www.google.com/s2/favicons";

/// Why a logo could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupFailure {
    #[error("url does not parse: {0}")]
    BadUrl(String),
    #[error("url has no host: {0}")]
    NoHost(String),
    #[error("favicon service failed: {0}")]
    Service(String),
}

/// Resolves a link URL to a logo image URL.
#[async_trait::async_trait]
pub trait LogoLookup: Send + Sync {
    async fn logo_for(&self, url: &str) -> Result<String, LookupFailure>;
}

/// Logo URLs served by Google's favicon endpoint, keyed by the link's domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GoogleFavicons {
    pub size: u32,
}

impl Default for GoogleFavicons {
    fn default() -> Self {
        Self { size: DEFAULT_FAVICON_SIZE }
    }
}

impl GoogleFavicons {
    #[must_use]
    pub fn new(size: u32) -> Self {
        Self { size }
    }

    /// Build the favicon URL for `url`'s host.
    ///
    /// # Errors
    ///
    /// Returns an error if `url` is not absolute or has no host.
    pub fn favicon_url(&self, url: &str) -> Result<String, LookupFailure> {
        let host = domain_of(url)?;
        Ok(format!("{FAVICON_ENDPOINT}?domain={host}&sz={}", self.size))
    }
}

#[async_trait::async_trait]
impl LogoLookup for GoogleFavicons {
    async fn logo_for(&self, url: &str) -> Result<String, LookupFailure> {
        self.favicon_url(url)
    }
}

/// Host part of an absolute URL.
///
/// # Errors
///
/// Returns an error if `url` does not parse or has no host.
pub fn domain_of(url: &str) -> Result<String, LookupFailure> {
    let parsed = Url::parse(url.trim()).map_err(|_| LookupFailure::BadUrl(url.to_owned()))?;
    parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| LookupFailure::NoHost(url.to_owned()))
}
