//! Entity store: the signed-in user's profile and link collection.
//!
//! DESIGN
//! ======
//! Confirm-then-apply. Every mutation is persisted first and only a confirmed
//! result touches local state; a failure leaves the collection exactly as it
//! was. There is no optimistic insertion and nothing to roll back.
//!
//! A store is mounted for one owner and exists only while that owner is
//! signed in. Results are checked on arrival: if the session has moved to
//! another user (or ended) the result is discarded as [`StoreError::Stale`],
//! and once the store is unmounted results are discarded as
//! [`StoreError::Detached`]. In-flight requests are not aborted.
//!
//! ERROR HANDLING
//! ==============
//! Backend failures surface as [`StoreError::Data`] with the raw message.
//! Favicon lookup failures never surface; the link is stored without a logo.

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{BackendError, DataBackend};
use crate::favicon::LogoLookup;
use crate::model::{Link, LinkPatch, NewLink, Profile, Session};
use crate::session::SessionState;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("not signed in")]
    Unauthenticated,
    #[error("session changed while the request was in flight")]
    Stale,
    #[error("store is no longer mounted")]
    Detached,
    #[error("link {0} is not in the collection")]
    UnknownLink(Uuid),
    #[error("Title and URL are required")]
    BlankField,
    #[error("backend returned a row owned by another user")]
    ForeignRow,
    #[error(transparent)]
    Data(#[from] BackendError),
}

impl StoreError {
    /// Discarded results that the user should not hear about.
    #[must_use]
    pub fn is_discarded(&self) -> bool {
        matches!(self, Self::Stale | Self::Detached)
    }
}

#[derive(Debug, Default)]
struct StoreState {
    profile: Option<Profile>,
    links: Vec<Link>,
}

#[derive(Clone)]
pub struct EntityStore {
    owner: Uuid,
    session: watch::Receiver<SessionState>,
    data: Arc<dyn DataBackend>,
    logos: Arc<dyn LogoLookup>,
    state: Arc<Mutex<StoreState>>,
    mounted: Arc<AtomicBool>,
}

impl EntityStore {
    /// Mount a store for the currently signed-in user.
    ///
    /// # Errors
    ///
    /// [`StoreError::Unauthenticated`] when there is no session.
    pub fn mount(
        session: watch::Receiver<SessionState>,
        data: Arc<dyn DataBackend>,
        logos: Arc<dyn LogoLookup>,
    ) -> Result<Self, StoreError> {
        let owner = session
            .borrow()
            .session()
            .map(Session::user_id)
            .ok_or(StoreError::Unauthenticated)?;
        info!(user_id = %owner, "entity store mounted");
        Ok(Self {
            owner,
            session,
            data,
            logos,
            state: Arc::new(Mutex::new(StoreState::default())),
            mounted: Arc::new(AtomicBool::new(true)),
        })
    }

    #[must_use]
    pub fn owner(&self) -> Uuid {
        self.owner
    }

    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::Acquire)
    }

    /// Stop accepting results. Requests already in flight finish but are discarded.
    pub fn unmount(&self) {
        if self.mounted.swap(false, Ordering::AcqRel) {
            info!(user_id = %self.owner, "entity store unmounted");
        }
    }

    #[must_use]
    pub fn profile(&self) -> Option<Profile> {
        self.lock().profile.clone()
    }

    /// Local link collection, ascending by `created_at`.
    #[must_use]
    pub fn links(&self) -> Vec<Link> {
        self.lock().links.clone()
    }

    // =========================================================================
    // LOADS
    // =========================================================================

    /// Load the owner's profile. `Ok(None)` when no profile row exists.
    ///
    /// # Errors
    ///
    /// Backend failure, or a discarded result.
    pub async fn load_profile(&self) -> Result<Option<Profile>, StoreError> {
        let session = self.session()?;
        debug!(user_id = %self.owner, "loading profile");
        let profile = self
            .data
            .fetch_profile(&session)
            .await
            .map_err(|e| self.failed("load profile", e))?;
        let profile = profile.filter(|p| p.user_id == self.owner);

        self.accept("load profile")?;
        self.lock().profile.clone_from(&profile);
        Ok(profile)
    }

    /// Load the owner's links, replacing the local collection.
    ///
    /// # Errors
    ///
    /// Backend failure, or a discarded result.
    pub async fn load_links(&self) -> Result<Vec<Link>, StoreError> {
        let session = self.session()?;
        debug!(user_id = %self.owner, "loading links");
        let rows = self
            .data
            .fetch_links(&session)
            .await
            .map_err(|e| self.failed("load links", e))?;

        let total = rows.len();
        let mut links: Vec<Link> = rows.into_iter().filter(|l| l.user_id == self.owner).collect();
        if links.len() != total {
            warn!(user_id = %self.owner, dropped = total - links.len(), "ignoring links owned by another user");
        }
        links.sort_by_key(|l| l.created_at);

        self.accept("load links")?;
        self.lock().links.clone_from(&links);
        info!(user_id = %self.owner, count = links.len(), "links loaded");
        Ok(links)
    }

    // =========================================================================
    // MUTATIONS
    // =========================================================================

    /// Create a link and append it once the backend has confirmed it.
    ///
    /// # Errors
    ///
    /// Blank input, backend failure, or a discarded result.
    pub async fn create_link(&self, title: &str, url: &str) -> Result<Link, StoreError> {
        require_filled(title, url)?;
        self.session()?;

        let logo_url = match self.logos.logo_for(url).await {
            Ok(logo) => Some(logo),
            Err(e) => {
                warn!(url, error = %e, "favicon lookup failed; storing link without logo");
                None
            }
        };

        // Re-read: the lookup may have outlived the session.
        let session = self.session()?;
        let new_link = NewLink { user_id: self.owner, title: title.to_owned(), url: url.to_owned(), logo_url };
        let row = self
            .data
            .insert_link(&session, &new_link)
            .await
            .map_err(|e| self.failed("create link", e))?;

        self.accept("create link")?;
        if row.user_id != self.owner {
            warn!(user_id = %self.owner, link_id = %row.id, "insert returned a foreign row");
            return Err(StoreError::ForeignRow);
        }
        self.lock().links.push(row.clone());
        info!(user_id = %self.owner, link_id = %row.id, "link created");
        Ok(row)
    }

    /// Replace a link's title and url once the backend has confirmed it.
    ///
    /// # Errors
    ///
    /// Blank input, an id not in the collection, backend failure, or a
    /// discarded result.
    pub async fn update_link(&self, id: Uuid, title: &str, url: &str) -> Result<(), StoreError> {
        require_filled(title, url)?;
        self.require_known(id)?;
        let session = self.session()?;

        let patch = LinkPatch { title: title.to_owned(), url: url.to_owned() };
        self.data
            .update_link(&session, id, &patch)
            .await
            .map_err(|e| self.failed("update link", e))?;

        self.accept("update link")?;
        let mut state = self.lock();
        let link = state
            .links
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or(StoreError::UnknownLink(id))?;
        link.title = patch.title;
        link.url = patch.url;
        info!(user_id = %self.owner, link_id = %id, "link updated");
        Ok(())
    }

    /// Remove a link once the backend has confirmed the delete.
    ///
    /// # Errors
    ///
    /// An id not in the collection, backend failure, or a discarded result.
    pub async fn delete_link(&self, id: Uuid) -> Result<(), StoreError> {
        self.require_known(id)?;
        let session = self.session()?;

        self.data
            .delete_link(&session, id)
            .await
            .map_err(|e| self.failed("delete link", e))?;

        self.accept("delete link")?;
        self.lock().links.retain(|l| l.id != id);
        info!(user_id = %self.owner, link_id = %id, "link deleted");
        Ok(())
    }

    // =========================================================================
    // GUARDS
    // =========================================================================

    /// The live session for this store's owner. Token refreshes are fine;
    /// a different user or no user is not.
    fn session(&self) -> Result<Session, StoreError> {
        if !self.is_mounted() {
            return Err(StoreError::Detached);
        }
        match &*self.session.borrow() {
            SessionState::Authenticated(session) if session.user_id() == self.owner => Ok(session.clone()),
            _ => Err(StoreError::Stale),
        }
    }

    /// Check that a resolved result may still be applied.
    fn accept(&self, action: &'static str) -> Result<(), StoreError> {
        self.session().map(drop).inspect_err(|e| {
            warn!(action, user_id = %self.owner, reason = %e, "discarding result");
        })
    }

    fn require_known(&self, id: Uuid) -> Result<(), StoreError> {
        if self.lock().links.iter().any(|l| l.id == id) {
            Ok(())
        } else {
            warn!(user_id = %self.owner, link_id = %id, "link not in collection");
            Err(StoreError::UnknownLink(id))
        }
    }

    fn failed(&self, action: &'static str, e: BackendError) -> StoreError {
        warn!(action, user_id = %self.owner, status = ?e.status, error = %e, "store request failed");
        StoreError::Data(e)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn require_filled(title: &str, url: &str) -> Result<(), StoreError> {
    if title.trim().is_empty() || url.trim().is_empty() {
        return Err(StoreError::BlankField);
    }
    Ok(())
}
