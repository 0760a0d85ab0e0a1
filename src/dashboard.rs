//! Dashboard flows: the entity store plus the notices the user sees.
//!
//! Each flow returns the notice to show, or `None` when the result was
//! discarded (stale session or unmounted view) and nothing should be shown.
//! Profile load failures are logged only; the view renders without a profile.

#[cfg(test)]
#[path = "dashboard_test.rs"]
mod tests;

use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use crate::backend::DataBackend;
use crate::favicon::LogoLookup;
use crate::model::Link;
use crate::notice::Notice;
use crate::session::SessionManager;
use crate::store::{EntityStore, StoreError};

/// Profile header as rendered: bio falls back to the default greeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileView {
    pub full_name: String,
    pub bio: String,
    pub avatar_url: Option<String>,
}

pub struct Dashboard {
    store: EntityStore,
}

impl Dashboard {
    /// # Errors
    ///
    /// [`StoreError::Unauthenticated`] when nobody is signed in.
    pub fn mount(
        session: &SessionManager,
        data: Arc<dyn DataBackend>,
        logos: Arc<dyn LogoLookup>,
    ) -> Result<Self, StoreError> {
        EntityStore::mount(session.watch(), data, logos).map(|store| Self { store })
    }

    #[must_use]
    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    /// Load profile and links.
    pub async fn load(&self) -> Option<Notice> {
        if let Err(e) = self.store.load_profile().await {
            warn!(error = %e, "profile unavailable");
        }
        match self.store.load_links().await {
            Ok(_) => None,
            Err(e) => failure(&e, "Failed to load links"),
        }
    }

    pub async fn add_link(&self, title: &str, url: &str) -> Option<Notice> {
        match self.store.create_link(title, url).await {
            Ok(_) => Some(Notice::success("Link added successfully!")),
            Err(e) => failure(&e, "Failed to add link"),
        }
    }

    pub async fn edit_link(&self, id: Uuid, title: &str, url: &str) -> Option<Notice> {
        match self.store.update_link(id, title, url).await {
            Ok(()) => Some(Notice::success("Link updated successfully!")),
            Err(e) => failure(&e, "Failed to update link"),
        }
    }

    pub async fn remove_link(&self, id: Uuid) -> Option<Notice> {
        match self.store.delete_link(id).await {
            Ok(()) => Some(Notice::success("Link removed successfully!")),
            Err(e) => failure(&e, "Failed to delete link"),
        }
    }

    /// `None` when the profile row is missing or not loaded yet.
    #[must_use]
    pub fn profile_view(&self) -> Option<ProfileView> {
        self.store.profile().map(|p| ProfileView {
            bio: p.display_bio().to_owned(),
            full_name: p.full_name,
            avatar_url: p.avatar_url,
        })
    }

    #[must_use]
    pub fn links(&self) -> Vec<Link> {
        self.store.links()
    }

    pub fn unmount(&self) {
        self.store.unmount();
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        self.store.unmount();
    }
}

/// Sign out from the dashboard.
pub async fn log_out(session: &SessionManager) -> Notice {
    match session.sign_out().await {
        Ok(()) => Notice::success("Logged out successfully!"),
        Err(_) => Notice::error("Failed to logout"),
    }
}

fn failure(e: &StoreError, message: &str) -> Option<Notice> {
    match e {
        e if e.is_discarded() => None,
        StoreError::BlankField => Some(Notice::error(e.to_string())),
        _ => Some(Notice::error(message)),
    }
}
