//! Route gating between the auth surface and the dashboard.

#[cfg(test)]
#[path = "navigation_test.rs"]
mod tests;

use crate::session::SessionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Sign-in / sign-up / reset form.
    Auth,
    /// The owner's dashboard.
    Home,
}

impl Route {
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Auth => "/auth",
            Self::Home => "/",
        }
    }

    #[must_use]
    pub fn from_path(path: &str) -> Option<Self> {
        match path {
            "/auth" => Some(Self::Auth),
            "/" => Some(Self::Home),
            _ => None,
        }
    }
}

/// Where to go from `current` given the session state, if anywhere.
#[must_use]
pub fn redirect(current: Route, state: &SessionState) -> Option<Route> {
    match (current, state.is_authenticated()) {
        (Route::Home, false) => Some(Route::Auth),
        (Route::Auth, true) => Some(Route::Home),
        _ => None,
    }
}
