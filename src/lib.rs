//! linkbio: session-driven auth and a confirm-then-apply store for a
//! personal link-in-bio page.
//!
//! ARCHITECTURE
//! ============
//! The [`session::SessionManager`] is the root: it owns the single current
//! session and gates whether an [`store::EntityStore`] may exist. The auth
//! form feeds the dispatcher, whose success makes the backend emit a
//! session-change notification that the manager applies. Everything remote
//! sits behind the traits in [`backend`].

pub mod auth;
pub mod backend;
pub mod config;
pub mod dashboard;
pub mod favicon;
pub mod model;
pub mod navigation;
pub mod notice;
pub mod session;
pub mod store;
