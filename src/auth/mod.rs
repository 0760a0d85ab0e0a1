//! Authentication flow: credential validation, request dispatch and the
//! sign-in / sign-up / reset form.
//!
//! ARCHITECTURE
//! ============
//! `validate` is pure and runs before anything touches the network.
//! `dispatch` talks to the identity backend and classifies its failures.
//! `form` is the UI state machine that ties the two together; it never
//! writes session state, which only changes through backend notifications.

pub mod dispatch;
pub mod form;
pub mod validate;

pub use dispatch::{AuthDispatcher, AuthError, SignUpOutcome};
pub use form::{AuthForm, AuthMode, AuthSuccess, Completed, SubmitRejected, Submission};
pub use validate::{Email, Password, ValidationError, validate_email, validate_full_name, validate_password};
