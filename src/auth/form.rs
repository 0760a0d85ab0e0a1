//! Auth form state machine: active mode plus in-flight submission tracking.
//!
//! DESIGN
//! ======
//! A submission is split into three steps so the form is never borrowed
//! across a network await: [`AuthForm::submit`] validates and snapshots the
//! request, [`Submission::run`] talks to the dispatcher, and
//! [`AuthForm::complete`] folds the result back in. Each submission carries a
//! sequence number and the mode active when it was dispatched; results are
//! always reported against that mode, and only the latest submission may
//! clear the `submitting` flag. A mode change advances the sequence too.

#[cfg(test)]
#[path = "form_test.rs"]
mod tests;

use tracing::debug;

use super::dispatch::{AuthDispatcher, AuthError, SignUpOutcome};
use super::validate::{Email, Password, ValidationError, validate_email, validate_full_name, validate_password};
use crate::model::Session;
use crate::notice::Notice;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    #[default]
    Login,
    SignUp,
    ForgotPassword,
}

impl AuthMode {
    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Self::Login => "Welcome Back",
            Self::SignUp => "Create Account",
            Self::ForgotPassword => "Reset Password",
        }
    }

    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Login => "Sign in to manage your links",
            Self::SignUp => "Sign up to create your link tree",
            Self::ForgotPassword => "Enter your email to receive a password reset link",
        }
    }

    #[must_use]
    pub fn submit_label(self) -> &'static str {
        match self {
            Self::Login => "Sign In",
            Self::SignUp => "Sign Up",
            Self::ForgotPassword => "Send Reset Link",
        }
    }

    /// Label of the link that leaves this mode.
    #[must_use]
    pub fn toggle_label(self) -> &'static str {
        match self {
            Self::Login => "Don't have an account? Sign up",
            Self::SignUp => "Already have an account? Sign in",
            Self::ForgotPassword => "Back to login",
        }
    }

    #[must_use]
    pub fn needs_password(self) -> bool {
        !matches!(self, Self::ForgotPassword)
    }

    #[must_use]
    pub fn needs_full_name(self) -> bool {
        matches!(self, Self::SignUp)
    }
}

/// Why a submission was not dispatched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitRejected {
    #[error("a request is already in flight")]
    Busy,
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

impl SubmitRejected {
    /// Message to show, if any. A busy form has its button disabled, so nothing is shown.
    #[must_use]
    pub fn notice(&self) -> Option<Notice> {
        match self {
            Self::Busy => None,
            Self::Invalid(e) => Some(Notice::error(e.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
enum AuthRequest {
    SignIn { email: Email, password: Password },
    SignUp { email: Email, password: Password, full_name: String },
    Reset { email: Email },
}

/// A validated request, detached from the form while it is in flight.
#[derive(Debug, Clone)]
pub struct Submission {
    seq: u64,
    mode: AuthMode,
    request: AuthRequest,
}

/// What a successful request achieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthSuccess {
    SignedIn(Session),
    SignedUp(SignUpOutcome),
    ResetSent,
}

/// A resolved submission, ready to be folded back into the form.
#[derive(Debug, Clone)]
pub struct Completed {
    seq: u64,
    mode: AuthMode,
    pub result: Result<AuthSuccess, AuthError>,
}

impl Completed {
    /// Mode that was active when the request was dispatched.
    #[must_use]
    pub fn mode(&self) -> AuthMode {
        self.mode
    }
}

impl Submission {
    #[must_use]
    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    /// Send the request and wait for the backend.
    pub async fn run(self, dispatcher: &AuthDispatcher) -> Completed {
        let result = match &self.request {
            AuthRequest::SignIn { email, password } => dispatcher.sign_in(email, password).await.map(AuthSuccess::SignedIn),
            AuthRequest::SignUp { email, password, full_name } => dispatcher
                .sign_up(email, password, full_name)
                .await
                .map(AuthSuccess::SignedUp),
            AuthRequest::Reset { email } => dispatcher
                .request_password_reset(email)
                .await
                .map(|()| AuthSuccess::ResetSent),
        };
        Completed { seq: self.seq, mode: self.mode, result }
    }
}

/// The auth form: input fields, active mode and submission state.
#[derive(Debug, Clone, Default)]
pub struct AuthForm {
    pub email: String,
    pub password: String,
    pub full_name: String,
    mode: AuthMode,
    submitting: bool,
    latest: u64,
}

impl AuthForm {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    #[must_use]
    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    /// Switch between Login and SignUp. Always leaves ForgotPassword.
    pub fn toggle_sign_up(&mut self) {
        let next = match self.mode {
            AuthMode::Login => AuthMode::SignUp,
            AuthMode::SignUp | AuthMode::ForgotPassword => AuthMode::Login,
        };
        self.set_mode(next);
    }

    /// "Forgot password?" is only offered from Login.
    pub fn forgot_password(&mut self) {
        if self.mode == AuthMode::Login {
            self.set_mode(AuthMode::ForgotPassword);
        }
    }

    pub fn back_to_login(&mut self) {
        if self.mode == AuthMode::ForgotPassword {
            self.set_mode(AuthMode::Login);
        }
    }

    /// Mode changes also advance the sequence, so submissions dispatched
    /// before the change no longer count as current.
    fn set_mode(&mut self, mode: AuthMode) {
        debug!(from = ?self.mode, to = ?mode, "auth form mode changed");
        self.mode = mode;
        self.submitting = false;
        self.latest += 1;
    }

    /// Validate the fields for the current mode and start a submission.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitRejected::Busy`] while a submission is in flight, or the
    /// first validation failure. In both cases nothing is dispatched.
    pub fn submit(&mut self) -> Result<Submission, SubmitRejected> {
        if self.submitting {
            return Err(SubmitRejected::Busy);
        }
        let email = validate_email(&self.email)?;
        let request = match self.mode {
            AuthMode::ForgotPassword => AuthRequest::Reset { email },
            AuthMode::Login => AuthRequest::SignIn { email, password: validate_password(&self.password)? },
            AuthMode::SignUp => {
                let password = validate_password(&self.password)?;
                let full_name = validate_full_name(&self.full_name)?;
                AuthRequest::SignUp { email, password, full_name }
            }
        };
        self.latest += 1;
        self.submitting = true;
        Ok(Submission { seq: self.latest, mode: self.mode, request })
    }

    /// Fold a resolved submission back into the form and describe it to the user.
    ///
    /// The message reflects the mode at dispatch time. Form side effects
    /// (leaving ForgotPassword after a reset) only apply to the current
    /// submission, and only if no mode change happened since it was dispatched.
    pub fn complete(&mut self, done: Completed) -> Notice {
        let current = done.seq == self.latest;
        if current {
            self.submitting = false;
        }
        match done.result {
            Ok(AuthSuccess::SignedIn(_)) => Notice::success("Welcome back!"),
            Ok(AuthSuccess::SignedUp(SignUpOutcome::SessionIssued(_))) => {
                Notice::success("Account created successfully! Redirecting...")
            }
            Ok(AuthSuccess::SignedUp(SignUpOutcome::ConfirmationPending)) => {
                Notice::info("Please check your email to confirm your account.")
            }
            Ok(AuthSuccess::ResetSent) => {
                if current && self.mode == done.mode {
                    self.mode = AuthMode::Login;
                    self.email.clear();
                }
                Notice::success("Password reset email sent! Check your inbox.")
            }
            Err(e) => Notice::error(e.to_string()),
        }
    }

    /// Submit, wait for the backend and complete, in one step.
    pub async fn submit_and_wait(&mut self, dispatcher: &AuthDispatcher) -> Option<Notice> {
        match self.submit() {
            Ok(submission) => {
                let done = submission.run(dispatcher).await;
                Some(self.complete(done))
            }
            Err(rejected) => rejected.notice(),
        }
    }
}
