//! Auth page: email/password sign-in and registration.

use std::sync::Arc;

use records::NewProfile;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::backend::{Backend, BackendError, SignUp, Table, insert_one};
use crate::routes::ROOT_PATH;

const REQUIRED_FIELDS_MESSAGE: &str = "Email and password are required";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AuthMode {
    #[default]
    SignIn,
    Register,
}

impl AuthMode {
    #[must_use]
    pub fn heading(self) -> &'static str {
        match self {
            Self::SignIn => "Sign In",
            Self::Register => "Register",
        }
    }
}

/// Mode and in-flight flag of the form, as a submit button sees them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FormStatus {
    pub mode: AuthMode,
    pub submitting: bool,
}

impl FormStatus {
    /// Label of the submit button; the button is disabled while submitting.
    #[must_use]
    pub fn submit_label(self) -> &'static str {
        if self.submitting { "Loading..." } else { self.mode.heading() }
    }
}

/// Form state and submit handling for `/auth`.
///
/// `submit` borrows the page mutably, so a second submission cannot start
/// while one is in flight. Observers get the in-flight state through
/// [`AuthPage::status`].
pub struct AuthPage {
    backend: Arc<dyn Backend>,
    email: String,
    password: String,
    error: Option<String>,
    status: watch::Sender<FormStatus>,
}

/// Marks the form as submitting until dropped, including when the submit
/// future is cancelled.
struct InFlight<'a>(&'a watch::Sender<FormStatus>);

impl<'a> InFlight<'a> {
    fn start(status: &'a watch::Sender<FormStatus>) -> Self {
        status.send_modify(|s| s.submitting = true);
        Self(status)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.send_modify(|s| s.submitting = false);
    }
}

impl AuthPage {
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let (status, _) = watch::channel(FormStatus::default());
        Self { backend, email: String::new(), password: String::new(), error: None, status }
    }

    #[must_use]
    pub fn mode(&self) -> AuthMode {
        self.status.borrow().mode
    }

    /// Live view of the mode and in-flight flag.
    #[must_use]
    pub fn status(&self) -> watch::Receiver<FormStatus> {
        self.status.subscribe()
    }

    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Error from the last submission, shown as plain text.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    #[must_use]
    pub fn is_submitting(&self) -> bool {
        self.status.borrow().submitting
    }

    pub fn set_email(&mut self, email: impl Into<String>) {
        self.email = email.into();
    }

    pub fn set_password(&mut self, password: impl Into<String>) {
        self.password = password.into();
    }

    /// Switch between sign-in and register. Clears the error, keeps the fields.
    pub fn toggle_mode(&mut self) {
        self.status.send_modify(|s| {
            s.mode = match s.mode {
                AuthMode::SignIn => AuthMode::Register,
                AuthMode::Register => AuthMode::SignIn,
            };
        });
        self.error = None;
    }

    #[must_use]
    pub fn heading(&self) -> &'static str {
        self.mode().heading()
    }

    #[must_use]
    pub fn submit_label(&self) -> &'static str {
        self.status.borrow().submit_label()
    }

    #[must_use]
    pub fn toggle_label(&self) -> &'static str {
        match self.mode() {
            AuthMode::SignIn => "Don't have an account? Register",
            AuthMode::Register => "Already have an account? Sign In",
        }
    }

    /// Submit the form in the current mode.
    ///
    /// Returns the path to navigate to on success. On failure the page keeps
    /// the backend's message in [`AuthPage::error`].
    pub async fn submit(&mut self) -> Option<&'static str> {
        self.error = None;
        if self.email.trim().is_empty() || self.password.is_empty() {
            self.error = Some(REQUIRED_FIELDS_MESSAGE.to_owned());
            return None;
        }

        let in_flight = InFlight::start(&self.status);
        let result = match self.mode() {
            AuthMode::SignIn => self.sign_in().await,
            AuthMode::Register => self.register().await,
        };
        drop(in_flight);

        match result {
            Ok(next) => next,
            Err(e) => {
                self.error = Some(e.to_string());
                None
            }
        }
    }

    async fn sign_in(&self) -> Result<Option<&'static str>, BackendError> {
        let session = self
            .backend
            .sign_in_with_password(self.email.trim(), &self.password)
            .await?;
        info!(user_id = %session.user.id, "sign-in succeeded");
        Ok(Some(ROOT_PATH))
    }

    async fn register(&self) -> Result<Option<&'static str>, BackendError> {
        let SignUp { user, .. } = self.backend.sign_up(self.email.trim(), &self.password).await?;
        let Some(user) = user else {
            return Ok(None);
        };

        // The auth account exists from here on; a failed insert leaves it without a profile.
        if let Err(e) = insert_one(&*self.backend, Table::Profiles, &NewProfile::for_user(&user)).await {
            warn!(user_id = %user.id, error = %e, "profile insert failed after sign-up");
            return Err(e);
        }
        info!(user_id = %user.id, "registered with default role");
        Ok(Some(ROOT_PATH))
    }
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
