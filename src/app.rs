//! Application root: auth context, current path, and route dispatch.

use std::sync::Arc;

use uuid::Uuid;

use crate::backend::Backend;
use crate::pages::auth::AuthPage;
use crate::pages::dashboard::DashboardPage;
use crate::routes::{Guard, ROOT_PATH, Route, guard};
use crate::state::auth::{AuthContext, AuthState};

/// What the current path shows.
pub enum Screen {
    /// Auth state not known yet.
    Loading,
    Auth(AuthPage),
    /// Mounted dashboard for the signed-in user.
    Dashboard(Box<DashboardPage>),
}

/// Owns the auth context for the lifetime of the application.
pub struct App {
    backend: Arc<dyn Backend>,
    auth: AuthContext,
    path: String,
    community_id: Option<Uuid>,
}

impl App {
    /// Start the auth context and open the root path.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let auth = AuthContext::provide(backend.clone());
        Self { backend, auth, path: ROOT_PATH.to_owned(), community_id: None }
    }

    /// Community attached to events created from the dashboard.
    #[must_use]
    pub fn with_community(mut self, community_id: Option<Uuid>) -> Self {
        self.community_id = community_id;
        self
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn navigate(&mut self, path: &str) {
        self.path = path.to_owned();
    }

    #[must_use]
    pub fn auth(&self) -> &AuthContext {
        &self.auth
    }

    #[must_use]
    pub fn backend(&self) -> Arc<dyn Backend> {
        self.backend.clone()
    }

    /// Wait for the initial session lookup.
    pub async fn ready(&self) -> AuthState {
        self.auth.loaded().await
    }

    /// Resolve the current path, following a guard redirect if there is one.
    pub async fn screen(&mut self) -> Screen {
        if !Route::resolve(&self.path).is_protected() {
            return Screen::Auth(AuthPage::new(self.backend.clone()));
        }
        match guard(&self.auth.current()) {
            Guard::Loading => Screen::Loading,
            Guard::Redirect(to) => {
                self.navigate(to);
                Screen::Auth(AuthPage::new(self.backend.clone()))
            }
            Guard::Render(user) => {
                let mut page = DashboardPage::new(self.backend.clone(), user).with_community(self.community_id);
                page.mount().await;
                Screen::Dashboard(Box::new(page))
            }
        }
    }

    /// Drop the auth subscription.
    pub async fn shutdown(self) {
        self.auth.release().await;
    }
}

#[cfg(test)]
#[path = "app_test.rs"]
mod tests;
