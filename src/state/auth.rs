use std::sync::Arc;

use records::AuthUser;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::backend::{AuthSubscription, Backend};

/// Authentication state tracking the current user and loading status.
///
/// `loading` starts out `true` and flips to `false` exactly once, when the
/// initial session lookup resolves.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthState {
    pub user: Option<AuthUser>,
    pub loading: bool,
}

impl Default for AuthState {
    fn default() -> Self {
        Self { user: None, loading: true }
    }
}

/// Provider of [`AuthState`] for the whole application.
///
/// Owns the auth-change subscription for as long as it lives. Dropping the
/// context (or calling [`AuthContext::release`]) tears the listener down.
pub struct AuthContext {
    state: watch::Receiver<AuthState>,
    listener: Option<JoinHandle<()>>,
}

impl AuthContext {
    /// Subscribe to auth changes, then look up the current session.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn provide(backend: Arc<dyn Backend>) -> Self {
        // Subscribe before the lookup so no change between the two is lost.
        let changes = backend.on_auth_state_change();
        let (tx, state) = watch::channel(AuthState::default());
        let listener = tokio::spawn(listen(backend, changes, tx));
        Self { state, listener: Some(listener) }
    }

    #[must_use]
    pub fn current(&self) -> AuthState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn user(&self) -> Option<AuthUser> {
        self.state.borrow().user.clone()
    }

    /// A receiver that observes every state update.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<AuthState> {
        self.state.clone()
    }

    /// Wait until the initial session lookup has resolved.
    pub async fn loaded(&self) -> AuthState {
        self.wait_until(|s| !s.loading).await
    }

    /// Wait until `predicate` holds for the current state.
    ///
    /// Returns the last known state if the listener has stopped.
    pub async fn wait_until(&self, mut predicate: impl FnMut(&AuthState) -> bool) -> AuthState {
        let mut rx = self.state.clone();
        match rx.wait_for(|s| predicate(s)).await {
            Ok(state) => AuthState::clone(&state),
            Err(_) => self.current(),
        }
    }

    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.listener.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop listening and wait for the subscription to be dropped.
    pub async fn release(mut self) {
        if let Some(handle) = self.listener.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

impl Drop for AuthContext {
    fn drop(&mut self) {
        if let Some(handle) = self.listener.take() {
            handle.abort();
        }
    }
}

async fn listen(backend: Arc<dyn Backend>, mut changes: AuthSubscription, tx: watch::Sender<AuthState>) {
    let user = match backend.get_session().await {
        Ok(session) => session.map(|s| s.user),
        Err(e) => {
            warn!(error = %e, "initial session lookup failed; continuing signed out");
            None
        }
    };
    tx.send_replace(AuthState { user, loading: false });

    loop {
        match changes.recv().await {
            Ok(change) => {
                debug!(event = ?change.event, "auth state changed");
                let user = change.session.map(|s| s.user);
                tx.send_modify(|state| state.user = user);
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "auth listener lagged; resyncing session");
                let user = backend.get_session().await.ok().flatten().map(|s| s.user);
                tx.send_modify(|state| state.user = user);
            }
            Err(RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
