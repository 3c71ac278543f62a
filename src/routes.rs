//! Client-side routes and the guard in front of the protected ones.
//!
//! Two paths exist: `/auth` is public, everything else renders the
//! dashboard once a user is signed in.

use records::AuthUser;

use crate::state::auth::AuthState;

pub const AUTH_PATH: &str = "/auth";
pub const ROOT_PATH: &str = "/";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    /// Sign-in / registration page.
    Auth,
    /// Protected dashboard, matched by every other path.
    Dashboard,
}

impl Route {
    #[must_use]
    pub fn resolve(path: &str) -> Self {
        let trimmed = path.trim_end_matches('/');
        if trimmed.eq_ignore_ascii_case(AUTH_PATH) { Self::Auth } else { Self::Dashboard }
    }

    #[must_use]
    pub fn is_protected(self) -> bool {
        matches!(self, Self::Dashboard)
    }
}

/// What a protected route shows for a given auth state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Guard {
    /// Session lookup still pending; show a placeholder.
    Loading,
    /// No user; go to the given path instead.
    Redirect(&'static str),
    /// Render the protected content for this user.
    Render(AuthUser),
}

#[must_use]
pub fn guard(state: &AuthState) -> Guard {
    if state.loading {
        return Guard::Loading;
    }
    match &state.user {
        Some(user) => Guard::Render(user.clone()),
        None => Guard::Redirect(AUTH_PATH),
    }
}

#[cfg(test)]
#[path = "routes_test.rs"]
mod tests;
