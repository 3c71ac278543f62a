//! Backend-as-a-service boundary.
//!
//! DESIGN
//! ======
//! Authentication, authorization, and storage all live in the hosted
//! service. The application only issues the calls modeled by [`Backend`]:
//! password sign-in/sign-up/sign-out, session lookup, auth-change
//! subscription, and row `select`/`insert` against three tables.
//!
//! Rows cross the trait as `serde_json::Value` so the trait stays object
//! safe; [`fetch`], [`fetch_one`], and [`insert_one`] add the typed layer.
//!
//! ERROR HANDLING
//! ==============
//! Every failure is a [`BackendError`]. Its `Display` is the backend's own
//! message so callers can show it verbatim.

#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod query;
pub mod supabase;

use records::{AuthUser, Session};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;

pub use query::{Columns, Direction, Embed, Order, Select, Table};

/// Postgres error code for a unique constraint violation.
pub const UNIQUE_VIOLATION: &str = "23505";
/// PostgREST error code when a single-row read matched zero or many rows.
pub const NOT_SINGLE_ROW: &str = "PGRST116";

const AUTH_CHANNEL_CAPACITY: usize = 16;

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    /// The auth service rejected the request.
    #[error("{message}")]
    Auth { status: u16, message: String },

    /// The data API rejected the request.
    #[error("{message}")]
    Api { status: u16, code: Option<String>, message: String },

    /// The request never produced a response.
    #[error("request failed: {0}")]
    Request(String),

    /// A response body could not be decoded.
    #[error("response parse failed: {0}")]
    Parse(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),

    /// The persisted session could not be read or written.
    #[error("session store failed: {0}")]
    SessionStore(String),
}

impl BackendError {
    /// Whether the store rejected a row because of a unique constraint.
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::Api { code: Some(code), .. } if code == UNIQUE_VIOLATION)
    }
}

// =============================================================================
// AUTH EVENTS
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

/// Notification delivered to auth-state subscribers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthChange {
    pub event: AuthEvent,
    pub session: Option<Session>,
}

/// Live auth-state subscription. Dropping it unsubscribes.
pub type AuthSubscription = broadcast::Receiver<AuthChange>;

/// Result of a sign-up call. `session` is absent when the service still
/// requires email confirmation; `user` is absent when it returned nothing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SignUp {
    pub user: Option<AuthUser>,
    pub session: Option<Session>,
}

/// Fan-out of auth changes, shared by the backend implementations.
pub(crate) struct AuthBroadcast {
    tx: broadcast::Sender<AuthChange>,
}

impl AuthBroadcast {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(AUTH_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> AuthSubscription {
        self.tx.subscribe()
    }

    pub(crate) fn emit(&self, event: AuthEvent, session: Option<Session>) {
        // No subscribers is fine; nothing is listening yet.
        let _ = self.tx.send(AuthChange { event, session });
    }

    #[cfg(any(test, feature = "test-util"))]
    pub(crate) fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

// =============================================================================
// TRAIT
// =============================================================================

#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUp, BackendError>;

    async fn sign_out(&self) -> Result<(), BackendError>;

    /// The current session, if any.
    async fn get_session(&self) -> Result<Option<Session>, BackendError>;

    /// Subscribe to sign-in, sign-out, and token-refresh notifications.
    fn on_auth_state_change(&self) -> AuthSubscription;

    async fn select(&self, query: &Select) -> Result<Vec<serde_json::Value>, BackendError>;

    async fn insert(&self, table: Table, rows: Vec<serde_json::Value>) -> Result<(), BackendError>;
}

/// Run `query` and decode every row.
///
/// # Errors
///
/// Returns the backend error, or [`BackendError::Parse`] if a row does not
/// match `T`.
pub async fn fetch<T: DeserializeOwned>(backend: &dyn Backend, query: &Select) -> Result<Vec<T>, BackendError> {
    backend
        .select(query)
        .await?
        .into_iter()
        .map(|row| serde_json::from_value(row).map_err(|e| BackendError::Parse(e.to_string())))
        .collect()
}

/// Run a single-row `query` and decode the row.
///
/// # Errors
///
/// Returns an [`NOT_SINGLE_ROW`] API error when zero or many rows match.
pub async fn fetch_one<T: DeserializeOwned>(backend: &dyn Backend, query: &Select) -> Result<T, BackendError> {
    let mut rows = fetch::<T>(backend, query).await?;
    if rows.len() != 1 {
        return Err(not_single_row());
    }
    rows.pop().ok_or_else(not_single_row)
}

/// Serialize `row` and insert it into `table`.
///
/// # Errors
///
/// Returns the backend error, or [`BackendError::Parse`] if `row` does not
/// serialize.
pub async fn insert_one<T: Serialize>(backend: &dyn Backend, table: Table, row: &T) -> Result<(), BackendError> {
    let value = serde_json::to_value(row).map_err(|e| BackendError::Parse(e.to_string()))?;
    backend.insert(table, vec![value]).await
}

pub(crate) fn not_single_row() -> BackendError {
    BackendError::Api {
        status: 406,
        code: Some(NOT_SINGLE_ROW.to_owned()),
        message: "JSON object requested, multiple (or no) rows returned".to_owned(),
    }
}
