//! In-process backend.
//!
//! Holds auth users and table rows in memory with just enough of the hosted
//! service's semantics for the client to run against it: password auth,
//! equality filters, ordering, the profile embed on registrations, and
//! primary-key uniqueness on `profiles`. Uniqueness of `(event_id, user_id)`
//! registrations is off unless [`MemoryBackend::with_unique_registrations`]
//! turns it on.
//!
//! Test hooks let callers fail the next call against a table and count the
//! inserts that were issued. The module is only built for tests and with the
//! `test-util` feature.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use records::{AuthUser, Session, parse_timestamp};
use serde::Serialize;
use serde_json::{Map, Value};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use super::{
    AuthBroadcast, AuthEvent, AuthSubscription, Backend, BackendError, Direction, Embed, Select, SignUp, Table,
    UNIQUE_VIOLATION, not_single_row,
};

const MIN_PASSWORD_LEN: usize = 6;

struct StoredUser {
    user: AuthUser,
    password: String,
}

#[derive(Default)]
struct Store {
    users: Vec<StoredUser>,
    session: Option<Session>,
    tables: HashMap<Table, Vec<Value>>,
    inserts: HashMap<Table, usize>,
    fail_insert: HashMap<Table, BackendError>,
    fail_select: HashMap<Table, BackendError>,
    unique_registrations: bool,
}

pub struct MemoryBackend {
    store: Mutex<Store>,
    auth: AuthBroadcast,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self { store: Mutex::new(Store::default()), auth: AuthBroadcast::new() }
    }

    /// Reject a second registration of the same user for the same event.
    #[must_use]
    pub fn with_unique_registrations(self) -> Self {
        self.lock().unique_registrations = true;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create an auth user without signing in.
    pub fn create_user(&self, email: &str, password: &str) -> AuthUser {
        let user = AuthUser { id: Uuid::new_v4(), email: Some(email.to_owned()) };
        self.lock()
            .users
            .push(StoredUser { user: user.clone(), password: password.to_owned() });
        user
    }

    /// Whether an auth account exists for `email`.
    #[must_use]
    pub fn user_exists(&self, email: &str) -> bool {
        self.lock()
            .users
            .iter()
            .any(|u| u.user.email.as_deref() == Some(email))
    }

    /// Put a row straight into `table`, bypassing hooks and counters.
    ///
    /// # Errors
    ///
    /// Fails when `row` does not serialize to an object or violates a
    /// uniqueness rule.
    pub fn seed<T: Serialize>(&self, table: Table, row: &T) -> Result<Value, BackendError> {
        let value = serde_json::to_value(row).map_err(|e| BackendError::Parse(e.to_string()))?;
        let mut store = self.lock();
        let mut rows = prepare_rows(&store, table, vec![value])?;
        let seeded = rows.pop().unwrap_or(Value::Null);
        store.tables.entry(table).or_default().push(seeded.clone());
        Ok(seeded)
    }

    /// Fail the next insert into `table` with `message`.
    pub fn fail_next_insert(&self, table: Table, message: &str) {
        self.lock().fail_insert.insert(table, api_error(400, None, message));
    }

    /// Fail the next select from `table` with `message`.
    pub fn fail_next_select(&self, table: Table, message: &str) {
        self.lock().fail_select.insert(table, api_error(400, None, message));
    }

    /// Number of insert calls issued against `table`, successful or not.
    #[must_use]
    pub fn insert_count(&self, table: Table) -> usize {
        self.lock().inserts.get(&table).copied().unwrap_or(0)
    }

    /// Snapshot of every row in `table`.
    #[must_use]
    pub fn rows(&self, table: Table) -> Vec<Value> {
        self.lock().tables.get(&table).cloned().unwrap_or_default()
    }

    /// Number of live auth-state subscriptions.
    #[must_use]
    pub fn auth_listener_count(&self) -> usize {
        self.auth.listener_count()
    }

    fn open_session(&self, store: &mut Store, user: AuthUser) -> Session {
        let session = Session {
            access_token: format!("memory-{}", Uuid::new_v4()),
            refresh_token: Some(format!("memory-refresh-{}", Uuid::new_v4())),
            expires_at: None,
            user,
        };
        store.session = Some(session.clone());
        self.auth.emit(AuthEvent::SignedIn, Some(session.clone()));
        session
    }
}

#[async_trait::async_trait]
impl Backend for MemoryBackend {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        let mut store = self.lock();
        let user = store
            .users
            .iter()
            .find(|u| u.user.email.as_deref() == Some(email) && u.password == password)
            .map(|u| u.user.clone())
            .ok_or_else(|| auth_error(400, "Invalid login credentials"))?;
        Ok(self.open_session(&mut store, user))
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUp, BackendError> {
        if password.len() < MIN_PASSWORD_LEN {
            return Err(auth_error(422, "Password should be at least 6 characters."));
        }
        let mut store = self.lock();
        if store.users.iter().any(|u| u.user.email.as_deref() == Some(email)) {
            return Err(auth_error(422, "User already registered"));
        }
        let user = AuthUser { id: Uuid::new_v4(), email: Some(email.to_owned()) };
        store
            .users
            .push(StoredUser { user: user.clone(), password: password.to_owned() });
        let session = self.open_session(&mut store, user.clone());
        Ok(SignUp { user: Some(user), session: Some(session) })
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.lock().session = None;
        self.auth.emit(AuthEvent::SignedOut, None);
        Ok(())
    }

    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        Ok(self.lock().session.clone())
    }

    fn on_auth_state_change(&self) -> AuthSubscription {
        self.auth.subscribe()
    }

    async fn select(&self, query: &Select) -> Result<Vec<Value>, BackendError> {
        let mut store = self.lock();
        if let Some(err) = store.fail_select.remove(&query.table) {
            return Err(err);
        }

        let mut rows: Vec<Value> = store
            .tables
            .get(&query.table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| query.filters.iter().all(|(col, val)| matches_eq(row.get(col), val)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(order) = &query.order {
            rows.sort_by(|a, b| {
                let ord = compare_values(a.get(&order.column), b.get(&order.column));
                match order.direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }

        let projected: Vec<Value> = rows
            .into_iter()
            .map(|row| project(&store, query, row))
            .collect();

        if query.single && projected.len() != 1 {
            return Err(not_single_row());
        }
        Ok(projected)
    }

    async fn insert(&self, table: Table, rows: Vec<Value>) -> Result<(), BackendError> {
        let mut store = self.lock();
        *store.inserts.entry(table).or_default() += 1;
        if let Some(err) = store.fail_insert.remove(&table) {
            return Err(err);
        }
        let prepared = prepare_rows(&store, table, rows)?;
        store.tables.entry(table).or_default().extend(prepared);
        Ok(())
    }
}

// =============================================================================
// ROW HELPERS
// =============================================================================

fn auth_error(status: u16, message: &str) -> BackendError {
    BackendError::Auth { status, message: message.to_owned() }
}

fn api_error(status: u16, code: Option<&str>, message: &str) -> BackendError {
    BackendError::Api { status, code: code.map(str::to_owned), message: message.to_owned() }
}

fn unique_violation(constraint: &str) -> BackendError {
    api_error(
        409,
        Some(UNIQUE_VIOLATION),
        &format!("duplicate key value violates unique constraint \"{constraint}\""),
    )
}

/// Fill generated columns and check uniqueness against stored and batch rows.
fn prepare_rows(store: &Store, table: Table, rows: Vec<Value>) -> Result<Vec<Value>, BackendError> {
    let existing = store.tables.get(&table).map(Vec::as_slice).unwrap_or_default();
    let mut prepared: Vec<Value> = Vec::with_capacity(rows.len());

    for row in rows {
        let Value::Object(mut fields) = row else {
            return Err(api_error(400, Some("PGRST102"), "All object keys must match"));
        };
        fields
            .entry("id")
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
        if table == Table::EventParticipants {
            fields.entry("registered_at").or_insert_with(now_timestamp);
        }

        let mut seen = existing.iter().chain(prepared.iter());
        let clash = match table {
            Table::Profiles | Table::Events => seen
                .any(|other| other.get("id") == fields.get("id"))
                .then(|| unique_violation(&format!("{}_pkey", table.as_str()))),
            Table::EventParticipants if store.unique_registrations => seen
                .any(|other| {
                    other.get("event_id") == fields.get("event_id") && other.get("user_id") == fields.get("user_id")
                })
                .then(|| unique_violation("event_participants_event_id_user_id_key")),
            Table::EventParticipants => None,
        };
        if let Some(err) = clash {
            return Err(err);
        }
        prepared.push(Value::Object(fields));
    }
    Ok(prepared)
}

fn project(store: &Store, query: &Select, row: Value) -> Value {
    let Value::Object(fields) = row else {
        return row;
    };
    let mut out = match &query.columns {
        super::Columns::All => fields.clone(),
        super::Columns::List(cols) => pick(&fields, cols),
    };
    if let Some(embed) = &query.embed {
        out.insert(embed.table.as_str().to_owned(), embedded(store, embed, fields.get(&embed.via)));
    }
    Value::Object(out)
}

fn embedded(store: &Store, embed: &Embed, key: Option<&Value>) -> Value {
    let Some(key) = key else {
        return Value::Null;
    };
    store
        .tables
        .get(&embed.table)
        .and_then(|rows| rows.iter().find(|r| r.get("id") == Some(key)))
        .and_then(Value::as_object)
        .map_or(Value::Null, |related| Value::Object(pick(related, &embed.columns)))
}

fn pick(fields: &Map<String, Value>, cols: &[String]) -> Map<String, Value> {
    cols.iter()
        .filter_map(|c| fields.get(c).map(|v| (c.clone(), v.clone())))
        .collect()
}

fn matches_eq(value: Option<&Value>, expected: &str) -> bool {
    match value {
        Some(Value::String(s)) => s == expected,
        Some(Value::Number(n)) => n.to_string() == expected,
        Some(Value::Bool(b)) => b.to_string() == expected,
        _ => false,
    }
}

/// Ascending comparison with nulls last. Timestamps compare chronologically.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            x.as_f64().partial_cmp(&y.as_f64()).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => match (parse_timestamp(x), parse_timestamp(y)) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            _ => x.cmp(y),
        },
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

fn now_timestamp() -> Value {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_or(Value::Null, Value::String)
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
