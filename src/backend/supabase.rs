//! Hosted backend client over HTTP.
//!
//! Thin wrapper around the GoTrue auth API (`/auth/v1`) and the PostgREST
//! data API (`/rest/v1`). Response decoding lives in pure functions
//! (`parse_token_response`, `parse_sign_up`, `parse_error_message`, ...) so
//! it can be tested without a network.
//!
//! SESSION
//! =======
//! The signed-in session is persisted to a JSON file (mode 0600 on unix,
//! replaced atomically) and restored on startup. `get_session` refreshes an expired access token when a refresh
//! token is available; a failed refresh drops the session.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use records::{AuthUser, Session};
use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{AuthBroadcast, AuthEvent, AuthSubscription, Backend, BackendError, Select, SignUp, Table};
use crate::config::AppConfig;

const SINGLE_OBJECT_ACCEPT: &str = "application/vnd.pgrst.object+json";
/// The session file holds bearer and refresh tokens.
#[cfg(unix)]
const SESSION_FILE_MODE: u32 = 0o600;

// =============================================================================
// SESSION STORE
// =============================================================================

/// JSON file holding the persisted session.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// # Errors
    ///
    /// Fails when the file exists but cannot be read or decoded.
    pub fn load(&self) -> Result<Option<Session>, BackendError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BackendError::SessionStore(e.to_string())),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| BackendError::SessionStore(e.to_string()))
    }

    /// Write the session to a sibling temp file, then rename it into place.
    /// On unix the file is readable by the owner only.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be written.
    pub fn save(&self, session: &Session) -> Result<(), BackendError> {
        let text = serde_json::to_string_pretty(session).map_err(|e| BackendError::SessionStore(e.to_string()))?;
        let tmp = self.temp_path();
        let written = write_private(&tmp, text.as_bytes()).and_then(|()| std::fs::rename(&tmp, &self.path));
        if let Err(e) = written {
            let _ = std::fs::remove_file(&tmp);
            return Err(BackendError::SessionStore(e.to_string()));
        }
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// # Errors
    ///
    /// Fails when the file exists but cannot be removed.
    pub fn clear(&self) -> Result<(), BackendError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BackendError::SessionStore(e.to_string())),
        }
    }
}

/// Create (or truncate) `path` with owner-only permissions and write `bytes`.
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(SESSION_FILE_MODE);
    }
    let mut file = options.open(path)?;
    // `mode` only applies on creation; a leftover temp file keeps its old bits.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(SESSION_FILE_MODE))?;
    }
    file.write_all(bytes)?;
    file.sync_all()
}

// =============================================================================
// CLIENT
// =============================================================================

pub struct SupabaseBackend {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    store: SessionStore,
    session: RwLock<Option<Session>>,
    auth: AuthBroadcast,
}

impl SupabaseBackend {
    /// Build a client from config and restore any persisted session.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &AppConfig) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| BackendError::HttpClientBuild(e.to_string()))?;

        let store = SessionStore::new(config.session_file.clone());
        let session = store.load().unwrap_or_else(|e| {
            warn!(error = %e, path = %store.path().display(), "ignoring unreadable session file");
            None
        });

        Ok(Self {
            http,
            base_url: config.supabase_url.trim_end_matches('/').to_owned(),
            anon_key: config.anon_key.clone(),
            store,
            session: RwLock::new(session),
            auth: AuthBroadcast::new(),
        })
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.base_url)
    }

    fn rest_url(&self, table: Table) -> String {
        format!("{}/rest/v1/{}", self.base_url, table.as_str())
    }

    async fn bearer(&self) -> String {
        self.session
            .read()
            .await
            .as_ref()
            .map_or_else(|| self.anon_key.clone(), |s| s.access_token.clone())
    }

    /// POST to the auth API and return the raw success body.
    async fn post_auth(&self, url: &str, body: &Value, bearer: Option<&str>) -> Result<String, BackendError> {
        let mut request = self.http.post(url).header("apikey", &self.anon_key).json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;

        if !(200..300).contains(&status) {
            return Err(BackendError::Auth { status, message: parse_error_message(status, &text) });
        }
        Ok(text)
    }

    async fn replace_session(&self, session: Option<Session>) {
        let persisted = match &session {
            Some(s) => self.store.save(s),
            None => self.store.clear(),
        };
        if let Err(e) = persisted {
            warn!(error = %e, "session not persisted");
        }
        *self.session.write().await = session;
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, BackendError> {
        let url = self.auth_url("token?grant_type=refresh_token");
        let body = serde_json::json!({ "refresh_token": refresh_token });
        let text = self.post_auth(&url, &body, None).await?;
        parse_token_response(&text, now_unix())
    }
}

#[async_trait::async_trait]
impl Backend for SupabaseBackend {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        let url = self.auth_url("token?grant_type=password");
        let body = serde_json::json!({ "email": email, "password": password });
        let text = self.post_auth(&url, &body, None).await?;
        let session = parse_token_response(&text, now_unix())?;

        info!(user_id = %session.user.id, "signed in");
        self.replace_session(Some(session.clone())).await;
        self.auth.emit(AuthEvent::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUp, BackendError> {
        let url = self.auth_url("signup");
        let body = serde_json::json!({ "email": email, "password": password });
        let text = self.post_auth(&url, &body, None).await?;
        let signup = parse_sign_up(&text, now_unix())?;

        if let Some(session) = &signup.session {
            info!(user_id = %session.user.id, "signed up");
            self.replace_session(Some(session.clone())).await;
            self.auth.emit(AuthEvent::SignedIn, Some(session.clone()));
        }
        Ok(signup)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let token = self.session.read().await.as_ref().map(|s| s.access_token.clone());
        let result = match token {
            Some(token) => self
                .post_auth(&self.auth_url("logout"), &serde_json::json!({}), Some(&token))
                .await
                .map(|_| ()),
            None => Ok(()),
        };

        // The local session goes regardless; an already-revoked token is not an error.
        self.replace_session(None).await;
        self.auth.emit(AuthEvent::SignedOut, None);
        match result {
            Err(BackendError::Auth { status: 401 | 403 | 404, .. }) => Ok(()),
            other => other,
        }
    }

    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        let Some(current) = self.session.read().await.clone() else {
            return Ok(None);
        };
        if !current.is_expired_at(now_unix()) {
            return Ok(Some(current));
        }

        let refreshed = match current.refresh_token.as_deref() {
            Some(token) => self.refresh(token).await,
            None => Err(BackendError::Auth { status: 401, message: "session expired".to_owned() }),
        };
        match refreshed {
            Ok(session) => {
                debug!(user_id = %session.user.id, "access token refreshed");
                self.replace_session(Some(session.clone())).await;
                self.auth.emit(AuthEvent::TokenRefreshed, Some(session.clone()));
                Ok(Some(session))
            }
            Err(e) => {
                warn!(error = %e, "session refresh failed; signing out locally");
                self.replace_session(None).await;
                self.auth.emit(AuthEvent::SignedOut, None);
                Ok(None)
            }
        }
    }

    fn on_auth_state_change(&self) -> AuthSubscription {
        self.auth.subscribe()
    }

    async fn select(&self, query: &Select) -> Result<Vec<Value>, BackendError> {
        let mut request = self
            .http
            .get(self.rest_url(query.table))
            .header("apikey", &self.anon_key)
            .bearer_auth(self.bearer().await)
            .query(&query.query_params());
        if query.single {
            request = request.header(reqwest::header::ACCEPT, SINGLE_OBJECT_ACCEPT);
        }

        let response = request
            .send()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;

        if !(200..300).contains(&status) {
            return Err(parse_api_error(status, &text));
        }
        parse_rows(&text, query.single)
    }

    async fn insert(&self, table: Table, rows: Vec<Value>) -> Result<(), BackendError> {
        let response = self
            .http
            .post(self.rest_url(table))
            .header("apikey", &self.anon_key)
            .header("Prefer", "return=minimal")
            .bearer_auth(self.bearer().await)
            .json(&rows)
            .send()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        if (200..300).contains(&status) {
            return Ok(());
        }
        let text = response
            .text()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;
        Err(parse_api_error(status, &text))
    }
}

fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(serde::Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

impl TokenResponse {
    fn into_session(self, now_unix: i64) -> Session {
        let expires_at = self
            .expires_at
            .or_else(|| self.expires_in.map(|secs| now_unix + secs));
        Session { access_token: self.access_token, refresh_token: self.refresh_token, expires_at, user: self.user }
    }
}

// =============================================================================
// PARSING
// =============================================================================

fn parse_token_response(text: &str, now_unix: i64) -> Result<Session, BackendError> {
    let token: TokenResponse = serde_json::from_str(text).map_err(|e| BackendError::Parse(e.to_string()))?;
    Ok(token.into_session(now_unix))
}

/// Sign-up answers with a full token response when the account is usable
/// right away, or with the bare user while email confirmation is pending.
fn parse_sign_up(text: &str, now_unix: i64) -> Result<SignUp, BackendError> {
    let value: Value = serde_json::from_str(text).map_err(|e| BackendError::Parse(e.to_string()))?;

    if value.get("access_token").is_some() {
        let session = serde_json::from_value::<TokenResponse>(value)
            .map_err(|e| BackendError::Parse(e.to_string()))?
            .into_session(now_unix);
        return Ok(SignUp { user: Some(session.user.clone()), session: Some(session) });
    }

    let user_value = match value.get("user") {
        Some(user) if !user.is_null() => user.clone(),
        _ if value.get("id").is_some() => value,
        _ => return Ok(SignUp::default()),
    };
    let user: AuthUser = serde_json::from_value(user_value).map_err(|e| BackendError::Parse(e.to_string()))?;
    Ok(SignUp { user: Some(user), session: None })
}

/// Human-readable message from an auth or data API error body.
fn parse_error_message(status: u16, text: &str) -> String {
    let from_json = serde_json::from_str::<Value>(text).ok().and_then(|v| {
        ["msg", "error_description", "message", "error"]
            .iter()
            .find_map(|key| v.get(key).and_then(Value::as_str).map(str::to_owned))
    });
    match from_json {
        Some(message) => message,
        None if !text.trim().is_empty() => text.trim().to_owned(),
        None => format!("request failed with status {status}"),
    }
}

fn parse_api_error(status: u16, text: &str) -> BackendError {
    let code = serde_json::from_str::<Value>(text).ok().and_then(|v| match v.get("code") {
        Some(Value::String(code)) => Some(code.clone()),
        Some(Value::Number(code)) => Some(code.to_string()),
        _ => None,
    });
    BackendError::Api { status, code, message: parse_error_message(status, text) }
}

fn parse_rows(text: &str, single: bool) -> Result<Vec<Value>, BackendError> {
    let value: Value = serde_json::from_str(text).map_err(|e| BackendError::Parse(e.to_string()))?;
    match value {
        Value::Array(rows) => Ok(rows),
        Value::Object(_) if single => Ok(vec![value]),
        other => Err(BackendError::Parse(format!("expected rows, got {other}"))),
    }
}

#[cfg(test)]
#[path = "supabase_test.rs"]
mod tests;
