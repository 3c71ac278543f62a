//! Application configuration parsed from environment variables.

use std::path::PathBuf;

use uuid::Uuid;

pub const DEFAULT_SESSION_FILE: &str = ".eventhub-session.json";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("missing config: env var {var} not set")]
    Missing { var: &'static str },

    /// A variable is set but cannot be used.
    #[error("invalid config: {var}={value} ({reason})")]
    Invalid { var: &'static str, value: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Project URL of the hosted backend, without a trailing slash.
    pub supabase_url: String,
    /// Public (anon) API key sent with every request.
    pub anon_key: String,
    /// Where the signed-in session is persisted between runs.
    pub session_file: PathBuf,
    pub timeouts: HttpTimeouts,
    /// Community attached to events created from this client.
    pub community_id: Option<Uuid>,
}

impl AppConfig {
    /// Build typed config from environment variables.
    ///
    /// Required:
    /// - `SUPABASE_URL`
    /// - `SUPABASE_ANON_KEY`
    ///
    /// Optional:
    /// - `EVENTHUB_SESSION_FILE`: default `.eventhub-session.json`
    /// - `EVENTHUB_REQUEST_TIMEOUT_SECS`: default 30
    /// - `EVENTHUB_CONNECT_TIMEOUT_SECS`: default 10
    /// - `EVENTHUB_COMMUNITY_ID`: UUID, unset by default
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or the community
    /// id is not a UUID.
    pub fn from_env() -> Result<Self, ConfigError> {
        let supabase_url = required("SUPABASE_URL")?
            .trim_end_matches('/')
            .to_owned();
        let anon_key = required("SUPABASE_ANON_KEY")?;
        let session_file = std::env::var("EVENTHUB_SESSION_FILE")
            .map_or_else(|_| PathBuf::from(DEFAULT_SESSION_FILE), PathBuf::from);
        let timeouts = HttpTimeouts {
            request_secs: env_parse_u64("EVENTHUB_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: env_parse_u64("EVENTHUB_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };
        let community_id = parse_community(std::env::var("EVENTHUB_COMMUNITY_ID").ok().as_deref())?;

        Ok(Self { supabase_url, anon_key, session_file, timeouts, community_id })
    }
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing { var })
}

fn env_parse_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_community(raw: Option<&str>) -> Result<Option<Uuid>, ConfigError> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(value) => Uuid::parse_str(value).map(Some).map_err(|e| ConfigError::Invalid {
            var: "EVENTHUB_COMMUNITY_ID",
            value: value.to_owned(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
