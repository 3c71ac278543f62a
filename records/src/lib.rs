//! Shared row types for the event hub backend.
//!
//! This crate owns the shapes exchanged with the hosted backend: auth users
//! and sessions plus rows of the `profiles`, `events`, and
//! `event_participants` tables. Timestamps are written as RFC 3339 and read
//! leniently (see [`parse_timestamp`]) since form inputs and `timestamp`
//! columns both arrive without an offset.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::OffsetDateTime;
use time::PrimitiveDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use uuid::Uuid;

/// Registration status written for a fresh registration.
pub const STATUS_REGISTERED: &str = "registered";

/// Seconds before `expires_at` at which a session is already treated as expired.
pub const SESSION_EXPIRY_MARGIN_SECS: i64 = 10;

/// Error returned when user-provided input cannot be interpreted.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    /// The value is not a recognized date/time.
    #[error("invalid date/time `{0}`; expected YYYY-MM-DDTHH:MM")]
    InvalidDateTime(String),
}

// =============================================================================
// ROLE
// =============================================================================

/// Application role stored on a profile.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Role {
    #[default]
    User,
    Admin,
    SuperAdmin,
}

impl Role {
    /// Wire name of the role.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
            Self::SuperAdmin => "super_admin",
        }
    }

    /// Parse a stored role. Anything outside the known set is a plain user.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "admin" => Self::Admin,
            "super_admin" => Self::SuperAdmin,
            _ => Self::User,
        }
    }

    /// Whether the role may create events and inspect registrants.
    #[must_use]
    pub fn can_manage_events(self) -> bool {
        matches!(self, Self::Admin | Self::SuperAdmin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map_or(Self::User, Self::parse))
    }
}

// =============================================================================
// AUTH
// =============================================================================

/// Identity issued by the auth service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

/// An authenticated session as returned by the auth service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix seconds at which `access_token` stops being accepted.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

impl Session {
    /// Whether the access token is expired (or about to be) at `now_unix`.
    #[must_use]
    pub fn is_expired_at(&self, now_unix: i64) -> bool {
        self.expires_at
            .is_some_and(|at| at - SESSION_EXPIRY_MARGIN_SECS <= now_unix)
    }
}

// =============================================================================
// PROFILES
// =============================================================================

/// A row of the `profiles` table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
}

/// Insert payload for the profile created right after sign-up.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NewProfile {
    pub id: Uuid,
    pub role: Role,
    pub email: Option<String>,
}

impl NewProfile {
    /// Default profile for a freshly registered user.
    #[must_use]
    pub fn for_user(user: &AuthUser) -> Self {
        Self { id: user.id, role: Role::User, email: user.email.clone() }
    }
}

// =============================================================================
// EVENTS
// =============================================================================

/// A row of the `events` table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub event_type: String,
    #[serde(with = "timestamp")]
    pub start_date: OffsetDateTime,
    #[serde(with = "timestamp")]
    pub end_date: OffsetDateTime,
    #[serde(default, deserialize_with = "null_as_default")]
    pub location: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub max_participants: i32,
    #[serde(default)]
    pub community_id: Option<Uuid>,
    #[serde(default)]
    pub created_by: Option<Uuid>,
}

/// Insert payload for an event created from the management form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NewEvent {
    pub title: String,
    pub description: String,
    pub event_type: String,
    #[serde(with = "timestamp")]
    pub start_date: OffsetDateTime,
    #[serde(with = "timestamp")]
    pub end_date: OffsetDateTime,
    pub location: String,
    pub max_participants: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub community_id: Option<Uuid>,
    pub created_by: Uuid,
}

// =============================================================================
// REGISTRATIONS
// =============================================================================

/// Display fields of the registrant, embedded from `profiles`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantProfile {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// A row of `event_participants` joined with the registrant's profile.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventParticipant {
    pub id: Uuid,
    pub event_id: Uuid,
    pub user_id: Uuid,
    #[serde(default, deserialize_with = "null_as_default")]
    pub registration_status: String,
    #[serde(with = "timestamp")]
    pub registered_at: OffsetDateTime,
    #[serde(default)]
    pub profiles: Option<ParticipantProfile>,
}

impl EventParticipant {
    /// Full name when present, otherwise email.
    #[must_use]
    pub fn display_name(&self) -> &str {
        let Some(profile) = &self.profiles else {
            return "";
        };
        profile
            .full_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .or(profile.email.as_deref())
            .unwrap_or_default()
    }
}

/// Insert payload for a registration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NewRegistration {
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub registration_status: String,
}

impl NewRegistration {
    #[must_use]
    pub fn registered(event_id: Uuid, user_id: Uuid) -> Self {
        Self { event_id, user_id, registration_status: STATUS_REGISTERED.to_owned() }
    }
}

// =============================================================================
// TIMESTAMPS
// =============================================================================

/// Parse a stored or user-entered timestamp.
///
/// Accepts RFC 3339 as well as offset-less `YYYY-MM-DDTHH:MM[:SS[.fff]]`,
/// which is read as UTC.
///
/// # Errors
///
/// Returns [`InputError::InvalidDateTime`] when neither form matches.
pub fn parse_timestamp(raw: &str) -> Result<OffsetDateTime, InputError> {
    let raw = raw.trim();
    if let Ok(ts) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(ts);
    }

    let minutes = format_description!("[year]-[month]-[day]T[hour]:[minute]");
    let seconds = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    let fractional = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]");

    PrimitiveDateTime::parse(raw, &minutes)
        .or_else(|_| PrimitiveDateTime::parse(raw, &seconds))
        .or_else(|_| PrimitiveDateTime::parse(raw, &fractional))
        .map(PrimitiveDateTime::assume_utc)
        .map_err(|_| InputError::InvalidDateTime(raw.to_owned()))
}

/// Render the calendar date as `M/D/YYYY`.
#[must_use]
pub fn format_date(ts: OffsetDateTime) -> String {
    let short = format_description!("[month padding:none]/[day padding:none]/[year]");
    ts.format(&short).unwrap_or_else(|_| ts.date().to_string())
}

/// Serde adapter: RFC 3339 out, [`parse_timestamp`] in.
pub mod timestamp {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::OffsetDateTime;
    use time::format_description::well_known::Rfc3339;

    /// # Errors
    ///
    /// Fails when the timestamp has no RFC 3339 representation.
    pub fn serialize<S: Serializer>(ts: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        let text = ts.format(&Rfc3339).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&text)
    }

    /// # Errors
    ///
    /// Fails when the value is not a string in an accepted format.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<OffsetDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_timestamp(&raw).map_err(serde::de::Error::custom)
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
