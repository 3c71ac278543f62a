//! Dashboard page: role-gated event list, management, and registration.
//!
//! DESIGN
//! ======
//! The page holds transient copies of backend rows: the viewer's role, the
//! event list (always ordered by start date), and the registrants of at most
//! one selected event. Every mutation is followed by a re-fetch rather than
//! a local update.
//!
//! ERROR HANDLING
//! ==============
//! Fetch and insert failures never surface as errors. They are logged with
//! `warn!` and leave the previous state in place. The one exception is the
//! event form, which is validated locally and reports [`EventFormError`]
//! before anything is sent.
//!
//! REGISTRATION
//! ============
//! "Already registered" is derived only from the participants list that is
//! currently loaded. Registering for an event whose registrants were never
//! fetched issues a fresh insert even when the user is already registered;
//! only a store-side unique constraint (reported as
//! [`RegisterOutcome::Duplicate`]) catches that case.

use std::fmt::Write as _;
use std::sync::Arc;

use records::{AuthUser, Event, EventParticipant, InputError, NewEvent, NewRegistration, Role, format_date, parse_timestamp};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::{Backend, BackendError, Direction, Select, Table, fetch, fetch_one, insert_one};

#[derive(Debug, thiserror::Error)]
pub enum EventFormError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{field}: {source}")]
    InvalidDate { field: &'static str, source: InputError },

    #[error("end date must not be before start date")]
    EndBeforeStart,

    #[error("max participants must be a non-negative whole number, got `{0}`")]
    InvalidCapacity(String),

    #[error("only admins can create events")]
    Forbidden,
}

/// Which panel the dashboard shows for the viewer's role.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DashboardView {
    /// Create form, full list, and registrant drill-down.
    Management,
    /// Read-only list with a register action.
    Browse,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    /// The backend refused the insert; the form keeps its values.
    Rejected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered,
    /// The loaded participants already include the viewer; nothing was sent.
    AlreadyRegistered,
    /// The store rejected the insert as a duplicate registration.
    Duplicate,
    Failed,
}

/// Field values of the create-event form, as typed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventForm {
    pub title: String,
    pub description: String,
    pub event_type: String,
    /// `YYYY-MM-DDTHH:MM`, read as UTC.
    pub start_date: String,
    pub end_date: String,
    pub location: String,
    /// Blank means zero.
    pub max_participants: String,
}

impl EventForm {
    /// Check every field and build the insert payload.
    ///
    /// # Errors
    ///
    /// Returns the first field that is blank or malformed.
    pub fn validate(&self, created_by: Uuid, community_id: Option<Uuid>) -> Result<NewEvent, EventFormError> {
        let title = required("title", &self.title)?;
        let event_type = required("event type", &self.event_type)?;
        let description = required("description", &self.description)?;
        let location = required("location", &self.location)?;
        let start_date = parse_date("start date", &self.start_date)?;
        let end_date = parse_date("end date", &self.end_date)?;
        if end_date < start_date {
            return Err(EventFormError::EndBeforeStart);
        }

        let capacity = self.max_participants.trim();
        let max_participants = if capacity.is_empty() {
            0
        } else {
            capacity
                .parse::<i32>()
                .ok()
                .filter(|n| *n >= 0)
                .ok_or_else(|| EventFormError::InvalidCapacity(capacity.to_owned()))?
        };

        Ok(NewEvent {
            title,
            description,
            event_type,
            start_date,
            end_date,
            location,
            max_participants,
            community_id,
            created_by,
        })
    }
}

fn required(field: &'static str, value: &str) -> Result<String, EventFormError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(EventFormError::Missing(field));
    }
    Ok(value.to_owned())
}

fn parse_date(field: &'static str, value: &str) -> Result<time::OffsetDateTime, EventFormError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(EventFormError::Missing(field));
    }
    parse_timestamp(value).map_err(|source| EventFormError::InvalidDate { field, source })
}

#[derive(Deserialize)]
struct RoleRow {
    #[serde(default)]
    role: Role,
}

// =============================================================================
// PAGE
// =============================================================================

pub struct DashboardPage {
    backend: Arc<dyn Backend>,
    user: AuthUser,
    role: Role,
    events: Vec<Event>,
    participants: Vec<EventParticipant>,
    selected_event: Option<Uuid>,
    show_event_form: bool,
    community_id: Option<Uuid>,
    pub form: EventForm,
}

impl DashboardPage {
    /// A page for `user` with the default role and nothing loaded yet.
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, user: AuthUser) -> Self {
        Self {
            backend,
            user,
            role: Role::User,
            events: Vec::new(),
            participants: Vec::new(),
            selected_event: None,
            show_event_form: false,
            community_id: None,
            form: EventForm::default(),
        }
    }

    /// Attach `community_id` to every event this page creates.
    #[must_use]
    pub fn with_community(mut self, community_id: Option<Uuid>) -> Self {
        self.community_id = community_id;
        self
    }

    /// Load the viewer's role and the event list concurrently.
    pub async fn mount(&mut self) {
        let role_query = Select::table(Table::Profiles)
            .columns(&["role"])
            .eq("id", self.user.id)
            .single();
        let events_query = events_query();

        let (role, events) = tokio::join!(
            fetch_one::<RoleRow>(&*self.backend, &role_query),
            fetch::<Event>(&*self.backend, &events_query),
        );

        match role {
            Ok(row) => self.role = row.role,
            Err(e) => warn!(user_id = %self.user.id, error = %e, "role fetch failed; keeping current role"),
        }
        match events {
            Ok(events) => self.events = events,
            Err(e) => warn!(error = %e, "event fetch failed; keeping current list"),
        }
    }

    /// Re-fetch the event list ordered by start date.
    pub async fn fetch_events(&mut self) {
        match fetch::<Event>(&*self.backend, &events_query()).await {
            Ok(events) => self.events = events,
            Err(e) => warn!(error = %e, "event fetch failed; keeping current list"),
        }
    }

    /// Load the registrants of `event_id` and make it the selected event.
    pub async fn fetch_participants(&mut self, event_id: Uuid) {
        let query = Select::table(Table::EventParticipants)
            .embed(Table::Profiles, "user_id", &["full_name", "email"])
            .eq("event_id", event_id);
        match fetch::<EventParticipant>(&*self.backend, &query).await {
            Ok(participants) => {
                self.participants = participants;
                self.selected_event = Some(event_id);
            }
            Err(e) => warn!(%event_id, error = %e, "participant fetch failed"),
        }
    }

    pub fn toggle_event_form(&mut self) {
        self.show_event_form = !self.show_event_form;
    }

    /// Validate the form and insert the event.
    ///
    /// On success the form is hidden and cleared and the list re-fetched.
    /// A backend failure keeps the form open with its values.
    ///
    /// # Errors
    ///
    /// Returns [`EventFormError`] when the viewer may not create events or
    /// the form is incomplete. No insert is issued in that case.
    pub async fn create_event(&mut self) -> Result<CreateOutcome, EventFormError> {
        if !self.role.can_manage_events() {
            return Err(EventFormError::Forbidden);
        }
        let event = self.form.validate(self.user.id, self.community_id)?;

        if let Err(e) = insert_one(&*self.backend, Table::Events, &event).await {
            warn!(user_id = %self.user.id, error = %e, "event insert failed");
            return Ok(CreateOutcome::Rejected);
        }
        info!(user_id = %self.user.id, title = %event.title, "event created");

        self.show_event_form = false;
        self.form = EventForm::default();
        self.fetch_events().await;
        Ok(CreateOutcome::Created)
    }

    /// Register the viewer for `event_id`.
    pub async fn register(&mut self, event_id: Uuid) -> RegisterOutcome {
        if self.is_registered(event_id) {
            return RegisterOutcome::AlreadyRegistered;
        }

        let row = NewRegistration::registered(event_id, self.user.id);
        match insert_one(&*self.backend, Table::EventParticipants, &row).await {
            Ok(()) => {
                info!(%event_id, user_id = %self.user.id, "registered for event");
                self.fetch_events().await;
                RegisterOutcome::Registered
            }
            Err(e) if e.is_unique_violation() => {
                info!(%event_id, user_id = %self.user.id, "registration already on record");
                RegisterOutcome::Duplicate
            }
            Err(e) => {
                warn!(%event_id, user_id = %self.user.id, error = %e, "registration insert failed");
                RegisterOutcome::Failed
            }
        }
    }

    /// Whether the loaded participants include the viewer for `event_id`.
    #[must_use]
    pub fn is_registered(&self, event_id: Uuid) -> bool {
        self.participants
            .iter()
            .any(|p| p.event_id == event_id && p.user_id == self.user.id)
    }

    /// Sign out. The auth context picks up the change.
    ///
    /// # Errors
    ///
    /// Returns the backend error if sign-out failed.
    pub async fn sign_out(&self) -> Result<(), BackendError> {
        self.backend.sign_out().await
    }

    #[must_use]
    pub fn view(&self) -> DashboardView {
        if self.role.can_manage_events() { DashboardView::Management } else { DashboardView::Browse }
    }

    #[must_use]
    pub fn user(&self) -> &AuthUser {
        &self.user
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    #[must_use]
    pub fn participants(&self) -> &[EventParticipant] {
        &self.participants
    }

    #[must_use]
    pub fn selected_event(&self) -> Option<Uuid> {
        self.selected_event
    }

    #[must_use]
    pub fn is_form_visible(&self) -> bool {
        self.show_event_form
    }

    /// Plain-text rendering of the page.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let email = self.user.email.as_deref().unwrap_or("unknown");
        let _ = writeln!(out, "College Event Hub");
        let _ = writeln!(out, "Signed in as {email} ({})", self.role);
        let _ = writeln!(out);

        match self.view() {
            DashboardView::Management => self.render_management(&mut out),
            DashboardView::Browse => self.render_browse(&mut out),
        }
        out
    }

    fn render_management(&self, out: &mut String) {
        let _ = writeln!(out, "Manage Events");
        if self.show_event_form {
            let f = &self.form;
            let _ = writeln!(
                out,
                "  New event: title={:?} type={:?} start={:?} end={:?} location={:?} max={:?}",
                f.title, f.event_type, f.start_date, f.end_date, f.location, f.max_participants
            );
        }
        if self.events.is_empty() {
            let _ = writeln!(out, "  No events.");
        }
        for event in &self.events {
            render_event(out, event);
            if self.selected_event == Some(event.id) {
                let _ = writeln!(out, "    Registered Participants");
                if self.participants.is_empty() {
                    let _ = writeln!(out, "      (none)");
                }
                for p in &self.participants {
                    let _ = writeln!(out, "      {} (Registered: {})", p.display_name(), format_date(p.registered_at));
                }
            }
        }
    }

    fn render_browse(&self, out: &mut String) {
        let _ = writeln!(out, "Available Events");
        if self.events.is_empty() {
            let _ = writeln!(out, "  No events.");
        }
        for event in &self.events {
            render_event(out, event);
            let label = if self.is_registered(event.id) { "Registered" } else { "Register" };
            let _ = writeln!(out, "    [{label}]");
        }
    }
}

fn render_event(out: &mut String, event: &Event) {
    let _ = writeln!(out, "  {}  ({})", event.title, event.id);
    let _ = writeln!(out, "    {} \u{2022} {}", format_date(event.start_date), event.location);
    if !event.description.is_empty() {
        let _ = writeln!(out, "    {}", event.description);
    }
}

fn events_query() -> Select {
    Select::table(Table::Events).order("start_date", Direction::Ascending)
}

#[cfg(test)]
#[path = "dashboard_test.rs"]
mod tests;
