//! JSON protocol spoken with provider binaries over stdin/stdout.
//!
//! One request line in, one response document out. The envelope is the one
//! `caldir-provider-*` executables understand.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::calendar::event::Event;

pub trait ProviderCommand: Serialize {
    type Response: DeserializeOwned;
    fn command() -> Command;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    CreateEvent,
}

/// Request sent to the provider.
#[derive(Debug, Serialize, Deserialize)]
pub struct Request {
    pub command: Command,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Response sent back by the provider.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response<T> {
    Success { data: T },
    Error { error: String },
}

// ============================================================================
// Event wire types
// ============================================================================

/// An event as provider binaries read it. Fields caldraft never fills are
/// sent empty so providers can deserialize the full shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderEvent {
    pub id: String,
    pub summary: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: EventTime,
    pub end: EventTime,
    pub status: EventStatus,
    /// RRULE, EXDATE lines
    pub recurrence: Option<Vec<String>>,
    /// Set on instances of a recurring event only
    pub original_start: Option<EventTime>,
    pub reminders: Vec<Reminder>,
    pub transparency: Transparency,
    pub organizer: Option<Attendee>,
    pub attendees: Vec<Attendee>,
    pub conference_url: Option<String>,
    pub updated: Option<DateTime<Utc>>,
    pub sequence: Option<i64>,
    pub custom_properties: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventTime {
    DateTime(DateTime<Utc>),
    Date(NaiveDate),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStatus {
    Confirmed,
    Tentative,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transparency {
    Opaque,
    Transparent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    /// Minutes before the event
    pub minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attendee {
    pub name: Option<String>,
    pub email: String,
    pub response_status: Option<String>,
}

impl From<&Event> for ProviderEvent {
    fn from(event: &Event) -> Self {
        ProviderEvent {
            id: event.uid.clone(),
            summary: event.summary.clone(),
            description: event.description.clone(),
            location: event.location.clone(),
            start: EventTime::DateTime(event.start),
            end: EventTime::DateTime(event.end),
            status: EventStatus::Confirmed,
            recurrence: (!event.recurrence.is_empty()).then(|| event.recurrence.clone()),
            original_start: None,
            reminders: Vec::new(),
            transparency: Transparency::Opaque,
            organizer: None,
            attendees: Vec::new(),
            conference_url: None,
            updated: None,
            sequence: None,
            custom_properties: Vec::new(),
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

/// Create a new event.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateEvent {
    /// Provider-specific settings from the destination config
    /// (e.g. google_account, google_calendar_id)
    #[serde(flatten)]
    pub remote_config: serde_json::Map<String, serde_json::Value>,
    pub event: ProviderEvent,
}

impl ProviderCommand for CreateEvent {
    /// Providers echo the stored event; only its identifier matters here.
    type Response = serde_json::Value;
    fn command() -> Command {
        Command::CreateEvent
    }
}
