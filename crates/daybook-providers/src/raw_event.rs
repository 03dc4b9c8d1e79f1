//! Raw event type from calendar providers.
//!
//! [`RawEvent`] is the provider-agnostic shape of a calendar event before it is
//! turned into a [`daybook_core::Meeting`]. Upstream data is loosely typed, so
//! almost everything is optional; the normalizer decides the defaults.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// The start or end of a raw event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum RawEventTime {
    /// A specific instant.
    DateTime(DateTime<Utc>),
    /// An all-day date, with no time of day.
    Date(NaiveDate),
}

impl RawEventTime {
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self::DateTime(dt)
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self::Date(date)
    }

    pub fn is_all_day(&self) -> bool {
        matches!(self, Self::Date(_))
    }

    /// Returns the instant if this time has a time-of-day component.
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::DateTime(dt) => Some(*dt),
            Self::Date(_) => None,
        }
    }
}

/// An attendee of a calendar event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAttendee {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub organizer: bool,
    /// Rooms and equipment.
    #[serde(default)]
    pub resource: bool,
    /// True for the authenticated user's own entry.
    #[serde(default)]
    pub is_self: bool,
}

impl RawAttendee {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            ..Default::default()
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// A raw calendar event from a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Unique identifier for the event within the provider.
    pub id: String,

    /// Absent when the provider returned no usable start.
    #[serde(default)]
    pub start: Option<RawEventTime>,

    #[serde(default)]
    pub end: Option<RawEventTime>,

    /// The event title. May be missing or blank.
    #[serde(default)]
    pub summary: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub location: Option<String>,

    #[serde(default)]
    pub calendar_id: String,

    /// "confirmed", "tentative" or "cancelled".
    #[serde(default)]
    pub status: Option<String>,

    /// In the order the provider returned them.
    #[serde(default)]
    pub attendees: Vec<RawAttendee>,

    /// A link to the event in the provider's own UI.
    #[serde(default)]
    pub html_link: Option<String>,
}

impl RawEvent {
    /// Creates an event with only an id and a calendar.
    pub fn new(id: impl Into<String>, calendar_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            start: None,
            end: None,
            summary: None,
            description: None,
            location: None,
            calendar_id: calendar_id.into(),
            status: None,
            attendees: Vec::new(),
            html_link: None,
        }
    }

    /// Returns the summary unless it is missing or blank.
    pub fn title(&self) -> Option<&str> {
        self.summary
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn is_cancelled(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(|s| s.eq_ignore_ascii_case("cancelled"))
    }

    /// Returns the start instant if the event has a time of day.
    pub fn start_datetime(&self) -> Option<DateTime<Utc>> {
        self.start.as_ref().and_then(RawEventTime::as_datetime)
    }

    pub fn with_start(mut self, start: RawEventTime) -> Self {
        self.start = Some(start);
        self
    }

    pub fn with_end(mut self, end: RawEventTime) -> Self {
        self.end = Some(end);
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_html_link(mut self, html_link: impl Into<String>) -> Self {
        self.html_link = Some(html_link.into());
        self
    }

    pub fn with_attendee(mut self, attendee: RawAttendee) -> Self {
        self.attendees.push(attendee);
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }
}
