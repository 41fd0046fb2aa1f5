//! Raw event data as parsed from ICS, before normalization.
//!
//! [`RawEvent`] preserves the upstream record's shape: every field is
//! optional, times keep their original representation ([`RawDateTime`]),
//! and people keep both their raw token and the optional `CN` display
//! name. [`crate::normalize::parse_event`] collapses this into the fixed
//! [`weekview_core::Event`] schema so nothing downstream ever branches on
//! upstream shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use weekview_core::RawDateTime;

/// An attendee or organizer as carried in an ICS property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPerson {
    /// The raw property value, typically `mailto:user@example.com`.
    pub value: String,
    /// The `CN` (common name) parameter, if present.
    pub common_name: Option<String>,
}

impl RawPerson {
    /// Creates a person from a raw value.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            common_name: None,
        }
    }

    /// Builder method to set the common name.
    pub fn with_common_name(mut self, name: impl Into<String>) -> Self {
        self.common_name = Some(name.into());
        self
    }

    /// The name to display: the `CN` parameter when present, otherwise the
    /// raw value with any `mailto:` prefix stripped.
    pub fn display_name(&self) -> String {
        match &self.common_name {
            Some(name) => name.clone(),
            None => self
                .value
                .strip_prefix("mailto:")
                .unwrap_or(&self.value)
                .to_string(),
        }
    }
}

/// A calendar event as it came off the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RawEvent {
    /// The UID property, if present.
    pub uid: Option<String>,
    /// The SUMMARY property.
    pub summary: Option<String>,
    /// The DESCRIPTION property.
    pub description: Option<String>,
    /// The LOCATION property.
    pub location: Option<String>,
    /// The DTSTART value. An event without one cannot be placed on the
    /// sync grid and is skipped by the parser.
    pub start: Option<RawDateTime>,
    /// The DTEND value.
    pub end: Option<RawDateTime>,
    /// ATTENDEE properties, in document order.
    pub attendees: Vec<RawPerson>,
    /// The ORGANIZER property.
    pub organizer: Option<RawPerson>,
    /// The raw RRULE text.
    pub rrule: Option<String>,
}

impl RawEvent {
    /// Creates an empty raw event.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the UID.
    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    /// Builder method to set the summary.
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Builder method to set the start time.
    pub fn with_start(mut self, start: RawDateTime) -> Self {
        self.start = Some(start);
        self
    }

    /// Builder method to set the end time.
    pub fn with_end(mut self, end: RawDateTime) -> Self {
        self.end = Some(end);
        self
    }

    /// Builder method to add an attendee.
    pub fn with_attendee(mut self, attendee: RawPerson) -> Self {
        self.attendees.push(attendee);
        self
    }
}

/// A new event to be written to a calendar.
///
/// The backend fills in the generated UID and DTSTAMP at submission time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDraft {
    /// Event title.
    pub summary: String,
    /// Start instant.
    pub start: DateTime<Utc>,
    /// End instant.
    pub end: DateTime<Utc>,
    /// Optional description.
    pub description: Option<String>,
    /// Optional location.
    pub location: Option<String>,
}

impl EventDraft {
    /// Creates a draft with the required fields.
    pub fn new(summary: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            summary: summary.into(),
            start,
            end,
            description: None,
            location: None,
        }
    }

    /// Builder method to set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Builder method to set the location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}
