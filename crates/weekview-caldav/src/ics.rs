//! ICS/iCalendar parsing and generation.
//!
//! Parsing converts RFC 5545 payloads into [`RawEvent`] records without
//! interpreting them; all date/time interpretation happens later in the
//! normalization step. Generation builds the minimal VEVENT used by the
//! event creation path.

use chrono::{DateTime, Utc};
use icalendar::{
    Calendar, CalendarComponent, CalendarDateTime, Component, DatePerhapsTime, Event as IcsEvent,
    EventLike, Property,
};
use tracing::warn;
use weekview_core::RawDateTime;

use crate::raw_event::{EventDraft, RawEvent, RawPerson};

/// Parses ICS content into raw events.
///
/// Recurring events are expected to arrive already expanded by the server
/// (time-range REPORT). A payload that fails to parse yields an empty list
/// and a warning; it never fails the fetch.
pub fn parse_ics(ics: &str, calendar_id: &str) -> Vec<RawEvent> {
    let calendar = match ics.parse::<Calendar>() {
        Ok(cal) => cal,
        Err(e) => {
            warn!(calendar = %calendar_id, error = %e, "failed to parse ICS payload");
            return Vec::new();
        }
    };

    calendar
        .iter()
        .filter_map(|component| match component {
            CalendarComponent::Event(event) => Some(parse_vevent(event)),
            _ => None,
        })
        .collect()
}

/// Converts a single VEVENT into a raw event.
///
/// Every field is best-effort; a VEVENT missing all of them still produces
/// a (useless) record, which the normalizer will drop for lack of a start.
fn parse_vevent(event: &IcsEvent) -> RawEvent {
    let mut raw = RawEvent::new();

    raw.uid = event.get_uid().map(str::to_string);
    raw.summary = event.get_summary().map(str::to_string);
    raw.description = event.get_description().map(str::to_string);
    raw.location = event.get_location().map(str::to_string);

    raw.start = event.get_start().map(convert_date_time);
    raw.end = event.get_end().map(convert_date_time);

    raw.rrule = event.property_value("RRULE").map(str::to_string);

    if let Some(props) = event.multi_properties().get("ATTENDEE") {
        raw.attendees = props.iter().map(parse_person).collect();
    }
    raw.organizer = event.properties().get("ORGANIZER").map(parse_person);

    raw
}

/// Converts the icalendar crate's date-or-datetime into [`RawDateTime`],
/// preserving the upstream representation.
fn convert_date_time(dt: DatePerhapsTime) -> RawDateTime {
    match dt {
        DatePerhapsTime::Date(date) => RawDateTime::Date(date),
        DatePerhapsTime::DateTime(cdt) => match cdt {
            CalendarDateTime::Utc(dt) => RawDateTime::Utc(dt),
            CalendarDateTime::Floating(naive) => RawDateTime::Floating(naive),
            CalendarDateTime::WithTimezone { date_time, tzid } => RawDateTime::Zoned {
                datetime: date_time,
                tzid,
            },
        },
    }
}

/// Extracts an attendee/organizer with its optional `CN` parameter.
fn parse_person(property: &Property) -> RawPerson {
    let mut person = RawPerson::new(property.value());
    if let Some(cn) = property.params().get("CN") {
        person = person.with_common_name(cn.value());
    }
    person
}

/// Builds the ICS payload for a new event.
///
/// The caller supplies the freshly generated UID and the creation
/// timestamp (DTSTAMP).
pub fn draft_to_ics(draft: &EventDraft, uid: &str, created_at: DateTime<Utc>) -> String {
    let mut event = IcsEvent::new();
    event.uid(uid);
    event.summary(&draft.summary);

    let dtstamp = format_utc(created_at);
    let dtstart = format_utc(draft.start);
    let dtend = format_utc(draft.end);
    event.add_property("DTSTAMP", dtstamp.as_str());
    event.add_property("DTSTART", dtstart.as_str());
    event.add_property("DTEND", dtend.as_str());

    if let Some(ref description) = draft.description {
        event.description(description);
    }
    if let Some(ref location) = draft.location {
        event.location(location);
    }

    let mut calendar = Calendar::new();
    calendar.push(event.done());
    calendar.done().to_string()
}

fn format_utc(dt: DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}
