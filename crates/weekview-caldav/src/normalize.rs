//! RawEvent to Event conversion.
//!
//! This is the boundary where loosely shaped upstream data becomes the
//! fixed schema the rest of the system works with. Single-vs-list
//! attendee shapes, string-vs-typed dates and missing fields are all
//! resolved here; nothing downstream branches on upstream shapes.

use chrono::TimeZone;
use weekview_core::Event;

use crate::raw_event::{RawEvent, RawPerson};

/// Converts a raw event into the normalized schema, interpreting
/// timezone-less values in the system's local timezone.
///
/// Returns `None` when the record has no start time; such an event cannot
/// be placed on the sync grid and is skipped, not treated as an error.
pub fn parse_event(raw: &RawEvent, calendar_id: &str, calendar_name: &str) -> Option<Event> {
    parse_event_in(raw, calendar_id, calendar_name, &chrono::Local)
}

/// Like [`parse_event`], but with an explicit timezone for timezone-less
/// values.
pub fn parse_event_in<Tz: TimeZone>(
    raw: &RawEvent,
    calendar_id: &str,
    calendar_name: &str,
    tz: &Tz,
) -> Option<Event> {
    let raw_start = raw.start.as_ref()?;

    let start = raw_start.normalize_in(tz);
    let end = raw
        .end
        .as_ref()
        .map(|raw_end| raw_end.normalize_in(tz))
        .unwrap_or(start)
        // A server handing back an end before the start would otherwise
        // break the start <= end invariant.
        .max(start);

    // All-day classification is type-based: a bare date, never a midnight
    // clock value.
    let all_day = raw_start.is_date();

    let mut event = Event::new(
        raw.uid.clone().unwrap_or_default(),
        raw.summary.clone().unwrap_or_default(),
        start,
        end,
        calendar_id,
        calendar_name,
    )
    .with_all_day(all_day)
    .with_attendees(raw.attendees.iter().map(RawPerson::display_name).collect());

    event.description = raw.description.clone().unwrap_or_default();
    event.location = raw.location.clone().unwrap_or_default();
    event.organizer = raw
        .organizer
        .as_ref()
        .map(RawPerson::display_name)
        .unwrap_or_default();
    event.recurrence_rule = raw.rrule.clone().unwrap_or_default();

    Some(event)
}
