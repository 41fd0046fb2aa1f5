//! Event and snapshot types.
//!
//! [`Event`] is the uniform schema every upstream VEVENT is normalized
//! into; [`Snapshot`] is the immutable result of one synchronization
//! cycle. Consumers only ever see whole snapshots, never intermediate
//! state.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Identity of one remote calendar.
///
/// The set of known calendars is replaced wholesale on each discovery
/// pass; there is no incremental merge of calendar identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarRef {
    /// Unique identifier (the calendar's resolved collection URL).
    pub id: String,
    /// Human-readable display name.
    pub name: String,
}

impl CalendarRef {
    /// Creates a new calendar reference.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// A normalized calendar event.
///
/// All text fields default to the empty string when the upstream record
/// omits them; `uid` is *not* backfilled with a generated value, so
/// consumers must tolerate duplicate and empty UIDs. `start <= end` holds
/// for every event produced by the parsing pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Upstream UID, empty if the record had none. Only meaningful within
    /// one calendar.
    pub uid: String,
    /// Event title.
    pub summary: String,
    /// Event description.
    pub description: String,
    /// Event location.
    pub location: String,
    /// Normalized start instant.
    pub start: DateTime<Utc>,
    /// Normalized end instant; equals `start` when the upstream end was
    /// missing.
    pub end: DateTime<Utc>,
    /// Whether the upstream start was a bare date.
    pub all_day: bool,
    /// Owning calendar id.
    pub calendar_id: String,
    /// Owning calendar display name.
    pub calendar_name: String,
    /// Attendee display names, in upstream order.
    pub attendees: Vec<String>,
    /// Organizer display name, empty if absent.
    pub organizer: String,
    /// Raw recurrence rule text, empty if absent.
    pub recurrence_rule: String,
}

impl Event {
    /// Creates an event with the required fields; everything else defaults
    /// to empty.
    pub fn new(
        uid: impl Into<String>,
        summary: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        calendar_id: impl Into<String>,
        calendar_name: impl Into<String>,
    ) -> Self {
        Self {
            uid: uid.into(),
            summary: summary.into(),
            description: String::new(),
            location: String::new(),
            start,
            end,
            all_day: false,
            calendar_id: calendar_id.into(),
            calendar_name: calendar_name.into(),
            attendees: Vec::new(),
            organizer: String::new(),
            recurrence_rule: String::new(),
        }
    }

    /// Builder method to set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Builder method to set the location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Builder method to mark the event as all-day.
    pub fn with_all_day(mut self, all_day: bool) -> Self {
        self.all_day = all_day;
        self
    }

    /// Builder method to set the attendees.
    pub fn with_attendees(mut self, attendees: Vec<String>) -> Self {
        self.attendees = attendees;
        self
    }

    /// Builder method to set the organizer.
    pub fn with_organizer(mut self, organizer: impl Into<String>) -> Self {
        self.organizer = organizer.into();
        self
    }

    /// Builder method to set the recurrence rule text.
    pub fn with_recurrence_rule(mut self, rrule: impl Into<String>) -> Self {
        self.recurrence_rule = rrule.into();
        self
    }

    /// Returns `true` if the event is in progress at `now`.
    pub fn is_ongoing_at(&self, now: DateTime<Utc>) -> bool {
        self.start <= now && now <= self.end
    }

    /// Returns `true` if the event starts on the given date as observed in
    /// `tz`.
    pub fn starts_on<Tz: TimeZone>(&self, date: NaiveDate, tz: &Tz) -> bool {
        self.start.with_timezone(tz).date_naive() == date
    }
}

/// The immutable result of one synchronization cycle.
///
/// Produced by the sync engine at the end of each cycle and swapped in
/// wholesale; the previous snapshot is retained only as a fallback value
/// and never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// All events in the sync window, sorted ascending by `start`.
    /// Ties keep discovery order (stable sort).
    pub events: Vec<Event>,
    /// Known calendars by id.
    pub calendars: BTreeMap<String, CalendarRef>,
    /// Calendars whose fetch failed this cycle.
    pub failed_calendar_ids: BTreeSet<String>,
    /// When this snapshot was assembled.
    pub fetched_at: DateTime<Utc>,
}

impl Snapshot {
    /// Creates a snapshot, sorting events by start (stable).
    pub fn new(
        mut events: Vec<Event>,
        calendars: BTreeMap<String, CalendarRef>,
        failed_calendar_ids: BTreeSet<String>,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        events.sort_by_key(|event| event.start);
        Self {
            events,
            calendars,
            failed_calendar_ids,
            fetched_at,
        }
    }

    /// Creates an empty snapshot.
    pub fn empty(fetched_at: DateTime<Utc>) -> Self {
        Self {
            events: Vec::new(),
            calendars: BTreeMap::new(),
            failed_calendar_ids: BTreeSet::new(),
            fetched_at,
        }
    }

    /// Returns `true` if at least one calendar failed this cycle.
    pub fn is_degraded(&self) -> bool {
        !self.failed_calendar_ids.is_empty()
    }

    /// Returns `true` if the event lists are identical, ignoring
    /// `fetched_at` and failure bookkeeping.
    pub fn same_events(&self, other: &Snapshot) -> bool {
        self.events == other.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, h, min, 0).unwrap()
    }

    fn event(uid: &str, start: DateTime<Utc>) -> Event {
        Event::new(uid, uid.to_uppercase(), start, start, "cal-a", "Calendar A")
    }

    #[test]
    fn snapshot_sorts_events_by_start() {
        let events = vec![
            event("late", utc(15, 0)),
            event("early", utc(9, 0)),
            event("mid", utc(12, 0)),
        ];
        let snapshot = Snapshot::new(events, BTreeMap::new(), BTreeSet::new(), utc(16, 0));

        let uids: Vec<_> = snapshot.events.iter().map(|e| e.uid.as_str()).collect();
        assert_eq!(uids, ["early", "mid", "late"]);
    }

    #[test]
    fn snapshot_sort_is_stable_for_ties() {
        let events = vec![
            event("first", utc(9, 0)),
            event("second", utc(9, 0)),
            event("third", utc(9, 0)),
        ];
        let snapshot = Snapshot::new(events, BTreeMap::new(), BTreeSet::new(), utc(16, 0));

        let uids: Vec<_> = snapshot.events.iter().map(|e| e.uid.as_str()).collect();
        assert_eq!(uids, ["first", "second", "third"]);
    }

    #[test]
    fn empty_snapshot() {
        let snapshot = Snapshot::empty(utc(8, 0));
        assert!(snapshot.events.is_empty());
        assert!(snapshot.calendars.is_empty());
        assert!(!snapshot.is_degraded());
    }

    #[test]
    fn degraded_flag() {
        let mut failed = BTreeSet::new();
        failed.insert("cal-b".to_string());
        let snapshot = Snapshot::new(Vec::new(), BTreeMap::new(), failed, utc(8, 0));
        assert!(snapshot.is_degraded());
    }

    #[test]
    fn same_events_ignores_fetched_at() {
        let a = Snapshot::new(
            vec![event("e", utc(9, 0))],
            BTreeMap::new(),
            BTreeSet::new(),
            utc(10, 0),
        );
        let b = Snapshot::new(
            vec![event("e", utc(9, 0))],
            BTreeMap::new(),
            BTreeSet::new(),
            utc(11, 0),
        );
        assert!(a.same_events(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn ongoing_check() {
        let mut e = event("e", utc(9, 0));
        e.end = utc(10, 0);

        assert!(e.is_ongoing_at(utc(9, 30)));
        assert!(e.is_ongoing_at(utc(9, 0)));
        assert!(e.is_ongoing_at(utc(10, 0)));
        assert!(!e.is_ongoing_at(utc(10, 1)));
    }

    #[test]
    fn event_builder() {
        let e = event("e", utc(9, 0))
            .with_description("weekly sync")
            .with_location("room 4")
            .with_all_day(false)
            .with_attendees(vec!["Ana".to_string(), "Ben".to_string()])
            .with_organizer("Ana")
            .with_recurrence_rule("FREQ=WEEKLY");

        assert_eq!(e.description, "weekly sync");
        assert_eq!(e.attendees.len(), 2);
        assert_eq!(e.organizer, "Ana");
        assert_eq!(e.recurrence_rule, "FREQ=WEEKLY");
    }

    #[test]
    fn serde_roundtrip() {
        let snapshot = Snapshot::new(
            vec![event("e", utc(9, 0))],
            BTreeMap::from([("cal-a".to_string(), CalendarRef::new("cal-a", "Calendar A"))]),
            BTreeSet::new(),
            utc(10, 0),
        );
        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snapshot, parsed);
    }
}
