//! Read-only view projections over a [`Snapshot`].
//!
//! These are the derived views presentation layers build on: per-calendar
//! filtering, per-day bucket counts over a rolling window, and the
//! "currently ongoing or next upcoming" lookup. All of them are pure
//! functions over an immutable snapshot.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

use crate::event::{Event, Snapshot};

/// Events belonging to one calendar, in snapshot (start) order.
pub fn events_for_calendar<'a>(snapshot: &'a Snapshot, calendar_id: &str) -> Vec<&'a Event> {
    snapshot
        .events
        .iter()
        .filter(|event| event.calendar_id == calendar_id)
        .collect()
}

/// Events starting on the given date as observed in `tz`, in snapshot
/// order.
pub fn events_on_date<'a, Tz: TimeZone>(
    snapshot: &'a Snapshot,
    date: NaiveDate,
    tz: &Tz,
) -> Vec<&'a Event> {
    snapshot
        .events
        .iter()
        .filter(|event| event.starts_on(date, tz))
        .collect()
}

/// Per-day event counts for `days` consecutive days starting at `from`.
///
/// Every day in the range appears in the result, zero-count days included.
pub fn daily_counts<Tz: TimeZone>(
    snapshot: &Snapshot,
    from: NaiveDate,
    days: u32,
    tz: &Tz,
) -> Vec<(NaiveDate, usize)> {
    (0..days)
        .map(|offset| {
            let day = from + Duration::days(i64::from(offset));
            let count = snapshot
                .events
                .iter()
                .filter(|event| event.starts_on(day, tz))
                .count();
            (day, count)
        })
        .collect()
}

/// Aggregate counts for the common dashboard tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekSummary {
    /// Events starting today.
    pub today: usize,
    /// Events starting tomorrow.
    pub tomorrow: usize,
    /// Events starting within the 7-day window beginning today.
    pub week: usize,
}

/// Computes today/tomorrow/week counts for the moment `now` observed in
/// `tz`.
pub fn week_summary<Tz: TimeZone>(snapshot: &Snapshot, now: DateTime<Utc>, tz: &Tz) -> WeekSummary {
    let today = now.with_timezone(tz).date_naive();
    let counts = daily_counts(snapshot, today, 7, tz);

    WeekSummary {
        today: counts.first().map_or(0, |(_, n)| *n),
        tomorrow: counts.get(1).map_or(0, |(_, n)| *n),
        week: counts.iter().map(|(_, n)| n).sum(),
    }
}

/// The next upcoming event, falling back to a currently ongoing one.
///
/// Returns the first event with `start > now`; if none exists, the first
/// event with `start <= now <= end`. Relies on the snapshot's start-order
/// invariant.
pub fn current_or_next<'a>(snapshot: &'a Snapshot, now: DateTime<Utc>) -> Option<&'a Event> {
    snapshot
        .events
        .iter()
        .find(|event| event.start > now)
        .or_else(|| snapshot.events.iter().find(|event| event.is_ongoing_at(now)))
}
