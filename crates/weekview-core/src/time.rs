//! Raw date/time normalization.
//!
//! Calendar servers hand back event times in wildly different shapes: UTC
//! instants, datetimes pinned to a named timezone, floating wall-clock
//! times, bare dates for all-day events, and occasionally plain strings.
//! [`RawDateTime`] models that input domain and [`RawDateTime::normalize_in`]
//! collapses it into a single timezone-aware UTC instant.
//!
//! Normalization is total: every input maps to *some* instant. Inputs that
//! cannot be interpreted produce "now" and a warning rather than an error,
//! so one malformed timestamp never takes down a sync cycle.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A date/time value as it arrived from the calendar server, before
/// normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum RawDateTime {
    /// An instant already expressed in UTC.
    Utc(DateTime<Utc>),
    /// A wall-clock time pinned to a named timezone (iCalendar `TZID`).
    Zoned {
        datetime: NaiveDateTime,
        tzid: String,
    },
    /// A floating wall-clock time with no timezone attached.
    Floating(NaiveDateTime),
    /// A bare date with no time-of-day component (all-day events).
    Date(NaiveDate),
    /// An unstructured textual value.
    Text(String),
}

impl RawDateTime {
    /// Returns `true` if this value is a bare date.
    ///
    /// This is the *only* signal for all-day classification: a timed event
    /// that happens to start at midnight is not all-day.
    pub fn is_date(&self) -> bool {
        matches!(self, Self::Date(_))
    }

    /// Normalizes this value into a UTC instant, interpreting timezone-less
    /// values in the system's local timezone.
    pub fn normalize(&self) -> DateTime<Utc> {
        self.normalize_in(&chrono::Local)
    }

    /// Normalizes this value into a UTC instant, interpreting timezone-less
    /// values in the given timezone.
    ///
    /// Rules, in priority order:
    /// 1. Timezone-aware values pass through unchanged (a resolvable `TZID`
    ///    counts as timezone-aware).
    /// 2. Naive wall-clock times are reinterpreted in `tz`.
    /// 3. Bare dates become midnight in `tz` on that date.
    /// 4. Text is parsed as RFC 3339, then as a naive datetime, then its
    ///    date portion alone; if everything fails, "now" is substituted.
    pub fn normalize_in<Tz: TimeZone>(&self, tz: &Tz) -> DateTime<Utc> {
        match self {
            Self::Utc(dt) => *dt,
            Self::Zoned { datetime, tzid } => match tzid.parse::<chrono_tz::Tz>() {
                Ok(zone) => resolve_local(datetime, &zone),
                Err(_) => {
                    warn!(tzid = %tzid, "unrecognized TZID, interpreting as local time");
                    resolve_local(datetime, tz)
                }
            },
            Self::Floating(naive) => resolve_local(naive, tz),
            Self::Date(date) => local_midnight(*date, tz),
            Self::Text(text) => normalize_text(text, tz),
        }
    }
}

/// Resolves a naive wall-clock time in `tz` to a UTC instant.
///
/// Ambiguous local times (clocks rolled back) take the earliest mapping;
/// times inside a DST gap fall back to reading the wall clock as UTC.
fn resolve_local<Tz: TimeZone>(naive: &NaiveDateTime, tz: &Tz) -> DateTime<Utc> {
    match tz.from_local_datetime(naive) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => Utc.from_utc_datetime(naive),
    }
}

/// Returns midnight in `tz` on the given date, as a UTC instant.
pub fn local_midnight<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> DateTime<Utc> {
    let midnight = date.and_hms_opt(0, 0, 0).expect("valid time");
    resolve_local(&midnight, tz)
}

fn normalize_text<Tz: TimeZone>(text: &str, tz: &Tz) -> DateTime<Utc> {
    let trimmed = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return dt.with_timezone(&Utc);
    }

    if let Ok(naive) = trimmed.parse::<NaiveDateTime>() {
        return resolve_local(&naive, tz);
    }

    // Salvage the date portion before a time separator.
    let date_part = trimmed
        .split(['T', ' '])
        .next()
        .unwrap_or(trimmed);
    if let Ok(date) = date_part.parse::<NaiveDate>() {
        return local_midnight(date, tz);
    }

    warn!(value = %text, "unparseable date/time value, substituting current time");
    Utc::now()
}

/// A half-open UTC interval `[start, end)` used to bound event searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncWindow {
    /// Start of the window (inclusive).
    pub start: DateTime<Utc>,
    /// End of the window (exclusive).
    pub end: DateTime<Utc>,
}

impl SyncWindow {
    /// Creates a new sync window.
    ///
    /// # Panics
    ///
    /// Panics if `start` is after `end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        assert!(start <= end, "SyncWindow start must be <= end");
        Self { start, end }
    }

    /// Creates the window `[today's local midnight, +days)` for the moment
    /// `now` observed in timezone `tz`.
    pub fn days_from_local_midnight<Tz: TimeZone>(
        now: DateTime<Utc>,
        tz: &Tz,
        days: u32,
    ) -> Self {
        let today = now.with_timezone(tz).date_naive();
        let start = local_midnight(today, tz);
        Self {
            start,
            end: start + Duration::days(i64::from(days)),
        }
    }

    /// Checks whether an instant falls within this window.
    pub fn contains(&self, dt: DateTime<Utc>) -> bool {
        self.start <= dt && dt < self.end
    }

    /// Returns the length of this window.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}
