//! Core types: events, snapshots, time normalization, view projections

pub mod event;
pub mod time;
pub mod tracing;
pub mod views;

pub use event::{CalendarRef, Event, Snapshot};
pub use time::{RawDateTime, SyncWindow, local_midnight};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
pub use views::{
    WeekSummary, current_or_next, daily_counts, events_for_calendar, events_on_date, week_summary,
};
