//! CalDAV backend for weekview.
//!
//! This crate owns everything that talks to, or understands the data of, a
//! CalDAV server:
//!
//! - [`CalendarConnection`] - the seam the sync engine is written against
//! - [`CalDavConnection`] - the real implementation over HTTP
//! - [`RawEvent`] - an event as parsed from ICS, before normalization
//! - [`parse_event`] - RawEvent to [`weekview_core::Event`] conversion
//! - [`CalDavError`] - error taxonomy with auth/network classification
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │  CalDAV server   │
//! └────────┬─────────┘
//!          │ PROPFIND / REPORT / PUT   (client.rs, xml.rs, auth.rs)
//!          ▼
//! ┌──────────────────┐
//! │ CalDavConnection │  discover_calendars / search_events / submit_event
//! └────────┬─────────┘
//!          ▼
//!    ┌───────────┐      parse_event()     ┌───────┐
//!    │ RawEvent  │ ──────────────────────►│ Event │
//!    └───────────┘   (ics.rs, normalize)  └───────┘
//! ```

mod auth;
mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod ics;
pub mod normalize;
pub mod raw_event;
mod xml;

pub use config::CalDavConfig;
pub use connection::{
    BoxFuture, CalDavConnection, CalendarConnection, UNKNOWN_CALENDAR_NAME,
    UnconfiguredConnection,
};
pub use error::{CalDavError, CalDavErrorCode, CalDavResult};
pub use normalize::{parse_event, parse_event_in};
pub use raw_event::{EventDraft, RawEvent, RawPerson};
