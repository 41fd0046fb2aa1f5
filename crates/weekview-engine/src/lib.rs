//! Sync engine: connection lifecycle, refresh cycles, snapshot management.
//!
//! One [`SyncEngine`] owns the session to one configured account and
//! produces immutable [`weekview_core::Snapshot`]s. A [`Scheduler`] drives
//! it on a fixed poll interval. Multiple accounts run as independent
//! engine/scheduler pairs without shared state.

pub mod config;
pub mod engine;
pub mod error;
pub mod scheduler;

pub use config::{
    AccountConfig, DEFAULT_DAYS_TO_SYNC, MAX_DAYS_TO_SYNC, MIN_DAYS_TO_SYNC, POLL_INTERVAL,
    SETUP_ATTEMPTS, SETUP_RETRY_DELAY,
};
pub use engine::{EngineState, SyncEngine};
pub use error::EngineError;
pub use scheduler::{Scheduler, SchedulerCommand, SchedulerConfig, SchedulerHandle};
