//! Periodic refresh scheduling.
//!
//! The scheduler owns an engine and drives its refresh cycles on a fixed
//! poll interval. It is the host-side piece of the design: the engine
//! knows nothing about cadence, the scheduler knows nothing about CalDAV.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::POLL_INTERVAL;
use crate::engine::SyncEngine;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between automatic refresh cycles.
    pub poll_interval: Duration,
    /// Whether to refresh automatically. When false the scheduler only
    /// reacts to [`SchedulerCommand::RefreshNow`].
    pub auto_refresh: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
            auto_refresh: true,
        }
    }
}

impl SchedulerConfig {
    /// Builder: set the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Builder: enable or disable automatic refresh.
    pub fn with_auto_refresh(mut self, auto_refresh: bool) -> Self {
        self.auto_refresh = auto_refresh;
        self
    }
}

/// Commands accepted by a running scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerCommand {
    /// Trigger an out-of-band refresh cycle.
    RefreshNow,
    /// Stop the scheduler loop.
    Stop,
}

/// Drives periodic refreshes of one [`SyncEngine`].
pub struct Scheduler {
    engine: Arc<SyncEngine>,
    config: SchedulerConfig,
    command_tx: mpsc::Sender<SchedulerCommand>,
    command_rx: Option<mpsc::Receiver<SchedulerCommand>>,
}

impl Scheduler {
    /// Creates a scheduler over the given engine.
    pub fn new(engine: Arc<SyncEngine>, config: SchedulerConfig) -> Self {
        let (command_tx, command_rx) = mpsc::channel(16);
        Self {
            engine,
            config,
            command_tx,
            command_rx: Some(command_rx),
        }
    }

    /// Returns a handle for sending commands to the running scheduler.
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            command_tx: self.command_tx.clone(),
        }
    }

    /// Runs the scheduler loop until stopped or until the engine reports a
    /// fatal authentication failure.
    pub async fn run(mut self) {
        let mut command_rx = self.command_rx.take().expect("run called twice");

        info!(
            interval_secs = self.config.poll_interval.as_secs(),
            auto_refresh = self.config.auto_refresh,
            "scheduler started"
        );

        // Initial refresh so consumers have data before the first tick.
        if self.refresh_once().await {
            return;
        }

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval), if self.config.auto_refresh => {
                    if self.refresh_once().await {
                        return;
                    }
                }
                cmd = command_rx.recv() => match cmd {
                    Some(SchedulerCommand::RefreshNow) => {
                        debug!("received RefreshNow command");
                        if self.refresh_once().await {
                            return;
                        }
                    }
                    Some(SchedulerCommand::Stop) | None => {
                        info!("scheduler stopping");
                        return;
                    }
                },
            }
        }
    }

    /// Runs one refresh. Returns true when the loop must terminate.
    async fn refresh_once(&self) -> bool {
        match self.engine.refresh().await {
            Ok(snapshot) => {
                debug!(
                    events = snapshot.events.len(),
                    failed = snapshot.failed_calendar_ids.len(),
                    "scheduled refresh complete"
                );
                false
            }
            Err(e) if e.is_fatal() => {
                error!(error = %e, "stopping scheduler: account needs reconfiguration");
                true
            }
            Err(e) => {
                warn!(error = %e, "scheduled refresh failed");
                false
            }
        }
    }
}

/// Handle for sending commands to a running scheduler.
#[derive(Clone, Debug)]
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    /// Triggers an out-of-band refresh.
    pub async fn refresh_now(&self) -> Result<(), mpsc::error::SendError<SchedulerCommand>> {
        self.command_tx.send(SchedulerCommand::RefreshNow).await
    }

    /// Stops the scheduler.
    pub async fn stop(&self) -> Result<(), mpsc::error::SendError<SchedulerCommand>> {
        self.command_tx.send(SchedulerCommand::Stop).await
    }
}
