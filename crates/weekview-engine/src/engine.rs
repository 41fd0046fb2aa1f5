//! The synchronization engine.
//!
//! One [`SyncEngine`] owns the session to one remote calendar store and
//! turns refresh cycles into immutable [`Snapshot`]s:
//!
//! - setup with bounded retries, short-circuiting on authentication
//!   failures
//! - per-calendar fetch with per-calendar failure attribution
//! - "serve last known good" when a whole cycle fails
//! - a write path that creates an event and re-syncs
//!
//! Refresh cycles are serialized per engine; overlapping callers coalesce
//! into the in-flight cycle's result instead of launching a second
//! round-trip.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use weekview_caldav::{CalDavResult, CalendarConnection, EventDraft, parse_event};
use weekview_core::{CalendarRef, Snapshot, SyncWindow};

use crate::config::{SETUP_ATTEMPTS, SETUP_RETRY_DELAY};
use crate::error::EngineError;

/// Lifecycle state of a [`SyncEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No connection has been established yet.
    Uninitialized,
    /// Setup is in progress.
    Connecting,
    /// Connected; refresh cycles run against the discovered calendars.
    Ready,
    /// The server rejected the credentials. Terminal: every further call
    /// fails fast without network I/O.
    FailedAuth,
}

/// The synchronization engine for one configured account.
pub struct SyncEngine {
    connection: Arc<dyn CalendarConnection>,
    days_to_sync: u32,
    state: RwLock<EngineState>,
    calendars: RwLock<Vec<CalendarRef>>,
    snapshot: RwLock<Option<Arc<Snapshot>>>,
    /// Serializes refresh cycles.
    refresh_gate: Mutex<()>,
    /// Bumped after every completed cycle; lets coalesced callers detect
    /// that the cycle they waited on has published.
    generation: AtomicU64,
}

impl SyncEngine {
    /// Creates an engine over the given connection.
    ///
    /// `days_to_sync` is the sync horizon in days from today's local
    /// midnight.
    pub fn new(connection: Arc<dyn CalendarConnection>, days_to_sync: u32) -> Self {
        Self {
            connection,
            days_to_sync,
            state: RwLock::new(EngineState::Uninitialized),
            calendars: RwLock::new(Vec::new()),
            snapshot: RwLock::new(None),
            refresh_gate: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// Returns the current lifecycle state.
    pub async fn state(&self) -> EngineState {
        *self.state.read().await
    }

    /// Returns the current snapshot, or an empty one if no cycle has
    /// completed yet.
    pub async fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot
            .read()
            .await
            .clone()
            .unwrap_or_else(|| Arc::new(Snapshot::empty(Utc::now())))
    }

    /// Establishes the connection and discovers calendars, retrying up to
    /// [`SETUP_ATTEMPTS`] times with [`SETUP_RETRY_DELAY`] between
    /// attempts.
    ///
    /// An authentication failure short-circuits the retry loop, moves the
    /// engine to [`EngineState::FailedAuth`] and is fatal. Exhausting the
    /// retry budget on other errors is recoverable: the engine returns to
    /// `Uninitialized` and a later call may succeed.
    pub async fn async_setup(&self) -> Result<(), EngineError> {
        if self.state().await == EngineState::FailedAuth {
            return Err(EngineError::AuthenticationRequired);
        }

        self.set_state(EngineState::Connecting).await;

        let mut last_error = None;
        for attempt in 1..=SETUP_ATTEMPTS {
            match self.try_setup().await {
                Ok(calendars) => {
                    info!(attempt, count = calendars.len(), "calendar connection established");
                    *self.calendars.write().await = calendars;
                    self.set_state(EngineState::Ready).await;
                    return Ok(());
                }
                Err(e) if e.is_authentication() => {
                    error!(error = %e, "authentication failed, not retrying");
                    self.set_state(EngineState::FailedAuth).await;
                    return Err(EngineError::AuthenticationRequired);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "connection setup failed");
                    last_error = Some(e);
                    if attempt < SETUP_ATTEMPTS {
                        debug!(
                            delay_secs = SETUP_RETRY_DELAY.as_secs(),
                            "waiting before next setup attempt"
                        );
                        tokio::time::sleep(SETUP_RETRY_DELAY).await;
                    }
                }
            }
        }

        self.set_state(EngineState::Uninitialized).await;
        Err(EngineError::SetupFailed {
            attempts: SETUP_ATTEMPTS,
            source: last_error.expect("retry loop ran at least once"),
        })
    }

    async fn try_setup(&self) -> CalDavResult<Vec<CalendarRef>> {
        self.connection.connect().await?;
        self.connection.discover_calendars().await
    }

    /// Runs one synchronization cycle and returns the resulting snapshot.
    ///
    /// Whole-cycle failures are absorbed: the previous snapshot (or an
    /// empty one) is returned instead of an error. The only error this
    /// method surfaces is [`EngineError::AuthenticationRequired`].
    pub async fn refresh(&self) -> Result<Arc<Snapshot>, EngineError> {
        if self.state().await == EngineState::FailedAuth {
            return Err(EngineError::AuthenticationRequired);
        }

        let generation_before = self.generation.load(Ordering::Acquire);
        let _gate = match self.refresh_gate.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                // A cycle is in flight; wait for it and reuse its result.
                let guard = self.refresh_gate.lock().await;
                if self.state().await == EngineState::FailedAuth {
                    return Err(EngineError::AuthenticationRequired);
                }
                if self.generation.load(Ordering::Acquire) != generation_before {
                    debug!("coalesced into concurrent refresh cycle");
                    return Ok(self.snapshot().await);
                }
                guard
            }
        };

        let result = self.run_cycle().await;
        self.generation.fetch_add(1, Ordering::AcqRel);
        result
    }

    async fn run_cycle(&self) -> Result<Arc<Snapshot>, EngineError> {
        if self.state().await != EngineState::Ready {
            match self.async_setup().await {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(error = %e, "setup failed, serving last known data");
                    return Ok(self.snapshot().await);
                }
            }
        }

        let window =
            SyncWindow::days_from_local_midnight(Utc::now(), &chrono::Local, self.days_to_sync);
        let calendars = self.calendars.read().await.clone();

        let mut events = Vec::new();
        let mut failed_calendar_ids = BTreeSet::new();
        let mut calendar_map = BTreeMap::new();

        for calendar in &calendars {
            calendar_map.insert(calendar.id.clone(), calendar.clone());

            match self
                .connection
                .search_events(calendar.id.clone(), window)
                .await
            {
                Ok(raw_events) => {
                    for raw in raw_events {
                        match parse_event(&raw, &calendar.id, &calendar.name) {
                            Some(event) => events.push(event),
                            None => {
                                warn!(
                                    calendar = %calendar.name,
                                    "dropping event without a start time"
                                );
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        calendar = %calendar.name,
                        id = %calendar.id,
                        error = %e,
                        "calendar fetch failed"
                    );
                    failed_calendar_ids.insert(calendar.id.clone());
                }
            }
        }

        // No calendar reachable at all is a failed cycle, not a degraded
        // one: keep serving the last known good snapshot.
        if !calendars.is_empty() && failed_calendar_ids.len() == calendars.len() {
            warn!("every calendar fetch failed, serving last known data");
            return Ok(self.snapshot().await);
        }

        let snapshot = Arc::new(Snapshot::new(
            events,
            calendar_map,
            failed_calendar_ids,
            Utc::now(),
        ));

        info!(
            events = snapshot.events.len(),
            calendars = snapshot.calendars.len(),
            failed = snapshot.failed_calendar_ids.len(),
            "sync cycle complete"
        );

        *self.snapshot.write().await = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Creates a new event in the given calendar.
    ///
    /// Returns `false` (and logs) when the calendar is unknown or the
    /// upload fails. On success an immediate refresh is triggered so the
    /// event shows up in the next served snapshot; a refresh failure after
    /// a successful write still reports success, because the write itself
    /// succeeded.
    pub async fn create_event(
        &self,
        calendar_id: &str,
        title: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        description: Option<String>,
        location: Option<String>,
    ) -> bool {
        if self.state().await == EngineState::FailedAuth {
            warn!("cannot create event: authentication required");
            return false;
        }

        let known = self
            .calendars
            .read()
            .await
            .iter()
            .any(|calendar| calendar.id == calendar_id);
        if !known {
            warn!(calendar = %calendar_id, "cannot create event in unknown calendar");
            return false;
        }

        let mut draft = EventDraft::new(title, start, end);
        draft.description = description.filter(|s| !s.is_empty());
        draft.location = location.filter(|s| !s.is_empty());

        if let Err(e) = self
            .connection
            .submit_event(calendar_id.to_string(), draft)
            .await
        {
            warn!(calendar = %calendar_id, error = %e, "event creation failed");
            return false;
        }

        // Write-then-reread, not transactional: the event exists upstream
        // even if this refresh fails.
        if let Err(e) = self.refresh().await {
            warn!(error = %e, "refresh after event creation failed");
        }

        true
    }

    async fn set_state(&self, state: EngineState) {
        *self.state.write().await = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use chrono::TimeZone;
    use weekview_caldav::{BoxFuture, CalDavError, RawEvent};
    use weekview_core::RawDateTime;

    fn utc(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, d, h, 0, 0).unwrap()
    }

    fn raw_event(uid: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> RawEvent {
        RawEvent::new()
            .with_uid(uid)
            .with_summary(uid.to_uppercase())
            .with_start(RawDateTime::Utc(start))
            .with_end(RawDateTime::Utc(end))
    }

    /// Scripted connection for engine tests.
    #[derive(Default)]
    struct MockConnection {
        connect_attempts: AtomicUsize,
        search_calls: AtomicUsize,
        /// Reject every connect with an auth error.
        auth_rejected: bool,
        /// Number of connects to fail with a network error before
        /// succeeding.
        connect_failures: AtomicUsize,
        /// Virtual time each search takes (for coalescing tests).
        search_delay: Option<Duration>,
        calendars: Vec<CalendarRef>,
        events: StdMutex<HashMap<String, Vec<RawEvent>>>,
        failing_calendars: StdMutex<BTreeSet<String>>,
        reject_submit: bool,
    }

    impl MockConnection {
        fn with_calendars(names: &[(&str, &str)]) -> Self {
            Self {
                calendars: names
                    .iter()
                    .map(|(id, name)| CalendarRef::new(*id, *name))
                    .collect(),
                ..Default::default()
            }
        }

        fn add_events(&self, calendar_id: &str, events: Vec<RawEvent>) {
            self.events
                .lock()
                .unwrap()
                .entry(calendar_id.to_string())
                .or_default()
                .extend(events);
        }

        fn fail_calendar(&self, calendar_id: &str) {
            self.failing_calendars
                .lock()
                .unwrap()
                .insert(calendar_id.to_string());
        }

        fn fail_all_calendars(&self) {
            for calendar in &self.calendars {
                self.fail_calendar(&calendar.id);
            }
        }
    }

    impl CalendarConnection for MockConnection {
        fn connect(&self) -> BoxFuture<'_, CalDavResult<()>> {
            self.connect_attempts.fetch_add(1, Ordering::SeqCst);
            let auth_rejected = self.auth_rejected;
            let network_failures_left = self
                .connect_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();

            Box::pin(async move {
                if auth_rejected {
                    Err(CalDavError::authentication("401 unauthorized"))
                } else if network_failures_left {
                    Err(CalDavError::network("connection refused"))
                } else {
                    Ok(())
                }
            })
        }

        fn discover_calendars(&self) -> BoxFuture<'_, CalDavResult<Vec<CalendarRef>>> {
            let calendars = self.calendars.clone();
            Box::pin(async move { Ok(calendars) })
        }

        fn search_events(
            &self,
            calendar_id: String,
            _window: SyncWindow,
        ) -> BoxFuture<'_, CalDavResult<Vec<RawEvent>>> {
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            let failing = self.failing_calendars.lock().unwrap().contains(&calendar_id);
            let events = self
                .events
                .lock()
                .unwrap()
                .get(&calendar_id)
                .cloned()
                .unwrap_or_default();
            let delay = self.search_delay;

            Box::pin(async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                if failing {
                    Err(CalDavError::server("calendar backend unavailable"))
                } else {
                    Ok(events)
                }
            })
        }

        fn submit_event(
            &self,
            calendar_id: String,
            draft: EventDraft,
        ) -> BoxFuture<'_, CalDavResult<()>> {
            if self.reject_submit {
                return Box::pin(async { Err(CalDavError::server("PUT rejected")) });
            }

            // Accepting the write makes it visible to the next search.
            let mut raw = RawEvent::new()
                .with_uid("created-by-test")
                .with_summary(draft.summary.clone())
                .with_start(RawDateTime::Utc(draft.start))
                .with_end(RawDateTime::Utc(draft.end));
            raw.description = draft.description.clone();
            raw.location = draft.location.clone();
            self.add_events(&calendar_id, vec![raw]);

            Box::pin(async { Ok(()) })
        }
    }

    fn engine_over(connection: Arc<MockConnection>) -> SyncEngine {
        SyncEngine::new(connection, 7)
    }

    #[tokio::test]
    async fn refresh_assembles_sorted_snapshot_across_calendars() {
        let mock = Arc::new(MockConnection::with_calendars(&[
            ("cal-a", "Work"),
            ("cal-b", "Home"),
        ]));
        mock.add_events("cal-a", vec![raw_event("late", utc(1, 13), utc(1, 14))]);
        mock.add_events(
            "cal-b",
            vec![
                raw_event("early", utc(1, 11), utc(1, 12)),
                raw_event("mid", utc(1, 12), utc(1, 13)),
            ],
        );

        let engine = engine_over(mock);
        let snapshot = engine.refresh().await.unwrap();

        let uids: Vec<_> = snapshot.events.iter().map(|e| e.uid.as_str()).collect();
        assert_eq!(uids, ["early", "mid", "late"]);
        assert_eq!(snapshot.calendars.len(), 2);
        assert!(snapshot.failed_calendar_ids.is_empty());
        assert_eq!(engine.state().await, EngineState::Ready);
    }

    #[tokio::test]
    async fn partial_failure_keeps_other_calendars() {
        let mock = Arc::new(MockConnection::with_calendars(&[
            ("cal-a", "A"),
            ("cal-b", "B"),
            ("cal-c", "C"),
        ]));
        mock.add_events("cal-a", vec![raw_event("a1", utc(1, 9), utc(1, 10))]);
        mock.add_events("cal-c", vec![raw_event("c1", utc(1, 11), utc(1, 12))]);
        mock.fail_calendar("cal-b");

        let engine = engine_over(mock);
        let snapshot = engine.refresh().await.unwrap();

        let uids: Vec<_> = snapshot.events.iter().map(|e| e.uid.as_str()).collect();
        assert_eq!(uids, ["a1", "c1"]);
        assert_eq!(
            snapshot.failed_calendar_ids,
            BTreeSet::from(["cal-b".to_string()])
        );
    }

    #[tokio::test]
    async fn stale_serve_when_every_calendar_fails() {
        let mock = Arc::new(MockConnection::with_calendars(&[
            ("cal-a", "A"),
            ("cal-b", "B"),
        ]));
        mock.add_events("cal-a", vec![raw_event("a1", utc(1, 9), utc(1, 10))]);

        let engine = engine_over(mock.clone());
        let first = engine.refresh().await.unwrap();
        assert_eq!(first.events.len(), 1);

        mock.fail_all_calendars();
        let second = engine.refresh().await.unwrap();

        // The previous snapshot is returned unchanged.
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn empty_snapshot_when_cycle_fails_with_no_history() {
        let mock = Arc::new(MockConnection::with_calendars(&[("cal-a", "A")]));
        mock.fail_all_calendars();

        let engine = engine_over(mock);
        let snapshot = engine.refresh().await.unwrap();

        assert!(snapshot.events.is_empty());
        assert!(snapshot.calendars.is_empty());
    }

    #[tokio::test]
    async fn refresh_is_idempotent_without_upstream_changes() {
        let mock = Arc::new(MockConnection::with_calendars(&[("cal-a", "A")]));
        mock.add_events("cal-a", vec![raw_event("a1", utc(1, 9), utc(1, 10))]);

        let engine = engine_over(mock);
        let first = engine.refresh().await.unwrap();
        let second = engine.refresh().await.unwrap();

        assert!(first.same_events(&second));
    }

    #[tokio::test]
    async fn auth_failure_short_circuits_setup() {
        let mock = Arc::new(MockConnection {
            auth_rejected: true,
            ..MockConnection::with_calendars(&[("cal-a", "A")])
        });

        let engine = engine_over(mock.clone());
        let err = engine.async_setup().await.unwrap_err();

        assert!(matches!(err, EngineError::AuthenticationRequired));
        assert_eq!(engine.state().await, EngineState::FailedAuth);
        // Exactly one attempt, not three.
        assert_eq!(mock.connect_attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_auth_is_terminal_and_network_free() {
        let mock = Arc::new(MockConnection {
            auth_rejected: true,
            ..MockConnection::with_calendars(&[("cal-a", "A")])
        });

        let engine = engine_over(mock.clone());
        let _ = engine.async_setup().await;

        let err = engine.refresh().await.unwrap_err();
        assert!(matches!(err, EngineError::AuthenticationRequired));

        let created = engine
            .create_event("cal-a", "t", utc(1, 9), utc(1, 10), None, None)
            .await;
        assert!(!created);

        // No further connection attempts were made after the first.
        assert_eq!(mock.connect_attempts.load(Ordering::SeqCst), 1);
        assert_eq!(mock.search_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn setup_exhausts_retry_budget_on_network_errors() {
        let mock = Arc::new(MockConnection {
            connect_failures: AtomicUsize::new(usize::MAX),
            ..MockConnection::with_calendars(&[("cal-a", "A")])
        });

        let engine = engine_over(mock.clone());
        let err = engine.async_setup().await.unwrap_err();

        assert!(matches!(err, EngineError::SetupFailed { attempts: 3, .. }));
        assert!(!err.is_fatal());
        assert_eq!(mock.connect_attempts.load(Ordering::SeqCst), 3);
        // Recoverable: the engine can be invoked again later.
        assert_eq!(engine.state().await, EngineState::Uninitialized);
    }

    #[tokio::test(start_paused = true)]
    async fn setup_recovers_on_a_later_attempt() {
        let mock = Arc::new(MockConnection {
            connect_failures: AtomicUsize::new(1),
            ..MockConnection::with_calendars(&[("cal-a", "A")])
        });

        let engine = engine_over(mock.clone());
        engine.async_setup().await.unwrap();

        assert_eq!(mock.connect_attempts.load(Ordering::SeqCst), 2);
        assert_eq!(engine.state().await, EngineState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn setup_failure_inside_refresh_serves_stale_data() {
        let mock = Arc::new(MockConnection::with_calendars(&[("cal-a", "A")]));
        mock.add_events("cal-a", vec![raw_event("a1", utc(1, 9), utc(1, 10))]);

        let engine = engine_over(mock.clone());
        let first = engine.refresh().await.unwrap();

        // Knock the engine back to Uninitialized and make setup fail.
        engine.set_state(EngineState::Uninitialized).await;
        mock.connect_failures.store(usize::MAX, Ordering::SeqCst);

        let second = engine.refresh().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn create_event_rejects_unknown_calendar() {
        let mock = Arc::new(MockConnection::with_calendars(&[("cal-a", "A")]));
        let engine = engine_over(mock);
        engine.refresh().await.unwrap();

        let created = engine
            .create_event("cal-nope", "Dentist", utc(3, 9), utc(3, 10), None, None)
            .await;
        assert!(!created);
    }

    #[tokio::test]
    async fn create_event_round_trips_into_next_snapshot() {
        let mock = Arc::new(MockConnection::with_calendars(&[("cal-a", "A")]));
        let engine = engine_over(mock);
        engine.refresh().await.unwrap();

        let created = engine
            .create_event(
                "cal-a",
                "Dentist",
                utc(3, 9),
                utc(3, 10),
                Some("Checkup".to_string()),
                None,
            )
            .await;
        assert!(created);

        let snapshot = engine.snapshot().await;
        assert_eq!(snapshot.events.len(), 1);
        let event = &snapshot.events[0];
        assert_eq!(event.summary, "Dentist");
        assert_eq!(event.start, utc(3, 9));
        assert_eq!(event.end, utc(3, 10));
        assert_eq!(event.description, "Checkup");
        assert_eq!(event.calendar_id, "cal-a");
    }

    #[tokio::test]
    async fn create_event_reports_submit_failures() {
        let mock = Arc::new(MockConnection {
            reject_submit: true,
            ..MockConnection::with_calendars(&[("cal-a", "A")])
        });
        let engine = engine_over(mock);
        engine.refresh().await.unwrap();

        let created = engine
            .create_event("cal-a", "Dentist", utc(3, 9), utc(3, 10), None, None)
            .await;
        assert!(!created);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_refreshes_coalesce_into_one_cycle() {
        let mock = Arc::new(MockConnection {
            search_delay: Some(Duration::from_secs(2)),
            ..MockConnection::with_calendars(&[("cal-a", "A")])
        });
        mock.add_events("cal-a", vec![raw_event("a1", utc(1, 9), utc(1, 10))]);

        let engine = Arc::new(engine_over(mock.clone()));

        let first = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.refresh().await })
        };
        // Let the first refresh take the gate and park in the slow search.
        tokio::task::yield_now().await;

        let second = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.refresh().await })
        };

        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();

        assert!(first.same_events(&second));
        // One network cycle, not two.
        assert_eq!(mock.search_calls.load(Ordering::SeqCst), 1);
    }
}
