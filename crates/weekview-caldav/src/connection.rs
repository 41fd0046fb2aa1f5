//! The connection seam between the sync engine and a calendar server.
//!
//! [`CalendarConnection`] is the object-safe trait the engine is written
//! against; [`CalDavConnection`] is the real implementation. Engine tests
//! substitute scripted implementations of the trait.

use std::future::Future;
use std::pin::Pin;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;
use weekview_core::{CalendarRef, SyncWindow};

use crate::client::CalDavClient;
use crate::config::CalDavConfig;
use crate::error::{CalDavError, CalDavResult};
use crate::ics::{draft_to_ics, parse_ics};
use crate::raw_event::{EventDraft, RawEvent};
use crate::xml::{calendar_query_body, parse_propfind_response, parse_report_response, propfind_calendars_body};

/// Display name substituted when a calendar's name cannot be read.
pub const UNKNOWN_CALENDAR_NAME: &str = "Unknown Calendar";

/// A boxed future for async trait methods.
///
/// Async functions in traits do not yet compose with dynamic dispatch;
/// boxed futures keep the trait object-safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// An authenticated session against one remote calendar store.
///
/// Implementations own whatever session state the backend needs; one
/// connection instance belongs to exactly one configured account, never to
/// the process.
pub trait CalendarConnection: Send + Sync {
    /// Validates credentials and reachability.
    ///
    /// # Errors
    ///
    /// `AuthenticationFailed` when the server rejects the credentials;
    /// network/server errors otherwise.
    fn connect(&self) -> BoxFuture<'_, CalDavResult<()>>;

    /// Discovers the available calendars.
    ///
    /// Calendars whose display name cannot be read are kept with the
    /// [`UNKNOWN_CALENDAR_NAME`] sentinel rather than dropped.
    fn discover_calendars(&self) -> BoxFuture<'_, CalDavResult<Vec<CalendarRef>>>;

    /// Fetches raw events from one calendar within `[window.start,
    /// window.end)`. Recurring events arrive expanded by the server.
    fn search_events(
        &self,
        calendar_id: String,
        window: SyncWindow,
    ) -> BoxFuture<'_, CalDavResult<Vec<RawEvent>>>;

    /// Writes a new event to the given calendar.
    fn submit_event(
        &self,
        calendar_id: String,
        draft: EventDraft,
    ) -> BoxFuture<'_, CalDavResult<()>>;
}

/// [`CalendarConnection`] implementation over CalDAV/HTTP.
pub struct CalDavConnection {
    client: Mutex<CalDavClient>,
    base_url: Url,
}

impl CalDavConnection {
    /// Creates a connection from the given configuration.
    ///
    /// No network I/O happens here; the first request is made by
    /// [`CalendarConnection::connect`].
    pub fn new(config: CalDavConfig) -> CalDavResult<Self> {
        let base_url = config.url.clone();
        let client = CalDavClient::new(config)?;
        Ok(Self {
            client: Mutex::new(client),
            base_url,
        })
    }
}

impl CalendarConnection for CalDavConnection {
    fn connect(&self) -> BoxFuture<'_, CalDavResult<()>> {
        Box::pin(async move {
            let body = propfind_calendars_body();
            let url = self.base_url.to_string();

            debug!(url = %url, "probing CalDAV server");

            let mut client = self.client.lock().await;
            client.propfind(&url, &body, 0).await?;
            Ok(())
        })
    }

    fn discover_calendars(&self) -> BoxFuture<'_, CalDavResult<Vec<CalendarRef>>> {
        Box::pin(async move {
            let body = propfind_calendars_body();
            let url = self.base_url.to_string();

            debug!(url = %url, "discovering calendars via PROPFIND");

            let response = {
                let mut client = self.client.lock().await;
                client.propfind(&url, &body, 1).await?
            };

            let discovered = parse_propfind_response(&response);

            if discovered.is_empty() {
                // The configured URL may be a calendar collection itself
                // rather than a calendar home.
                debug!("no calendars in PROPFIND response, using the base URL directly");
                return Ok(vec![CalendarRef::new(
                    self.base_url.to_string(),
                    UNKNOWN_CALENDAR_NAME,
                )]);
            }

            let calendars: Vec<CalendarRef> = discovered
                .into_iter()
                .map(|cal| {
                    CalendarRef::new(
                        resolve_href(&self.base_url, &cal.href),
                        display_name_or_sentinel(cal.display_name),
                    )
                })
                .collect();

            info!(count = calendars.len(), "discovered calendars");
            Ok(calendars)
        })
    }

    fn search_events(
        &self,
        calendar_id: String,
        window: SyncWindow,
    ) -> BoxFuture<'_, CalDavResult<Vec<RawEvent>>> {
        Box::pin(async move {
            debug!(
                calendar = %calendar_id,
                start = %window.start,
                end = %window.end,
                "fetching events with REPORT"
            );

            let query = calendar_query_body(window.start, window.end);

            let response = {
                let mut client = self.client.lock().await;
                client.report(&calendar_id, &query).await?
            };

            let mut events = Vec::new();
            for (_href, ics) in parse_report_response(&response) {
                events.extend(parse_ics(&ics, &calendar_id));
            }

            debug!(calendar = %calendar_id, count = events.len(), "fetched events");
            Ok(events)
        })
    }

    fn submit_event(
        &self,
        calendar_id: String,
        draft: EventDraft,
    ) -> BoxFuture<'_, CalDavResult<()>> {
        Box::pin(async move {
            let uid = format!("{}@weekview", Uuid::new_v4());
            let ics = draft_to_ics(&draft, &uid, Utc::now());
            let url = event_resource_url(&calendar_id, &uid);

            debug!(calendar = %calendar_id, uid = %uid, "uploading new event");

            let result = {
                let mut client = self.client.lock().await;
                client.put_ics(&url, &ics).await
            };

            match result {
                Ok(_) => {
                    info!(calendar = %calendar_id, uid = %uid, "event created");
                    Ok(())
                }
                Err(e) => {
                    warn!(calendar = %calendar_id, error = %e, "event upload failed");
                    Err(e)
                }
            }
        })
    }
}

/// Resolves a possibly relative href against the base URL.
fn resolve_href(base: &Url, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else {
        base.join(href)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| href.to_string())
    }
}

/// Maps a missing or blank display name to the sentinel.
fn display_name_or_sentinel(name: Option<String>) -> String {
    match name {
        Some(name) if !name.trim().is_empty() => name,
        _ => UNKNOWN_CALENDAR_NAME.to_string(),
    }
}

/// Builds the resource URL for a new event inside a calendar collection.
fn event_resource_url(calendar_id: &str, uid: &str) -> String {
    if calendar_id.ends_with('/') {
        format!("{}{}.ics", calendar_id, uid)
    } else {
        format!("{}/{}.ics", calendar_id, uid)
    }
}

/// A connection that fails every operation with a configuration error.
///
/// Stands in when an account is misconfigured, and doubles as a test
/// helper.
#[derive(Debug, Default)]
pub struct UnconfiguredConnection;

impl CalendarConnection for UnconfiguredConnection {
    fn connect(&self) -> BoxFuture<'_, CalDavResult<()>> {
        Box::pin(async { Err(CalDavError::configuration("connection not configured")) })
    }

    fn discover_calendars(&self) -> BoxFuture<'_, CalDavResult<Vec<CalendarRef>>> {
        Box::pin(async { Err(CalDavError::configuration("connection not configured")) })
    }

    fn search_events(
        &self,
        _calendar_id: String,
        _window: SyncWindow,
    ) -> BoxFuture<'_, CalDavResult<Vec<RawEvent>>> {
        Box::pin(async { Err(CalDavError::configuration("connection not configured")) })
    }

    fn submit_event(
        &self,
        _calendar_id: String,
        _draft: EventDraft,
    ) -> BoxFuture<'_, CalDavResult<()>> {
        Box::pin(async { Err(CalDavError::configuration("connection not configured")) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_creation() {
        let config = CalDavConfig::new("https://caldav.example.com/calendars/user/").unwrap();
        assert!(CalDavConnection::new(config).is_ok());
    }

    #[test]
    fn resolve_relative_href() {
        let base = Url::parse("https://caldav.example.com/calendars/user/").unwrap();

        assert_eq!(
            resolve_href(&base, "work/"),
            "https://caldav.example.com/calendars/user/work/"
        );
        assert_eq!(
            resolve_href(&base, "/calendars/user/personal/"),
            "https://caldav.example.com/calendars/user/personal/"
        );
        assert_eq!(
            resolve_href(&base, "https://other.example.com/cal/"),
            "https://other.example.com/cal/"
        );
    }

    #[test]
    fn sentinel_for_unreadable_names() {
        assert_eq!(display_name_or_sentinel(None), UNKNOWN_CALENDAR_NAME);
        assert_eq!(
            display_name_or_sentinel(Some("  ".to_string())),
            UNKNOWN_CALENDAR_NAME
        );
        assert_eq!(display_name_or_sentinel(Some("Work".to_string())), "Work");
    }

    #[test]
    fn event_url_handles_trailing_slash() {
        assert_eq!(
            event_resource_url("https://x.test/cal/", "uid-1"),
            "https://x.test/cal/uid-1.ics"
        );
        assert_eq!(
            event_resource_url("https://x.test/cal", "uid-1"),
            "https://x.test/cal/uid-1.ics"
        );
    }

    #[tokio::test]
    async fn unconfigured_connection_fails_everything() {
        let conn = UnconfiguredConnection;
        assert!(conn.connect().await.is_err());
        assert!(conn.discover_calendars().await.is_err());
    }
}
