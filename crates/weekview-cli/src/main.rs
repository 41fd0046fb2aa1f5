//! weekview: CalDAV week-view sync from the terminal.

mod cli;
mod config;

use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use clap::Parser;
use tracing::Level;

use weekview_caldav::CalDavConnection;
use weekview_core::{Event, Snapshot, TracingConfig, init_tracing, views};
use weekview_engine::{AccountConfig, EngineError, Scheduler, SchedulerConfig, SyncEngine};

use cli::{Cli, Command};

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> CliResult {
    let tracing_config = if cli.debug {
        TracingConfig::default().with_level(Level::DEBUG)
    } else {
        TracingConfig::default()
    };
    init_tracing(tracing_config)?;

    let account = config::load_account(cli.config.as_deref())?;
    let engine = build_engine(&account)?;

    match cli.command {
        Command::Calendars => {
            let snapshot = sync_once(&engine).await?;
            print_calendars(&snapshot);
        }
        Command::Agenda { days } => {
            let snapshot = sync_once(&engine).await?;
            print_agenda(&snapshot, days.unwrap_or(account.effective_days_to_sync()));
        }
        Command::Next => {
            let snapshot = sync_once(&engine).await?;
            print_next(&snapshot);
        }
        Command::Add {
            title,
            calendar,
            start,
            end,
            description,
            location,
        } => {
            let start = parse_cli_datetime(&start)?;
            let end = parse_cli_datetime(&end)?;

            // Populate the calendar set before the write.
            sync_once(&engine).await?;

            if engine
                .create_event(&calendar, &title, start, end, description, location)
                .await
            {
                println!("event created: {}", title);
            } else {
                return Err("event creation failed; run with --debug for details".into());
            }
        }
        Command::Watch => {
            connect_or_explain(&engine).await?;
            let scheduler_config =
                SchedulerConfig::default().with_auto_refresh(account.auto_refresh);
            Scheduler::new(engine, scheduler_config).run().await;
        }
    }

    Ok(())
}

fn build_engine(account: &AccountConfig) -> Result<Arc<SyncEngine>, Box<dyn std::error::Error>> {
    let connection = Arc::new(CalDavConnection::new(account.caldav_config()?)?);
    Ok(Arc::new(SyncEngine::new(
        connection,
        account.effective_days_to_sync(),
    )))
}

/// Runs setup, turning engine errors into the two user-facing failure
/// messages: bad credentials vs. unreachable server.
async fn connect_or_explain(engine: &SyncEngine) -> CliResult {
    match engine.async_setup().await {
        Ok(()) => Ok(()),
        Err(EngineError::AuthenticationRequired) => Err(
            "authentication failed: check your username and app-specific password".into(),
        ),
        Err(e) => Err(format!("could not reach the calendar server: {}", e).into()),
    }
}

async fn sync_once(engine: &SyncEngine) -> Result<Arc<Snapshot>, Box<dyn std::error::Error>> {
    connect_or_explain(engine).await?;
    engine.refresh().await.map_err(|e| e.to_string().into())
}

fn print_calendars(snapshot: &Snapshot) {
    if snapshot.calendars.is_empty() {
        println!("no calendars found");
        return;
    }

    for calendar in snapshot.calendars.values() {
        let marker = if snapshot.failed_calendar_ids.contains(&calendar.id) {
            "  [sync failed]"
        } else {
            ""
        };
        println!("{}{}", calendar.name, marker);
        println!("  {}", calendar.id);
    }
}

fn print_agenda(snapshot: &Snapshot, days: u32) {
    let today = Local::now().date_naive();

    for (day, count) in views::daily_counts(snapshot, today, days, &Local) {
        println!("{}  ({} events)", day.format("%a %Y-%m-%d"), count);
        for event in views::events_on_date(snapshot, day, &Local) {
            println!("  {}", format_event_line(event));
        }
    }

    if snapshot.is_degraded() {
        println!(
            "warning: {} calendar(s) failed to sync; data may be incomplete",
            snapshot.failed_calendar_ids.len()
        );
    }
}

fn print_next(snapshot: &Snapshot) {
    match views::current_or_next(snapshot, Utc::now()) {
        Some(event) => {
            println!("{}", format_event_line(event));
            if !event.location.is_empty() {
                println!("  at {}", event.location);
            }
        }
        None => println!("no upcoming events"),
    }
}

fn format_event_line(event: &Event) -> String {
    let title = if event.summary.is_empty() {
        "(untitled)"
    } else {
        &event.summary
    };

    if event.all_day {
        format!("all-day      {}  [{}]", title, event.calendar_name)
    } else {
        format!(
            "{}-{}  {}  [{}]",
            event.start.with_timezone(&Local).format("%H:%M"),
            event.end.with_timezone(&Local).format("%H:%M"),
            title,
            event.calendar_name
        )
    }
}

/// Parses a user-supplied date/time: RFC 3339, a local `YYYY-MM-DDTHH:MM`
/// wall-clock time, or a bare date (local midnight).
fn parse_cli_datetime(input: &str) -> Result<DateTime<Utc>, String> {
    let input = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return local_to_utc(naive);
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return Ok(weekview_core::local_midnight(date, &Local));
    }

    Err(format!(
        "unrecognized date/time {:?}; use e.g. 2024-06-03T09:00",
        input
    ))
}

fn local_to_utc(naive: NaiveDateTime) -> Result<DateTime<Utc>, String> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| format!("{} does not exist in the local timezone", naive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::{BTreeMap, BTreeSet};

    #[test]
    fn parses_rfc3339() {
        let dt = parse_cli_datetime("2024-06-03T09:00:00+02:00").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2024, 6, 3, 7, 0, 0).unwrap());
    }

    #[test]
    fn parses_local_wall_clock() {
        // The exact instant depends on the machine timezone; parsing must
        // succeed for the documented shapes.
        assert!(parse_cli_datetime("2024-06-03T09:00").is_ok());
        assert!(parse_cli_datetime("2024-06-03 09:00").is_ok());
        assert!(parse_cli_datetime("2024-06-03T09:00:30").is_ok());
        assert!(parse_cli_datetime("2024-06-03").is_ok());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_cli_datetime("next tuesday").is_err());
        assert!(parse_cli_datetime("").is_err());
    }

    #[test]
    fn event_line_formats() {
        let timed = Event::new(
            "e",
            "Standup",
            Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 6, 3, 9, 15, 0).unwrap(),
            "cal",
            "Work",
        );
        let line = format_event_line(&timed);
        assert!(line.contains("Standup"));
        assert!(line.contains("[Work]"));

        let all_day = timed.clone().with_all_day(true);
        assert!(format_event_line(&all_day).starts_with("all-day"));
    }

    #[test]
    fn untitled_events_get_a_placeholder() {
        let event = Event::new(
            "e",
            "",
            Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 6, 3, 10, 0, 0).unwrap(),
            "cal",
            "Work",
        );
        assert!(format_event_line(&event).contains("(untitled)"));
    }

    #[test]
    fn snapshot_printing_does_not_panic() {
        let snapshot = Snapshot::new(
            Vec::new(),
            BTreeMap::new(),
            BTreeSet::new(),
            Utc::now(),
        );
        print_calendars(&snapshot);
        print_agenda(&snapshot, 7);
        print_next(&snapshot);
    }
}
