//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// CalDAV week-view sync: agenda views and event creation from the
/// terminal, or a long-running sync loop.
#[derive(Debug, Parser)]
#[command(name = "weekview", version, about)]
pub struct Cli {
    /// Path to the account config file (defaults to
    /// `$XDG_CONFIG_HOME/weekview/config.toml`).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long, global = true, env = "WEEKVIEW_DEBUG")]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the discovered calendars.
    Calendars,

    /// Print the upcoming agenda grouped by day.
    Agenda {
        /// Number of days to show (defaults to the configured sync
        /// horizon).
        #[arg(long)]
        days: Option<u32>,
    },

    /// Show the currently ongoing or next upcoming event.
    Next,

    /// Create a new event in a calendar.
    Add {
        /// Event title.
        title: String,

        /// Target calendar id (see `weekview calendars`).
        #[arg(long)]
        calendar: String,

        /// Start time, e.g. `2024-06-03T09:00` (local) or RFC 3339.
        #[arg(long)]
        start: String,

        /// End time, same formats as --start.
        #[arg(long)]
        end: String,

        /// Optional description.
        #[arg(long)]
        description: Option<String>,

        /// Optional location.
        #[arg(long)]
        location: Option<String>,
    },

    /// Run the periodic sync loop, logging each cycle.
    Watch,
}
