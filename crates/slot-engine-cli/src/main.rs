//! `slots` CLI: query availability and commit bookings against a SQLite database.
//!
//! ## Usage
//!
//! ```sh
//! # Create the database and load schedules, event types and events
//! slots --db slots.sqlite init
//! slots --db slots.sqlite import -i dataset.json
//!
//! # Windows, bookable starts and available days
//! slots --db slots.sqlite resolve --schedule 1 --date 2026-03-16
//! slots --db slots.sqlite day --event-type 10 --date 2026-03-16 --duration 30
//! slots --db slots.sqlite month --event-type 10 --month 2026-03
//!
//! # Recurring events and the calendar view
//! slots --db slots.sqlite expand --owner ana --from 2026-03-01T00:00:00Z --to 2026-03-31T23:59:59Z
//! slots --db slots.sqlite calendar --owner ana --from 2026-03-16T00:00:00Z --to 2026-03-17T00:00:00Z
//!
//! # Book and cancel
//! slots --db slots.sqlite book --event-type 10 --start 2026-03-16T10:00:00Z --duration 30 \
//!     --name Cleo --email cleo@example.com
//! slots --db slots.sqlite cancel --token 3f1c...
//! ```
//!
//! Results are printed as pretty JSON on stdout; logs go to stderr. Exit code 3
//! means the slot was taken, 4 means the referenced record does not exist.

use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use slot_engine::{
    BookerInfo, BookingEngine, BookingRef, BookingRequest, Dataset, EngineConfig, EngineError,
    Interval,
};
use tracing_subscriber::EnvFilter;

const EXIT_CONFLICT: u8 = 3;
const EXIT_NOT_FOUND: u8 = 4;

#[derive(Parser)]
#[command(name = "slots", version, about = "Availability and booking engine CLI")]
struct Cli {
    /// SQLite database file (overrides `database_path` from the config file)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    Init,
    /// Load a JSON dataset of schedules, event types and events
    Import {
        /// Input file (reads from stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,
    },
    /// Show the availability windows that apply to a date
    Resolve {
        #[arg(long)]
        schedule: i64,
        #[arg(long)]
        date: NaiveDate,
    },
    /// List bookable start times for an event type on a date
    Day {
        #[arg(long)]
        event_type: i64,
        #[arg(long)]
        date: NaiveDate,
        /// Duration in minutes (defaults to the event type's default)
        #[arg(long)]
        duration: Option<u32>,
    },
    /// List the days of a month with at least one bookable start
    Month {
        #[arg(long)]
        event_type: i64,
        /// Month as YYYY-MM
        #[arg(long)]
        month: String,
    },
    /// Expand an owner's recurring events within a range
    Expand(RangeArgs),
    /// Show an owner's events, bookings and recurring occurrences within a range
    Calendar(RangeArgs),
    /// Book a slot
    Book {
        #[arg(long)]
        event_type: i64,
        /// Start instant, RFC 3339
        #[arg(long)]
        start: DateTime<Utc>,
        /// Duration in minutes
        #[arg(long)]
        duration: u32,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Cancel a booking by id or cancellation token
    Cancel {
        #[arg(long, conflicts_with = "token", required_unless_present = "token")]
        id: Option<i64>,
        #[arg(long)]
        token: Option<String>,
    },
}

#[derive(Args)]
struct RangeArgs {
    #[arg(long)]
    owner: String,
    /// Range start, RFC 3339
    #[arg(long)]
    from: DateTime<Utc>,
    /// Range end, RFC 3339
    #[arg(long)]
    to: DateTime<Utc>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            match err.downcast_ref::<EngineError>() {
                Some(e) if e.is_conflict() => {
                    eprintln!("That time is no longer available; pick another time.");
                    ExitCode::from(EXIT_CONFLICT)
                }
                Some(e) if e.is_not_found() => ExitCode::from(EXIT_NOT_FOUND),
                _ => ExitCode::FAILURE,
            }
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(db) = cli.db {
        config.database_path = db;
    }
    init_tracing(&config)?;

    let mut engine = BookingEngine::open(config.clone()).with_context(|| {
        format!("Failed to open database: {}", config.database_path.display())
    })?;

    match cli.command {
        Commands::Init => {
            tracing::info!(path = %config.database_path.display(), "database ready");
            print_json(&serde_json::json!({ "database": config.database_path }))?;
        }
        Commands::Import { input } => {
            let content = read_input(input.as_deref())?;
            let dataset = Dataset::from_json(&content).context("Failed to parse dataset")?;
            let summary = engine.import(&dataset).context("Failed to import dataset")?;
            print_json(&summary)?;
        }
        Commands::Resolve { schedule, date } => {
            print_json(&engine.resolve_day(schedule, date)?)?;
        }
        Commands::Day {
            event_type,
            date,
            duration,
        } => {
            print_json(&engine.available_slots(event_type, date, duration)?)?;
        }
        Commands::Month { event_type, month } => {
            print_json(&engine.month_availability(event_type, &month)?)?;
        }
        Commands::Expand(range) => {
            print_json(&engine.expand_occurrences(&range.owner, range.from, range.to)?)?;
        }
        Commands::Calendar(range) => {
            let interval = Interval::new(range.from, range.to);
            print_json(&engine.calendar(&range.owner, &interval)?)?;
        }
        Commands::Book {
            event_type,
            start,
            duration,
            name,
            email,
            notes,
        } => {
            let request = BookingRequest {
                event_type_id: event_type,
                start,
                duration_minutes: duration,
                booker: BookerInfo { name, email, notes },
            };
            print_json(&engine.commit_booking(&request)?)?;
        }
        Commands::Cancel { id, token } => {
            let booking = match (id, token) {
                (Some(id), _) => BookingRef::Id(id),
                (None, Some(token)) => BookingRef::Token(token),
                (None, None) => anyhow::bail!("Either --id or --token is required"),
            };
            print_json(&engine.cancel_booking(&booking)?)?;
        }
    }

    Ok(())
}

/// `RUST_LOG` wins, then `log_filter` from the config, then `warn`.
fn init_tracing(config: &EngineConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(config.log_filter.as_deref().unwrap_or("warn"))
            .context("Invalid log_filter")?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let pretty = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{pretty}");
    Ok(())
}

fn read_input(path: Option<&str>) -> Result<String> {
    match path {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("Failed to read file: {}", path))
        }
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read from stdin")?;
            Ok(buf)
        }
    }
}
