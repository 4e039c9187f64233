//! Logs command - view and manage the sync event log

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Duration, TimeZone, Utc};
use clap::Subcommand;
use colored::Colorize;
use ledgermirror_core::services::{EntryPoint, LoggingService};

use super::{get_data_dir, load_config};
use crate::output;

#[derive(Subcommand)]
pub enum LogsCommands {
    /// Show recent log entries
    List {
        /// Number of entries to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
        /// Show only errors
        #[arg(long)]
        errors: bool,
        /// Show every entry of one run, oldest first
        #[arg(long)]
        run: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete log entries
    Clear {
        /// Delete only entries older than N days
        #[arg(long)]
        older_than_days: Option<i64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show log statistics and database path
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn get_logging_service(env_file: Option<&Path>) -> Result<LoggingService> {
    // The event log stays readable even when the rest of the config is broken
    let config = load_config(env_file).ok();
    let data_dir = get_data_dir(config.as_ref());
    LoggingService::new(&data_dir, EntryPoint::Cli, env!("CARGO_PKG_VERSION"))
        .with_context(|| format!("Failed to open event log in {}", data_dir.display()))
}

fn format_timestamp(timestamp_ms: i64) -> String {
    Utc.timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp_ms.to_string())
}

pub fn run(env_file: Option<&Path>, command: LogsCommands) -> Result<()> {
    let service = get_logging_service(env_file)?;

    match command {
        LogsCommands::List {
            limit,
            errors,
            run,
            json,
        } => {
            let entries = match (&run, errors) {
                (Some(run_id), _) => service.get_run(run_id)?,
                (None, true) => service.get_errors(limit)?,
                (None, false) => service.get_recent(limit)?,
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
                return Ok(());
            }

            if entries.is_empty() {
                println!("No log entries found.");
                return Ok(());
            }

            let mut table = output::create_table();
            table.set_header(vec!["Time", "Event", "Run", "Sink", "Rows", "Error"]);

            for entry in entries {
                let run_short = entry
                    .run_id
                    .as_deref()
                    .map(|r| r.chars().take(8).collect::<String>())
                    .unwrap_or_default();
                let error = entry
                    .error_message
                    .as_deref()
                    .map(|e| e.red().to_string())
                    .unwrap_or_default();

                table.add_row(vec![
                    format_timestamp(entry.timestamp),
                    entry.event,
                    run_short,
                    entry.sink.unwrap_or_default(),
                    entry.row_count.map(|r| r.to_string()).unwrap_or_default(),
                    error,
                ]);
            }

            println!("{}", table);
        }
        LogsCommands::Clear {
            older_than_days,
            json,
        } => {
            let deleted = match older_than_days {
                Some(days) => {
                    let cutoff = Utc::now() - Duration::days(days);
                    service.delete_before(cutoff.timestamp_millis())?
                }
                None => service.clear()?,
            };

            if json {
                println!("{}", serde_json::json!({ "deleted": deleted }));
            } else {
                output::success(&format!("Deleted {} log entries", deleted));
            }
        }
        LogsCommands::Stats { json } => {
            let stats = service.stats()?;
            let db_path = service.db_path().to_path_buf();
            let size_bytes = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "stats": stats,
                        "database_path": db_path.to_string_lossy(),
                        "database_size_bytes": size_bytes,
                    }))?
                );
                return Ok(());
            }

            println!("{}", "Log Statistics".bold());
            println!("  Total entries: {}", stats.total);
            println!("  Errors: {}", stats.errors);
            if let (Some(oldest), Some(newest)) = (stats.oldest, stats.newest) {
                println!(
                    "  Span: {} to {}",
                    format_timestamp(oldest),
                    format_timestamp(newest)
                );
            }
            for (event, count) in &stats.by_event {
                println!("    {:<20} {}", event, count);
            }
            println!("  Database: {}", db_path.display());
            println!("  Size: {}", output::format_size(size_bytes));
        }
    }

    Ok(())
}
