//! Sync command - one fetch and replicate pass

use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use ledgermirror_core::services::SyncOptions;
use ledgermirror_core::RunStatus;

use super::get_context;
use crate::output;

fn spinner(message: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        bar.set_style(style);
    }
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

pub fn run(
    env_file: Option<&Path>,
    days_back: Option<u32>,
    sequential: bool,
    json: bool,
) -> Result<ExitCode> {
    let ctx = get_context(env_file, "sync")?;
    let options = SyncOptions {
        days_back,
        sequential,
    };

    let bar = (!json).then(|| {
        spinner(format!(
            "Syncing {} into {}",
            ctx.sync_service.source_name(),
            ctx.sync_service.sink_names().join(", ")
        ))
    });
    let result = ctx.sync_service.sync(options);
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
    let report = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{} {}", "Run".bold(), report.run_id);
        if let (Some(account), Some(window)) = (&report.account_id, &report.window) {
            println!(
                "  Account {}, {} to {}",
                account,
                window.start.format("%Y-%m-%d %H:%M"),
                window.end.format("%Y-%m-%d %H:%M")
            );
        }
        println!(
            "  Operations: {} (+{} / -{}), total {}",
            report.totals.operations,
            report.totals.positive,
            report.totals.negative,
            report.totals.total_amount
        );
        if report.totals.unparsed_amounts > 0 {
            output::warning(&format!(
                "  {} operations have no numeric amount",
                report.totals.unparsed_amounts
            ));
        }
        if !report.sinks.is_empty() {
            println!("{}", output::sink_table(&report.sinks));
        }
        if let Some(error) = &report.error {
            output::error(error);
        }
        println!("Status: {}", output::run_status(report.status));
    }

    Ok(if report.status == RunStatus::Failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
