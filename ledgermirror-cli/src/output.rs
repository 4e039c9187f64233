//! Output formatting utilities

use colored::{ColoredString, Colorize};
use comfy_table::{presets::UTF8_FULL_CONDENSED, ContentArrangement, Table};
use ledgermirror_core::{RunStatus, SinkOutcome, SinkStatus};

/// Print a success message
pub fn success(msg: &str) {
    println!("{}", msg.green());
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{}", msg.red());
}

/// Print a warning message
pub fn warning(msg: &str) {
    println!("{}", msg.yellow());
}

/// Print an info message
pub fn info(msg: &str) {
    println!("{}", msg.cyan());
}

/// Create a styled table
pub fn create_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Format bytes as human-readable size
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

pub fn run_status(status: RunStatus) -> ColoredString {
    match status {
        RunStatus::Succeeded => "succeeded".green(),
        RunStatus::PartiallySucceeded => "partially succeeded".yellow(),
        RunStatus::Failed => "failed".red(),
    }
}

fn sink_status(status: SinkStatus) -> String {
    match status {
        SinkStatus::Succeeded => "ok".green().to_string(),
        SinkStatus::Partial => "partial".yellow().to_string(),
        SinkStatus::Failed => "failed".red().to_string(),
    }
}

/// Table with one line per sink outcome
pub fn sink_table(outcomes: &[SinkOutcome]) -> Table {
    let mut table = create_table();
    table.set_header(vec!["Sink", "Status", "Rows", "Details"]);
    for outcome in outcomes {
        let mut details: Vec<String> = outcome.error.iter().cloned().collect();
        details.extend(outcome.warnings.iter().cloned());
        table.add_row(vec![
            outcome.sink.clone(),
            sink_status(outcome.status),
            outcome.written.to_string(),
            details.join("\n"),
        ]);
    }
    table
}
