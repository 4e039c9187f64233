//! ledgermirror CLI - mirror a brokerage ledger into your storage

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{check, latest, logs, reload, status, sync};

/// ledgermirror - brokerage ledger sync
#[derive(Parser)]
#[command(name = "lm", version, about, long_about = None)]
struct Cli {
    /// Env file with settings (defaults to ./config.env when present)
    #[arg(long, global = true, env = "LEDGERMIRROR_ENV_FILE")]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch operations and replicate them to every configured sink
    Sync {
        /// Lookback window in days (overrides DAYS_BACK)
        #[arg(long)]
        days_back: Option<u32>,
        /// Run sinks one after another instead of in parallel
        #[arg(long)]
        sequential: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show relational store status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the newest published snapshot
    Latest {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Replay the newest snapshot into the database and spreadsheet
    Reload {
        /// Run sinks one after another instead of in parallel
        #[arg(long)]
        sequential: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate configuration and list the sinks that would run
    Check {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// View and manage the sync event log
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let env_file = cli.env_file.as_deref();
    match cli.command {
        Commands::Sync {
            days_back,
            sequential,
            json,
        } => sync::run(env_file, days_back, sequential, json),
        Commands::Status { json } => status::run(env_file, json).map(|_| ExitCode::SUCCESS),
        Commands::Latest { json } => latest::run(env_file, json).map(|_| ExitCode::SUCCESS),
        Commands::Reload { sequential, json } => reload::run(env_file, sequential, json),
        Commands::Check { json } => check::run(env_file, json),
        Commands::Logs { command } => logs::run(env_file, command).map(|_| ExitCode::SUCCESS),
    }
}
