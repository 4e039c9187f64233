//! CLI command implementations

pub mod check;
pub mod latest;
pub mod logs;
pub mod reload;
pub mod status;
pub mod sync;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use ledgermirror_core::config::Config;
use ledgermirror_core::services::{EntryPoint, LogEvent, LoggingService};
use ledgermirror_core::LedgerContext;

/// Data directory: LEDGERMIRROR_DIR from the config, else ~/.ledgermirror
pub fn get_data_dir(config: Option<&Config>) -> PathBuf {
    if let Some(dir) = config.and_then(|c| c.data_dir.clone()) {
        return dir;
    }
    if let Ok(dir) = std::env::var("LEDGERMIRROR_DIR") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ledgermirror")
}

/// Get the logging service for CLI operations
///
/// Returns None if logging fails to initialize (never blocks a run)
pub fn get_logger(data_dir: &Path) -> Option<Arc<LoggingService>> {
    match LoggingService::new(data_dir, EntryPoint::Cli, env!("CARGO_PKG_VERSION")) {
        Ok(service) => Some(Arc::new(service)),
        Err(e) => {
            log::warn!("Event log unavailable in {}: {}", data_dir.display(), e);
            None
        }
    }
}

pub fn load_config(env_file: Option<&Path>) -> Result<Config> {
    Config::load(env_file).context("Invalid configuration")
}

/// Build the full context and record the command in the event log
pub fn get_context(env_file: Option<&Path>, command: &str) -> Result<LedgerContext> {
    let config = load_config(env_file)?;
    let logger = get_logger(&get_data_dir(Some(&config)));
    if let Some(logger) = &logger {
        logger.record(LogEvent::new("command").with_command(command));
    }
    LedgerContext::from_config(config, logger).context("Failed to initialize ledgermirror")
}
