//! Sync service - one fetch, normalize and replicate pass
//!
//! A run either fails before any network call (precondition error, returned
//! as `Err`) or always yields a `SyncReport`, whether the fetch failed, some
//! sinks failed, or everything succeeded.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{ReplicationReport, RunStatus, RunTotals, SinkStatus, SyncReport};
use crate::services::fetch::OperationFetcher;
use crate::services::logging::{
    LogEvent, LoggingService, EVENT_FETCH_FAILED, EVENT_SINK_FAILED, EVENT_SINK_WARNING,
    EVENT_SYNC_COMPLETED, EVENT_SYNC_STARTED,
};
use crate::services::normalize::Normalizer;
use crate::services::replicate::Replicator;

/// Per-run overrides
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Lookback window, overrides the configured one
    pub days_back: Option<u32>,
    /// Run sinks one after another instead of in parallel
    pub sequential: bool,
}

pub struct SyncService {
    fetcher: OperationFetcher,
    normalizer: Normalizer,
    replicator: Replicator,
    token: String,
    days_back: u32,
    logger: Option<Arc<LoggingService>>,
}

impl SyncService {
    pub fn new(
        fetcher: OperationFetcher,
        normalizer: Normalizer,
        replicator: Replicator,
        token: impl Into<String>,
        days_back: u32,
    ) -> Self {
        Self {
            fetcher,
            normalizer,
            replicator,
            token: token.into(),
            days_back,
            logger: None,
        }
    }

    /// Record run events in the structured event log
    pub fn with_logger(mut self, logger: Arc<LoggingService>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn sink_names(&self) -> Vec<String> {
        self.replicator.sink_names()
    }

    pub fn source_name(&self) -> &str {
        self.fetcher.source_name()
    }

    fn record(&self, event: LogEvent) {
        if let Some(logger) = &self.logger {
            logger.record(event);
        }
    }

    /// Run one sync pass
    pub fn sync(&self, options: SyncOptions) -> Result<SyncReport> {
        let days_back = options.days_back.unwrap_or(self.days_back);
        if days_back < 1 {
            return Err(Error::validation(format!(
                "days_back must be at least 1, got {}",
                days_back
            )));
        }
        if self.replicator.is_empty() {
            return Err(Error::config("No sink configured"));
        }

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let run = run_id.to_string();
        log::info!(
            "Sync {} started: source={} days_back={} sinks={}",
            run,
            self.fetcher.source_name(),
            days_back,
            self.sink_names().join(",")
        );
        self.record(LogEvent::new(EVENT_SYNC_STARTED).with_run(&run));

        let batch = match self.fetcher.fetch_at(&self.token, days_back, started_at) {
            Ok(batch) => batch,
            Err(e) if e.is_precondition() => return Err(e),
            Err(e) => {
                log::error!("Sync {} fetch failed: {}", run, e);
                self.record(
                    LogEvent::new(EVENT_FETCH_FAILED)
                        .with_run(&run)
                        .with_error(e.to_string())
                        .with_error_details(format!(
                            "source={} days_back={}",
                            self.fetcher.source_name(),
                            days_back
                        )),
                );
                self.record(
                    LogEvent::new(EVENT_SYNC_COMPLETED)
                        .with_run(&run)
                        .with_rows(0)
                        .with_error("failed"),
                );
                return Ok(SyncReport {
                    run_id,
                    started_at,
                    account_id: None,
                    window: None,
                    status: RunStatus::Failed,
                    totals: RunTotals::default(),
                    sinks: Vec::new(),
                    error: Some(e.to_string()),
                });
            }
        };

        let rows = self.normalizer.normalize_all(&batch.operations);
        let totals = RunTotals::from_rows(&rows);
        log::info!("Sync {} fetched {} operations", run, rows.len());

        let report = self
            .replicator
            .replicate_at(&rows, !options.sequential, started_at);
        self.record_outcomes(&run, &report);

        let status = report.run_status();
        let error = (status == RunStatus::Failed).then(|| "every sink failed".to_string());
        let mut completed = LogEvent::new(EVENT_SYNC_COMPLETED)
            .with_run(&run)
            .with_rows(rows.len());
        if let Some(e) = &error {
            completed = completed.with_error(e.clone());
        }
        self.record(completed);
        log::info!("Sync {} finished: {:?}", run, status);

        Ok(SyncReport {
            run_id,
            started_at,
            account_id: Some(batch.account_id),
            window: Some(batch.window),
            status,
            totals,
            sinks: report.outcomes,
            error,
        })
    }

    fn record_outcomes(&self, run: &str, report: &ReplicationReport) {
        for outcome in &report.outcomes {
            if outcome.status == SinkStatus::Failed {
                log::error!(
                    "Sink {} failed: {}",
                    outcome.sink,
                    outcome.error.as_deref().unwrap_or("")
                );
                self.record(
                    LogEvent::new(EVENT_SINK_FAILED)
                        .with_run(run)
                        .with_sink(&outcome.sink)
                        .with_error(outcome.error.clone().unwrap_or_default()),
                );
            }
            for warning in &outcome.warnings {
                log::warn!("Sink {}: {}", outcome.sink, warning);
                self.record(
                    LogEvent::new(EVENT_SINK_WARNING)
                        .with_run(run)
                        .with_sink(&outcome.sink)
                        .with_rows(outcome.written)
                        .with_error(warning.clone()),
                );
            }
        }
    }
}
