//! Snapshot service - locate, load and replay published CSV snapshots

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{Operation, RunStatus, SinkOutcome, SinkStatus};
use crate::ports::ObjectStore;
use crate::services::logging::{
    LogEvent, LoggingService, EVENT_SINK_FAILED, EVENT_SNAPSHOT_RELOADED,
};
use crate::services::replicate::Replicator;
use crate::services::sinks::{normalize_prefix, LatestPointer, LATEST_CSV_KEY, LATEST_POINTER_KEY};

/// Result of replaying a snapshot into the downstream sinks
#[derive(Debug, Clone, Serialize)]
pub struct ReloadReport {
    pub run_id: Uuid,
    pub key: String,
    pub operations: usize,
    pub status: RunStatus,
    pub sinks: Vec<SinkOutcome>,
}

pub struct SnapshotService {
    store: Arc<dyn ObjectStore>,
    prefix: String,
    replicator: Replicator,
    logger: Option<Arc<LoggingService>>,
}

impl SnapshotService {
    /// `replicator` should hold the relational and spreadsheet sinks only;
    /// the object store is read, never rewritten.
    pub fn new(store: Arc<dyn ObjectStore>, prefix: &str, replicator: Replicator) -> Self {
        Self {
            store,
            prefix: normalize_prefix(prefix),
            replicator,
            logger: None,
        }
    }

    pub fn with_logger(mut self, logger: Arc<LoggingService>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn location(&self) -> String {
        format!("{}{}", self.store.location(), self.prefix)
    }

    fn record(&self, event: LogEvent) {
        if let Some(logger) = &self.logger {
            logger.record(event);
        }
    }

    fn pointed_key(&self) -> Option<String> {
        let pointer_key = format!("{}{}", self.prefix, LATEST_POINTER_KEY);
        let body = match self.store.get(&pointer_key) {
            Ok(Some(body)) => body,
            Ok(None) => return None,
            Err(e) => {
                log::warn!("Failed to read {}: {}", pointer_key, e);
                return None;
            }
        };
        match serde_json::from_slice::<LatestPointer>(&body) {
            Ok(pointer) if !pointer.key.trim().is_empty() => Some(pointer.key),
            Ok(_) => None,
            Err(e) => {
                log::warn!("Ignoring malformed {}: {}", pointer_key, e);
                None
            }
        }
    }

    /// Key of the newest snapshot, if any was published
    ///
    /// The pointer object wins. Without it the newest `.csv` by modification
    /// time is used, ties broken by key, skipping the stable alias.
    pub fn latest_key(&self) -> Result<Option<String>> {
        if let Some(key) = self.pointed_key() {
            return Ok(Some(key));
        }

        let alias = format!("{}{}", self.prefix, LATEST_CSV_KEY);
        let newest = self
            .store
            .list(&self.prefix)?
            .into_iter()
            .filter(|o| o.key.ends_with(".csv") && o.key != alias)
            .max_by(|a, b| {
                a.last_modified
                    .cmp(&b.last_modified)
                    .then_with(|| a.key.cmp(&b.key))
            });
        Ok(newest.map(|o| o.key))
    }

    /// Parse a snapshot back into canonical rows
    pub fn load(&self, key: &str) -> Result<Vec<Operation>> {
        let body = self
            .store
            .get(key)?
            .ok_or_else(|| Error::NotFound(format!("snapshot {}", key)))?;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(body.as_slice());
        let mut rows = Vec::new();
        for record in reader.deserialize::<Operation>() {
            rows.push(record?);
        }
        Ok(rows)
    }

    /// Load the newest snapshot
    pub fn load_latest(&self) -> Result<(String, Vec<Operation>)> {
        let key = self
            .latest_key()?
            .ok_or_else(|| Error::NotFound(format!("no snapshot under {}", self.location())))?;
        let rows = self.load(&key)?;
        Ok((key, rows))
    }

    /// Replay the newest snapshot into the relational and spreadsheet sinks
    pub fn reload(&self, parallel: bool) -> Result<ReloadReport> {
        if self.replicator.is_empty() {
            return Err(Error::config("No relational or spreadsheet sink configured"));
        }

        let (key, rows) = self.load_latest()?;
        let run_id = Uuid::new_v4();
        let run = run_id.to_string();
        log::info!("Reloading {} rows from {}", rows.len(), key);

        let report = self.replicator.replicate_with(&rows, parallel);
        for outcome in report.outcomes.iter().filter(|o| o.status == SinkStatus::Failed) {
            self.record(
                LogEvent::new(EVENT_SINK_FAILED)
                    .with_run(&run)
                    .with_sink(&outcome.sink)
                    .with_error(outcome.error.clone().unwrap_or_default()),
            );
        }

        let status = report.run_status();
        let mut event = LogEvent::new(EVENT_SNAPSHOT_RELOADED)
            .with_run(&run)
            .with_rows(rows.len());
        if status == RunStatus::Failed {
            event = event.with_error("every sink failed");
        }
        self.record(event);

        Ok(ReloadReport {
            run_id,
            key,
            operations: rows.len(),
            status,
            sinks: report.outcomes,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::adapters::memory::{MemoryObjectStore, MemorySpreadsheet};
    use crate::ports::{OperationSink, SpreadsheetClient};
    use crate::services::sinks::{write_csv, SpreadsheetAppendSink};

    fn row(id: &str, amount: &str, description: &str) -> Operation {
        Operation {
            operation_id: id.to_string(),
            timestamp_local: "2024-03-01 13:15:30".to_string(),
            category: "Покупка ценных бумаг".to_string(),
            amount: amount.to_string(),
            currency: "rub".to_string(),
            status: "Проведена".to_string(),
            description: description.to_string(),
        }
    }

    fn service(store: Arc<MemoryObjectStore>, sinks: Vec<Arc<dyn OperationSink>>) -> SnapshotService {
        SnapshotService::new(store, "", Replicator::new(sinks))
    }

    #[test]
    fn test_latest_key_prefers_pointer() {
        let store = Arc::new(MemoryObjectStore::new());
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        store.insert_at("operations_2024-03-01_13-00.csv", b"x", t);
        store.insert_at("operations_2024-03-02_13-00.csv", b"x", t);
        store.insert_at(
            LATEST_POINTER_KEY,
            br#"{"key":"operations_2024-03-01_13-00.csv"}"#,
            t,
        );

        let snapshots = service(store, Vec::new());
        assert_eq!(
            snapshots.latest_key().unwrap().as_deref(),
            Some("operations_2024-03-01_13-00.csv")
        );
    }

    #[test]
    fn test_latest_key_falls_back_to_listing() {
        let store = Arc::new(MemoryObjectStore::new());
        let older = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let newer = Utc.with_ymd_and_hms(2024, 3, 2, 10, 0, 0).unwrap();
        store.insert_at("operations_2024-03-01_13-00.csv", b"x", older);
        store.insert_at("operations_2024-03-02_13-00.csv", b"x", newer);
        store.insert_at("operations_2024-03-02_12-00.csv", b"x", newer);
        store.insert_at(LATEST_CSV_KEY, b"x", newer + chrono::Duration::hours(1));
        store.insert_at(LATEST_POINTER_KEY, b"not json", newer);
        store.insert_at("notes.txt", b"x", newer + chrono::Duration::hours(2));

        let snapshots = service(store, Vec::new());
        assert_eq!(
            snapshots.latest_key().unwrap().as_deref(),
            Some("operations_2024-03-02_13-00.csv")
        );
    }

    #[test]
    fn test_latest_key_empty_store() {
        let snapshots = service(Arc::new(MemoryObjectStore::new()), Vec::new());
        assert_eq!(snapshots.latest_key().unwrap(), None);
        assert!(matches!(snapshots.load_latest(), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_load_parses_quoted_fields() {
        let store = Arc::new(MemoryObjectStore::new());
        let rows = vec![
            row("1", "-500.00", "Покупка 10 шт., \"SBER\""),
            row("2", "units=1 nano=1500000000", "line\nbreak"),
        ];
        store.insert_at("snap.csv", &write_csv(&rows).unwrap(), Utc::now());

        let snapshots = service(store, Vec::new());
        assert_eq!(snapshots.load("snap.csv").unwrap(), rows);
        assert!(matches!(snapshots.load("missing.csv"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_reload_replays_into_sinks() {
        let store = Arc::new(MemoryObjectStore::new());
        let rows = vec![row("1", "-500.00", ""), row("2", "12.34", "")];
        store.insert_at("operations_2024-03-01_13-00.csv", &write_csv(&rows).unwrap(), Utc::now());

        let sheet = Arc::new(MemorySpreadsheet::new("Sheet1"));
        let client: Arc<dyn SpreadsheetClient> = sheet.clone();
        let sink: Arc<dyn OperationSink> = Arc::new(SpreadsheetAppendSink::new(client));
        let snapshots = service(store, vec![sink]);

        let report = snapshots.reload(false).unwrap();
        assert_eq!(report.key, "operations_2024-03-01_13-00.csv");
        assert_eq!(report.operations, 2);
        assert_eq!(report.status, RunStatus::Succeeded);
        assert_eq!(sheet.rows().len(), 3);
    }

    #[test]
    fn test_reload_without_sinks() {
        let snapshots = service(Arc::new(MemoryObjectStore::new()), Vec::new());
        assert!(snapshots.reload(true).unwrap_err().is_precondition());
    }
}
