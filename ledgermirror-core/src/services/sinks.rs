//! Sink adapters - object store snapshot, relational upsert, spreadsheet append
//!
//! Each adapter wraps a storage port and folds every failure into its
//! `SinkOutcome`, so the coordinator never has to special-case a sink.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::domain::result::Result;
use crate::domain::{Operation, SinkOutcome, OPERATION_COLUMNS};
use crate::ports::{ObjectStore, OperationSink, RelationalStore, SpreadsheetClient};

pub const OBJECT_STORE_SINK: &str = "object_store";
pub const RELATIONAL_SINK: &str = "relational";
pub const SPREADSHEET_SINK: &str = "spreadsheet";

/// Stable alias of the newest snapshot
pub const LATEST_CSV_KEY: &str = "operations_latest.csv";
/// Pointer object naming the newest dated snapshot
pub const LATEST_POINTER_KEY: &str = "latest.json";

const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";
const JSON_CONTENT_TYPE: &str = "application/json";

/// Body of `latest.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestPointer {
    pub key: String,
}

/// Render rows as CSV: canonical header, CRLF terminators, minimal quoting
pub fn write_csv(rows: &[Operation]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(Vec::new());
    writer.write_record(OPERATION_COLUMNS)?;
    for row in rows {
        writer.write_record(row.to_record())?;
    }
    writer
        .into_inner()
        .map_err(|e| crate::domain::result::Error::Other(format!("CSV flush failed: {}", e)))
}

/// Normalize a user-supplied key prefix to either "" or "something/"
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}

/// Writes each batch as a dated CSV snapshot and republishes the aliases
pub struct ObjectStoreSink {
    store: Arc<dyn ObjectStore>,
    timezone: Tz,
    prefix: String,
    pinned_time: Option<DateTime<Utc>>,
}

impl ObjectStoreSink {
    pub fn new(store: Arc<dyn ObjectStore>, timezone: Tz, prefix: &str) -> Self {
        Self {
            store,
            timezone,
            prefix: normalize_prefix(prefix),
            pinned_time: None,
        }
    }

    /// Use a fixed snapshot time instead of the run start time
    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.pinned_time = Some(time);
        self
    }

    /// Dated snapshot key for a point in time
    pub fn snapshot_key(&self, time: DateTime<Utc>) -> String {
        let local = time.with_timezone(&self.timezone);
        format!(
            "{}operations_{}.csv",
            self.prefix,
            local.format("%Y-%m-%d_%H-%M")
        )
    }

    pub fn latest_csv_key(&self) -> String {
        format!("{}{}", self.prefix, LATEST_CSV_KEY)
    }

    pub fn pointer_key(&self) -> String {
        format!("{}{}", self.prefix, LATEST_POINTER_KEY)
    }

    fn publish(&self, rows: &[Operation], started_at: DateTime<Utc>) -> SinkOutcome {
        let body = match write_csv(rows) {
            Ok(body) => body,
            Err(e) => return SinkOutcome::failed(OBJECT_STORE_SINK, e.to_string()),
        };

        let key = self.snapshot_key(self.pinned_time.unwrap_or(started_at));
        if let Err(e) = self.store.put(&key, &body, CSV_CONTENT_TYPE) {
            return SinkOutcome::failed(
                OBJECT_STORE_SINK,
                format!("{} ({}): {}", key, self.store.location(), e),
            );
        }
        log::info!("Uploaded {} rows to {}{}", rows.len(), self.store.location(), key);

        let mut outcome = SinkOutcome::succeeded(OBJECT_STORE_SINK, rows.len());

        let alias = self.latest_csv_key();
        if let Err(e) = self.store.put(&alias, &body, CSV_CONTENT_TYPE) {
            log::warn!("Failed to update {}: {}", alias, e);
            outcome = outcome.with_warning(format!("{}: {}", alias, e));
        }

        let pointer_key = self.pointer_key();
        let pointer = serde_json::to_vec(&LatestPointer { key: key.clone() });
        let pointer_result = match pointer {
            Ok(pointer) => self.store.put(&pointer_key, &pointer, JSON_CONTENT_TYPE),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = pointer_result {
            log::warn!("Failed to update {}: {}", pointer_key, e);
            outcome = outcome.with_warning(format!("{}: {}", pointer_key, e));
        }

        outcome
    }
}

impl OperationSink for ObjectStoreSink {
    fn name(&self) -> &str {
        OBJECT_STORE_SINK
    }

    fn replicate(&self, rows: &[Operation]) -> SinkOutcome {
        self.publish(rows, Utc::now())
    }

    fn replicate_at(&self, rows: &[Operation], started_at: DateTime<Utc>) -> SinkOutcome {
        self.publish(rows, started_at)
    }
}

/// Collapse rows sharing an `operation_id`.
///
/// The surviving row takes the position of the first occurrence and the
/// values of the last one. Returns the rows and how many were dropped.
pub fn collapse_duplicate_ids(rows: &[Operation]) -> (Vec<Operation>, usize) {
    let mut positions: HashMap<&str, usize> = HashMap::with_capacity(rows.len());
    let mut unique: Vec<Operation> = Vec::with_capacity(rows.len());
    for row in rows {
        match positions.get(row.operation_id.as_str()) {
            Some(&index) => unique[index] = row.clone(),
            None => {
                positions.insert(row.operation_id.as_str(), unique.len());
                unique.push(row.clone());
            }
        }
    }
    let dropped = rows.len() - unique.len();
    (unique, dropped)
}

/// Upserts the batch into a relational table keyed on `operation_id`
pub struct RelationalUpsertSink {
    store: Arc<dyn RelationalStore>,
}

impl RelationalUpsertSink {
    pub fn new(store: Arc<dyn RelationalStore>) -> Self {
        Self { store }
    }
}

impl OperationSink for RelationalUpsertSink {
    fn name(&self) -> &str {
        RELATIONAL_SINK
    }

    fn replicate(&self, rows: &[Operation]) -> SinkOutcome {
        if let Err(e) = self.store.ensure_table() {
            return SinkOutcome::failed(
                RELATIONAL_SINK,
                format!("{}: table setup failed: {}", self.store.backend(), e),
            );
        }

        let (unique, dropped) = collapse_duplicate_ids(rows);
        if unique.is_empty() {
            return SinkOutcome::succeeded(RELATIONAL_SINK, 0);
        }

        match self.store.upsert_operations(&unique) {
            Ok(written) => {
                log::info!("Upserted {} rows into {}", written, self.store.backend());
                let outcome = SinkOutcome::succeeded(RELATIONAL_SINK, written);
                if dropped > 0 {
                    outcome.with_note(format!(
                        "{} rows shared an operation_id with a later row and were collapsed",
                        dropped
                    ))
                } else {
                    outcome
                }
            }
            Err(e) => SinkOutcome::failed(
                RELATIONAL_SINK,
                format!("{}: {}", self.store.backend(), e),
            ),
        }
    }
}

/// Appends the batch below a canonical header row
///
/// Not idempotent: every run appends its rows again.
pub struct SpreadsheetAppendSink {
    client: Arc<dyn SpreadsheetClient>,
}

impl SpreadsheetAppendSink {
    pub fn new(client: Arc<dyn SpreadsheetClient>) -> Self {
        Self { client }
    }

    fn write(&self, rows: &[Operation]) -> Result<usize> {
        self.client.ensure_sheet()?;

        let header: Vec<String> = OPERATION_COLUMNS.iter().map(|c| c.to_string()).collect();
        let first_row = self.client.read_first_row()?;
        if first_row != header {
            self.client.write_first_row(&header)?;
        }

        if rows.is_empty() {
            return Ok(0);
        }
        let values: Vec<Vec<String>> = rows.iter().map(Operation::to_record).collect();
        self.client.append_rows(&values)
    }
}

impl OperationSink for SpreadsheetAppendSink {
    fn name(&self) -> &str {
        SPREADSHEET_SINK
    }

    fn replicate(&self, rows: &[Operation]) -> SinkOutcome {
        match self.write(rows) {
            Ok(written) => {
                log::info!("Appended {} rows to {}", written, self.client.target());
                SinkOutcome::succeeded(SPREADSHEET_SINK, written)
            }
            Err(e) => SinkOutcome::failed(
                SPREADSHEET_SINK,
                format!("{}: {}", self.client.target(), e),
            ),
        }
    }
}
