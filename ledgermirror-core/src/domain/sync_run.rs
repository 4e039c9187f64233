//! Sync run bookkeeping: fetch windows, sink outcomes and the final report

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use super::operation::{Operation, RawOperation};

/// Half-open time window `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FetchWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl FetchWindow {
    /// Window ending at `now` and reaching `days_back` days into the past
    pub fn ending_at(now: DateTime<Utc>, days_back: u32) -> Self {
        Self {
            start: now - chrono::Duration::days(i64::from(days_back)),
            end: now,
        }
    }
}

/// Raw operations fetched for one account and window, in source order
#[derive(Debug, Clone)]
pub struct FetchedBatch {
    pub account_id: String,
    pub window: FetchWindow,
    pub operations: Vec<RawOperation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkStatus {
    Succeeded,
    /// Primary write succeeded, a secondary step (alias, pointer) did not
    Partial,
    Failed,
}

/// Result of handing a batch to one sink
#[derive(Debug, Clone, Serialize)]
pub struct SinkOutcome {
    pub sink: String,
    pub status: SinkStatus,
    pub written: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl SinkOutcome {
    pub fn succeeded(sink: impl Into<String>, written: usize) -> Self {
        Self {
            sink: sink.into(),
            status: SinkStatus::Succeeded,
            written,
            error: None,
            warnings: Vec::new(),
        }
    }

    pub fn failed(sink: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            sink: sink.into(),
            status: SinkStatus::Failed,
            written: 0,
            error: Some(error.into()),
            warnings: Vec::new(),
        }
    }

    /// Attach a warning; a succeeded outcome becomes partial
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        if self.status == SinkStatus::Succeeded {
            self.status = SinkStatus::Partial;
        }
        self
    }

    /// Attach a note that does not change the status
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.warnings.push(note.into());
        self
    }

    pub fn is_failed(&self) -> bool {
        self.status == SinkStatus::Failed
    }
}

/// Outcomes of one replication pass, in sink registration order
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReplicationReport {
    pub outcomes: Vec<SinkOutcome>,
}

impl ReplicationReport {
    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failed()).count()
    }

    pub fn outcome(&self, sink: &str) -> Option<&SinkOutcome> {
        self.outcomes.iter().find(|o| o.sink == sink)
    }

    /// Overall status given that the fetch succeeded
    pub fn run_status(&self) -> RunStatus {
        let failed = self.failed_count();
        if !self.outcomes.is_empty() && failed == self.outcomes.len() {
            RunStatus::Failed
        } else if failed > 0 {
            RunStatus::PartiallySucceeded
        } else {
            RunStatus::Succeeded
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    PartiallySucceeded,
    Failed,
}

/// Aggregates over the canonical rows of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunTotals {
    pub operations: usize,
    pub total_amount: Decimal,
    pub positive: usize,
    pub negative: usize,
    /// Rows whose amount could not be read as a decimal
    pub unparsed_amounts: usize,
}

impl RunTotals {
    pub fn from_rows(rows: &[Operation]) -> Self {
        let mut totals = Self {
            operations: rows.len(),
            ..Self::default()
        };
        for row in rows {
            match row.amount_decimal() {
                Some(amount) => {
                    totals.total_amount += amount;
                    if amount > Decimal::ZERO {
                        totals.positive += 1;
                    } else if amount < Decimal::ZERO {
                        totals.negative += 1;
                    }
                }
                None => totals.unparsed_amounts += 1,
            }
        }
        totals
    }
}

/// Final structured summary of a sync run
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<FetchWindow>,
    pub status: RunStatus,
    pub totals: RunTotals,
    pub sinks: Vec<SinkOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
