//! Sink port - the single capability the replication coordinator relies on

use chrono::{DateTime, Utc};

use crate::domain::{Operation, SinkOutcome};

/// A destination that receives the canonical row batch
///
/// Implementations must not fail by panicking or by returning early: every
/// problem is folded into the returned `SinkOutcome`. Rows are shared
/// read-only between sinks.
pub trait OperationSink: Send + Sync {
    /// Stable sink name used in reports and logs
    fn name(&self) -> &str;

    /// Write the batch
    fn replicate(&self, rows: &[Operation]) -> SinkOutcome;

    /// Write the batch of a run that started at `started_at`
    fn replicate_at(&self, rows: &[Operation], _started_at: DateTime<Utc>) -> SinkOutcome {
        self.replicate(rows)
    }
}
