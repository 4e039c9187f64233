//! Relational store port

use serde::Serialize;

use crate::domain::result::Result;
use crate::domain::Operation;

/// Table summary used by status reporting
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub total_operations: i64,
    /// Most recent `date_msk` value
    pub last_operation_at: Option<String>,
}

/// Relational store keyed on `operation_id`
///
/// Implementations own the table definition; no migrations beyond
/// create-if-absent.
pub trait RelationalStore: Send + Sync {
    /// Human-readable backend name for reports
    fn backend(&self) -> &str;

    /// Create the operations table if it does not exist. Idempotent.
    fn ensure_table(&self) -> Result<()>;

    /// Insert new rows and overwrite non-key fields of existing ones.
    ///
    /// `rows` must not repeat an `operation_id`. Returns the number of rows
    /// accepted by the store.
    fn upsert_operations(&self, rows: &[Operation]) -> Result<usize>;

    /// Row count and latest timestamp
    fn stats(&self) -> Result<StoreStats>;
}
