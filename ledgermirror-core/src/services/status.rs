//! Status service - relational store summary

use std::sync::Arc;

use serde::Serialize;

use crate::domain::result::{Error, Result};
use crate::ports::RelationalStore;

/// Status service over the configured relational store
pub struct StatusService {
    store: Option<Arc<dyn RelationalStore>>,
}

impl StatusService {
    pub fn new(store: Option<Arc<dyn RelationalStore>>) -> Self {
        Self { store }
    }

    /// Get stored operation count and the latest operation time
    pub fn get_status(&self) -> Result<StatusSummary> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| Error::config("No relational store configured"))?;
        let stats = store.stats()?;

        Ok(StatusSummary {
            backend: store.backend().to_string(),
            total_operations: stats.total_operations,
            last_operation_at: stats.last_operation_at,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct StatusSummary {
    pub backend: String,
    pub total_operations: i64,
    pub last_operation_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::duckdb::{DuckDbRepository, DEFAULT_TABLE};
    use crate::domain::Operation;
    use tempfile::TempDir;

    fn row(id: &str, date: &str) -> Operation {
        Operation {
            operation_id: id.to_string(),
            timestamp_local: date.to_string(),
            category: "Выплата дивидендов".to_string(),
            amount: "12.34".to_string(),
            currency: "rub".to_string(),
            status: "Проведена".to_string(),
            description: String::new(),
        }
    }

    #[test]
    fn test_status_without_store() {
        let service = StatusService::new(None);
        let err = service.get_status().unwrap_err();
        assert!(err.is_precondition());
    }

    #[test]
    fn test_status_counts_rows() {
        let dir = TempDir::new().unwrap();
        let repo = DuckDbRepository::new(&dir.path().join("ops.duckdb"), DEFAULT_TABLE).unwrap();
        repo.ensure_table().unwrap();
        repo.upsert_operations(&[
            row("1", "2024-03-01 13:15:30"),
            row("2", "2024-03-05 09:00:00"),
        ])
        .unwrap();

        let service = StatusService::new(Some(Arc::new(repo)));
        let status = service.get_status().unwrap();
        assert_eq!(status.backend, "duckdb");
        assert_eq!(status.total_operations, 2);
        assert_eq!(status.last_operation_at.as_deref(), Some("2024-03-05 09:00:00"));
    }
}
