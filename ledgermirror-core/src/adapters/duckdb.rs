//! DuckDB relational store
//!
//! Local single-file relational sink. The operations table is created on
//! demand and keyed on `operation_id`; upserts overwrite every non-key column
//! and refresh `updated_at` while `created_at` keeps the first insert time.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use duckdb::{params, Connection};
use regex::Regex;

use crate::domain::result::{Error, Result};
use crate::domain::Operation;
use crate::ports::{RelationalStore, StoreStats};

/// Default table name, shared with the PostgREST store
pub const DEFAULT_TABLE: &str = "tinkoff_operations";

/// Maximum number of retries when the database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

const TIMESTAMP_PARAM_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
        || lower.contains("could not set lock on file")
}

/// Reject anything that is not a plain SQL identifier
pub fn validate_table_name(table: &str) -> Result<()> {
    let pattern = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$")
        .map_err(|e| Error::Other(format!("identifier pattern: {}", e)))?;
    if pattern.is_match(table) {
        Ok(())
    } else {
        Err(Error::config(format!(
            "Invalid table name '{}': use letters, digits and underscores",
            table
        )))
    }
}

/// DuckDB-backed relational store
pub struct DuckDbRepository {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    table: String,
}

impl DuckDbRepository {
    /// Open (or create) the database file
    ///
    /// Retries with exponential backoff while another process holds the
    /// file lock.
    pub fn new(db_path: &Path, table: &str) -> Result<Self> {
        validate_table_name(table)?;
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut last_error = None;
        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: db_path.to_path_buf(),
                        table: table.to_string(),
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        log::warn!(
                            "Database busy, retrying in {}ms (attempt {}/{}): {}",
                            delay.as_millis(),
                            attempt + 1,
                            MAX_RETRIES,
                            err_msg
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::database(format!("Failed to open database after {} retries", MAX_RETRIES))
        }))
    }

    fn try_open_connection(db_path: &Path) -> Result<Connection> {
        // Extension autoloading stays off; nothing here needs extensions
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Connection::open_with_flags(db_path, config)?)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::database(format!("Lock poisoned: {}", e)))
    }

    /// All stored rows ordered by timestamp, then id
    pub fn get_operations(&self) -> Result<Vec<Operation>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT operation_id, date_msk, action, CAST(amount AS VARCHAR), currency, status, description
             FROM {} ORDER BY date_msk, operation_id",
            self.table
        ))?;

        let rows = stmt
            .query_map([], |row| {
                Ok(Operation {
                    operation_id: row.get(0)?,
                    timestamp_local: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    category: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    amount: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                    currency: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                    status: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                    description: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
                })
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// `(created_at, updated_at)` of one row, rendered as text
    pub fn get_timestamps(&self, operation_id: &str) -> Result<Option<(String, String)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT CAST(created_at AS VARCHAR), CAST(updated_at AS VARCHAR) FROM {} WHERE operation_id = ?",
            self.table
        ))?;
        let mut rows = stmt.query([operation_id])?;
        match rows.next()? {
            Some(row) => Ok(Some((row.get(0)?, row.get(1)?))),
            None => Ok(None),
        }
    }
}

impl RelationalStore for DuckDbRepository {
    fn backend(&self) -> &str {
        "duckdb"
    }

    fn ensure_table(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                operation_id VARCHAR PRIMARY KEY,
                date_msk VARCHAR,
                action VARCHAR,
                amount DECIMAL(18, 2),
                currency VARCHAR,
                status VARCHAR,
                description VARCHAR,
                created_at TIMESTAMP NOT NULL DEFAULT current_timestamp,
                updated_at TIMESTAMP NOT NULL DEFAULT current_timestamp
            );",
            self.table
        ))?;
        Ok(())
    }

    fn upsert_operations(&self, rows: &[Operation]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let now = Utc::now().naive_utc().format(TIMESTAMP_PARAM_FORMAT).to_string();
        let sql = format!(
            "INSERT INTO {table} (operation_id, date_msk, action, amount, currency, status, description,
                                  created_at, updated_at)
             VALUES (?, ?, ?, TRY_CAST(? AS DECIMAL(18, 2)), ?, ?, ?,
                     CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP))
             ON CONFLICT (operation_id) DO UPDATE SET
                date_msk = EXCLUDED.date_msk,
                action = EXCLUDED.action,
                amount = EXCLUDED.amount,
                currency = EXCLUDED.currency,
                status = EXCLUDED.status,
                description = EXCLUDED.description,
                updated_at = EXCLUDED.updated_at",
            table = self.table
        );

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in rows {
                stmt.execute(params![
                    &row.operation_id,
                    &row.timestamp_local,
                    &row.category,
                    &row.amount,
                    &row.currency,
                    &row.status,
                    &row.description,
                    &now,
                    &now,
                ])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn()?;
        let (total_operations, last_operation_at) = conn.query_row(
            &format!("SELECT COUNT(*), MAX(date_msk) FROM {}", self.table),
            [],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Option<String>>(1)?)),
        )?;
        Ok(StoreStats {
            total_operations,
            last_operation_at,
        })
    }
}
