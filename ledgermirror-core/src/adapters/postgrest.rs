//! PostgREST relational store (Supabase)
//!
//! Rows are upserted with `POST /rest/v1/<table>?on_conflict=operation_id`
//! and `Prefer: resolution=merge-duplicates`. The table is created through the
//! `exec_sql` RPC function when the project provides one.

use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};

use crate::adapters::duckdb::validate_table_name;
use crate::domain::result::{Error, Result};
use crate::domain::Operation;
use crate::ports::{RelationalStore, StoreStats};

#[derive(Debug, Serialize)]
struct UpsertRow<'a> {
    operation_id: &'a str,
    date_msk: &'a str,
    action: &'a str,
    /// Decimal text, null when the amount is not numeric
    amount: Option<String>,
    currency: &'a str,
    status: &'a str,
    description: &'a str,
    updated_at: &'a str,
}

#[derive(Debug, Deserialize)]
struct LatestRow {
    #[serde(default)]
    date_msk: Option<String>,
}

/// Supabase / PostgREST client bound to one table
pub struct PostgrestStore {
    client: Client,
    base_url: String,
    api_key: String,
    table: String,
    timeout_secs: u64,
}

impl PostgrestStore {
    pub fn new(base_url: &str, api_key: &str, table: &str, timeout_secs: u64) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::config("SUPABASE_KEY cannot be empty"));
        }
        validate_table_name(table)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Error::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            table: table.to_string(),
            timeout_secs,
        })
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (
                operation_id TEXT PRIMARY KEY,
                date_msk TEXT,
                action TEXT,
                amount NUMERIC(18, 2),
                currency TEXT,
                status TEXT,
                description TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );",
            self.table
        )
    }

    fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        let response = request.send().map_err(|e| {
            if e.is_timeout() {
                Error::database(format!(
                    "{}: timed out after {} seconds",
                    what, self.timeout_secs
                ))
            } else {
                Error::database(format!("{}: {}", what, e))
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(Error::database(format!(
            "{}: HTTP {} {}",
            what,
            status.as_u16(),
            body.trim()
        )))
    }
}

/// Total row count from a `Content-Range: 0-0/42` header
fn parse_content_range_total(value: &str) -> Option<i64> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}

impl RelationalStore for PostgrestStore {
    fn backend(&self) -> &str {
        "supabase"
    }

    fn ensure_table(&self) -> Result<()> {
        let request = self
            .authorized(self.client.post(format!("{}/rest/v1/rpc/exec_sql", self.base_url)))
            .json(&serde_json::json!({ "sql": self.create_table_sql() }));

        match self.send(request, "exec_sql") {
            Ok(_) => Ok(()),
            Err(Error::Database(msg)) if msg.contains("HTTP 404") => {
                // No exec_sql function in this project; the table is managed elsewhere
                log::warn!("exec_sql RPC not available, assuming {} exists", self.table);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Whole batch in a single request
    fn upsert_operations(&self, rows: &[Operation]) -> Result<usize> {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        let payload: Vec<UpsertRow<'_>> = rows
            .iter()
            .map(|row| UpsertRow {
                operation_id: &row.operation_id,
                date_msk: &row.timestamp_local,
                action: &row.category,
                amount: row.amount_decimal().map(|d| d.to_string()),
                currency: &row.currency,
                status: &row.status,
                description: &row.description,
                updated_at: &now,
            })
            .collect();

        let request = self
            .authorized(self.client.post(self.table_url()))
            .query(&[("on_conflict", "operation_id")])
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&payload);
        let response = self.send(request, "upsert")?;

        let returned: Vec<serde_json::Value> = response
            .json()
            .map_err(|e| Error::database(format!("upsert: invalid response: {}", e)))?;
        Ok(returned.len())
    }

    fn stats(&self) -> Result<StoreStats> {
        let request = self
            .authorized(self.client.get(self.table_url()))
            .query(&[
                ("select", "date_msk"),
                ("order", "date_msk.desc.nullslast"),
                ("limit", "1"),
            ])
            .header("Prefer", "count=exact");
        let response = self.send(request, "stats")?;

        let total_operations = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total)
            .unwrap_or(0);
        let latest: Vec<LatestRow> = response
            .json()
            .map_err(|e| Error::database(format!("stats: invalid response: {}", e)))?;

        Ok(StoreStats {
            total_operations,
            last_operation_at: latest.into_iter().next().and_then(|r| r.date_msk),
        })
    }
}
