//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - Tinkoff Invest REST gateway and a demo feed for OperationSource
//! - S3, a local directory and memory for ObjectStore
//! - DuckDB and PostgREST for RelationalStore
//! - Google Sheets and memory for SpreadsheetClient

pub mod demo;
pub mod duckdb;
pub mod local_store;
pub mod memory;
pub mod postgrest;
pub mod s3;
pub mod sheets;
pub mod tinkoff;

#[cfg(test)]
pub mod mock_http;
