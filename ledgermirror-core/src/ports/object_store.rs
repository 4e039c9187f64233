//! Object storage port (S3-compatible semantics)

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::result::Result;

/// Listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectInfo {
    pub key: String,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
}

/// Flat key/value object storage
pub trait ObjectStore: Send + Sync {
    /// Human-readable location (bucket URL, directory) for reports
    fn location(&self) -> String;

    /// Create or overwrite an object
    fn put(&self, key: &str, body: &[u8], content_type: &str) -> Result<()>;

    /// Fetch an object, `None` if the key does not exist
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// List every object whose key starts with `prefix`
    fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>>;
}
