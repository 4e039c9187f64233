//! In-memory object store and spreadsheet
//!
//! Used by tests. Both can be told to fail on demand.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::domain::result::{Error, Result};
use crate::ports::{ObjectInfo, ObjectStore, SpreadsheetClient};

struct StoredObject {
    body: Vec<u8>,
    last_modified: DateTime<Utc>,
}

/// Object store backed by a sorted map
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    failing_keys: HashSet<String>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every `put` to `key`
    pub fn failing_on(mut self, key: &str) -> Self {
        self.failing_keys.insert(key.to_string());
        self
    }

    /// Store an object with an explicit modification time
    pub fn insert_at(&self, key: &str, body: &[u8], last_modified: DateTime<Utc>) {
        if let Ok(mut objects) = self.objects.lock() {
            objects.insert(
                key.to_string(),
                StoredObject {
                    body: body.to_vec(),
                    last_modified,
                },
            );
        }
    }

    pub fn len(&self) -> usize {
        self.objects.lock().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ObjectStore for MemoryObjectStore {
    fn location(&self) -> String {
        "memory://".to_string()
    }

    fn put(&self, key: &str, body: &[u8], _content_type: &str) -> Result<()> {
        if self.failing_keys.contains(key) {
            return Err(Error::object_store(format!("PUT {} rejected", key)));
        }
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| Error::object_store("memory store lock poisoned"))?;
        objects.insert(
            key.to_string(),
            StoredObject {
                body: body.to_vec(),
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let objects = self
            .objects
            .lock()
            .map_err(|_| Error::object_store("memory store lock poisoned"))?;
        Ok(objects.get(key).map(|o| o.body.clone()))
    }

    fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        let objects = self
            .objects
            .lock()
            .map_err(|_| Error::object_store("memory store lock poisoned"))?;
        Ok(objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, object)| ObjectInfo {
                key: key.clone(),
                last_modified: object.last_modified,
                size: object.body.len() as u64,
            })
            .collect())
    }
}

/// A single worksheet held in memory
pub struct MemorySpreadsheet {
    title: String,
    rows: Mutex<Vec<Vec<String>>>,
    failing: bool,
}

impl MemorySpreadsheet {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            rows: Mutex::new(Vec::new()),
            failing: false,
        }
    }

    /// Reject every call
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    /// Snapshot of all rows, header included
    pub fn rows(&self) -> Vec<Vec<String>> {
        self.rows.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn check(&self) -> Result<()> {
        if self.failing {
            Err(Error::spreadsheet(format!("{}: HTTP 403 Forbidden", self.title)))
        } else {
            Ok(())
        }
    }
}

impl SpreadsheetClient for MemorySpreadsheet {
    fn target(&self) -> String {
        format!("memory://{}", self.title)
    }

    fn ensure_sheet(&self) -> Result<()> {
        self.check()
    }

    fn read_first_row(&self) -> Result<Vec<String>> {
        self.check()?;
        Ok(self.rows().into_iter().next().unwrap_or_default())
    }

    fn write_first_row(&self, values: &[String]) -> Result<()> {
        self.check()?;
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| Error::spreadsheet("memory sheet lock poisoned"))?;
        if rows.is_empty() {
            rows.push(values.to_vec());
        } else {
            rows[0] = values.to_vec();
        }
        Ok(())
    }

    fn append_rows(&self, values: &[Vec<String>]) -> Result<usize> {
        self.check()?;
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| Error::spreadsheet("memory sheet lock poisoned"))?;
        rows.extend(values.iter().cloned());
        Ok(values.len())
    }
}
