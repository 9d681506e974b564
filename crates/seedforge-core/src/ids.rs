use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Run-scoped, append-only store of generated identifiers per table.
///
/// Each table's identifier list is written exactly once, when the table
/// completes generation and persistence, and read by every table generating
/// in later levels. Level sequencing in the run engine is what makes the
/// single-writer rule hold without a lock: no table is read before it has
/// been fully written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdStore {
    tables: BTreeMap<String, Vec<Value>>,
}

impl IdStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the identifier list for a completed table. Write-once: a
    /// second insert for the same table is a caller bug and is rejected.
    pub fn insert(&mut self, table: &str, ids: Vec<Value>) -> Result<()> {
        if self.tables.contains_key(table) {
            return Err(Error::IdStore(format!(
                "identifiers for table '{table}' already recorded"
            )));
        }
        self.tables.insert(table.to_string(), ids);
        Ok(())
    }

    pub fn get(&self, table: &str) -> Option<&[Value]> {
        self.tables.get(table).map(Vec::as_slice)
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Read-only copy handed to generation contexts at level start.
    pub fn snapshot(&self) -> Self {
        self.clone()
    }
}
