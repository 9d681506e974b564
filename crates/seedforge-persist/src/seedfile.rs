use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::info;

use seedforge_core::TableDefinition;
use seedforge_generate::{GeneratedRow, GenerationError, SeedSink, SinkReport};

use crate::error::PersistError;

/// Dry-run sink: captures resolved rows per table and writes them as one
/// JSON document instead of touching a database.
///
/// Returns no identifiers, so the engine keeps the generator-extracted ones
/// and foreign-key resolution across levels still works.
#[derive(Debug)]
pub struct SeedFileSink {
    path: PathBuf,
    tables: Mutex<BTreeMap<String, Vec<GeneratedRow>>>,
}

impl SeedFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            tables: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write everything captured so far. Called once at the end of a run.
    pub fn write(&self) -> Result<(), PersistError> {
        let tables = self
            .tables
            .lock()
            .map_err(|_| PersistError::Unsupported("seed sink lock poisoned".to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, serde_json::to_vec_pretty(&*tables)?)?;

        info!(
            path = %self.path.display(),
            tables = tables.len(),
            "seed file written"
        );
        Ok(())
    }
}

#[async_trait::async_trait]
impl SeedSink for SeedFileSink {
    async fn persist_table(
        &self,
        definition: &TableDefinition,
        rows: &[GeneratedRow],
    ) -> Result<SinkReport, GenerationError> {
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| GenerationError::Sink("seed sink lock poisoned".to_string()))?;
        tables.insert(definition.name.clone(), rows.to_vec());

        Ok(SinkReport {
            inserted: rows.len() as u64,
            failed: 0,
            messages: Vec::new(),
            ids: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seedforge_core::{FieldDefinition, FieldType};
    use serde_json::json;

    fn definition(name: &str) -> TableDefinition {
        TableDefinition {
            name: name.to_string(),
            fields: vec![FieldDefinition {
                name: "label".to_string(),
                field_type: FieldType::Text,
                is_array: false,
                is_required: true,
                is_unique: false,
                is_id: false,
                has_default: false,
                enum_name: None,
                relation: None,
            }],
            primary_key: Vec::new(),
            unique_constraints: Vec::new(),
        }
    }

    #[tokio::test]
    async fn captures_tables_and_writes_one_document() {
        let dir = std::env::temp_dir().join(format!("seedforge-test-{}", std::process::id()));
        let path = dir.join("seed_data.json");
        let sink = SeedFileSink::new(&path);

        let mut row = GeneratedRow::new();
        row.insert("label".to_string(), json!("hello"));

        let report = sink
            .persist_table(&definition("greeting"), &[row])
            .await
            .expect("persist");
        assert_eq!(report.inserted, 1);
        assert!(report.ids.is_empty());

        sink.write().expect("write");
        let raw = std::fs::read_to_string(&path).expect("read back");
        let document: BTreeMap<String, Vec<GeneratedRow>> =
            serde_json::from_str(&raw).expect("parse");
        assert_eq!(document.len(), 1);
        assert_eq!(document["greeting"][0]["label"], json!("hello"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
