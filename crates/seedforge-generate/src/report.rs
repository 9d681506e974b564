use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::orchestrator::GenerationSource;
use crate::resolver::IntegrityViolation;

/// Summary of one table's trip through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableReport {
    pub table: String,
    pub rows_requested: u64,
    pub rows_generated: u64,
    pub inserted: u64,
    pub failed: u64,
    pub retries: u64,
    pub source: GenerationSource,
}

/// Serializable report for a whole generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub tables: Vec<TableReport>,
    /// Cycles detected during ordering; generation proceeded best-effort.
    pub cycles: Vec<Vec<String>>,
    pub violations: Vec<IntegrityViolation>,
    pub warnings_by_code: BTreeMap<String, u64>,
    /// Non-fatal explanatory messages, e.g. conflict-skip notes from the sink.
    pub notes: Vec<String>,
    pub retries_total: u64,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn new(run_id: String) -> Self {
        Self {
            run_id,
            tables: Vec::new(),
            cycles: Vec::new(),
            violations: Vec::new(),
            warnings_by_code: BTreeMap::new(),
            notes: Vec::new(),
            retries_total: 0,
            duration_ms: 0,
        }
    }

    pub fn record_table(&mut self, table: TableReport) {
        self.retries_total += table.retries;
        self.tables.push(table);
    }

    pub fn record_warning(&mut self, code: &str) {
        *self.warnings_by_code.entry(code.to_string()).or_insert(0) += 1;
    }

    pub fn record_violation(&mut self, violation: IntegrityViolation) {
        self.record_warning("referential_integrity");
        self.violations.push(violation);
    }

    pub fn record_note(&mut self, note: String) {
        self.notes.push(note);
    }

    pub fn total_inserted(&self) -> u64 {
        self.tables.iter().map(|table| table.inserted).sum()
    }
}
