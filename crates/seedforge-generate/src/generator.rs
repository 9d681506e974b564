use serde_json::{Map, Value};

use seedforge_core::TableDefinition;

use crate::context::GenerationContext;
use crate::errors::GenerationError;

/// A generated row: an open field-name to value mapping. No shape guarantee
/// until it has passed through the resolver and validator.
pub type GeneratedRow = Map<String, Value>;

/// Rows plus the identifier sequence extracted from them.
#[derive(Debug, Clone, Default)]
pub struct GeneratedBatch {
    pub rows: Vec<GeneratedRow>,
    pub ids: Vec<Value>,
}

/// Pluggable row-generation capability.
///
/// Implementations may fail (network, malformed response) and must tolerate
/// many concurrent invocations with independent contexts. Returning zero
/// rows is reported as [`GenerationError::EmptyBatch`] by the orchestrator,
/// never treated as a degenerate success.
#[async_trait::async_trait]
pub trait RowGenerator: Send + Sync {
    async fn generate(
        &self,
        ctx: &GenerationContext,
        count: usize,
    ) -> Result<GeneratedBatch, GenerationError>;

    fn name(&self) -> &'static str;
}

/// Project the identifier sequence out of generated rows.
///
/// Single identifier field: direct projection of its values. Composite
/// identifier: one JSON object per row keyed by field name, in declaration
/// order. No identifier field at all: sequential integers starting at 1.
pub fn extract_ids(rows: &[GeneratedRow], definition: &TableDefinition) -> Vec<Value> {
    let id_fields = definition.id_fields();

    match id_fields.len() {
        0 => (1..=rows.len() as i64).map(Value::from).collect(),
        1 => {
            let name = id_fields[0].name.as_str();
            rows.iter()
                .map(|row| row.get(name).cloned().unwrap_or(Value::Null))
                .collect()
        }
        _ => rows
            .iter()
            .map(|row| {
                let mut composite = Map::new();
                for field in &id_fields {
                    composite.insert(
                        field.name.clone(),
                        row.get(&field.name).cloned().unwrap_or(Value::Null),
                    );
                }
                Value::Object(composite)
            })
            .collect(),
    }
}
