use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use seedforge_core::TableDefinition;

use crate::context::GenerationContext;
use crate::errors::GenerationError;
use crate::generator::{GeneratedRow, RowGenerator, extract_ids};

/// Tuning knobs for batched generation.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Maximum batches in flight per table at once.
    pub parallelism: usize,
    /// Delay before the single per-batch retry.
    pub retry_delay: Duration,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            parallelism: 4,
            retry_delay: Duration::from_millis(500),
        }
    }
}

/// Which generation path served a table. The fallback transition is part of
/// the outcome so callers and tests can assert on it instead of scraping
/// logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationSource {
    Primary,
    Fallback,
}

/// Rows, extracted identifiers, and provenance for one completed table.
#[derive(Debug, Clone)]
pub struct TableOutcome {
    pub table: String,
    pub rows: Vec<GeneratedRow>,
    pub ids: Vec<Value>,
    pub source: GenerationSource,
    pub retries: u64,
}

/// Complexity heuristic bounding a single generation request.
///
/// Wide tables get small batches to limit the blast radius of a failed
/// request and keep response sizes in check.
pub fn batch_size_for(definition: &TableDefinition) -> usize {
    match definition.fields.len() {
        count if count > 15 => 10,
        count if count >= 11 => 20,
        _ => 30,
    }
}

/// Split a requested count into consecutive batch sizes; the final batch
/// absorbs the remainder.
pub fn split_batches(count: usize, size: usize) -> Vec<usize> {
    let size = size.max(1);
    let mut batches = vec![size; count / size];
    if count % size > 0 {
        batches.push(count % size);
    }
    batches
}

async fn request_batch(
    generator: &dyn RowGenerator,
    ctx: &GenerationContext,
    count: usize,
) -> Result<Vec<GeneratedRow>, GenerationError> {
    let batch = generator.generate(ctx, count).await?;
    if batch.rows.is_empty() {
        return Err(GenerationError::EmptyBatch(ctx.table.clone()));
    }
    Ok(batch.rows)
}

/// One batch with its single retry. A second failure is fatal for this
/// batch only; siblings dispatched in the same chunk keep running.
async fn attempt_batch(
    generator: &dyn RowGenerator,
    ctx: &GenerationContext,
    count: usize,
    retry_delay: Duration,
) -> Result<(Vec<GeneratedRow>, u64), GenerationError> {
    match request_batch(generator, ctx, count).await {
        Ok(rows) => Ok((rows, 0)),
        Err(first) => {
            warn!(
                table = %ctx.table,
                batch_rows = count,
                error = %first,
                "batch failed, retrying once"
            );
            tokio::time::sleep(retry_delay).await;

            match request_batch(generator, ctx, count).await {
                Ok(rows) => Ok((rows, 1)),
                Err(second) => Err(GenerationError::BatchFailed {
                    table: ctx.table.clone(),
                    count,
                    reason: second.to_string(),
                }),
            }
        }
    }
}

/// Generate a table's rows in bounded-concurrency chunks of batches.
///
/// Chunks run strictly sequentially; within a chunk every batch is in
/// flight concurrently and the chunk fully resolves (success or exhausted
/// retry) before the first error, if any, propagates.
async fn generate_batched(
    generator: &dyn RowGenerator,
    ctx: &GenerationContext,
    options: &GenerateOptions,
) -> Result<(Vec<GeneratedRow>, u64), GenerationError> {
    let size = batch_size_for(&ctx.definition);
    let batches = split_batches(ctx.count, size);

    let mut rows = Vec::with_capacity(ctx.count);
    let mut retries = 0;

    for chunk in batches.chunks(options.parallelism.max(1)) {
        let inflight = chunk
            .iter()
            .map(|count| attempt_batch(generator, ctx, *count, options.retry_delay));
        let results = join_all(inflight).await;

        let mut chunk_error = None;
        for result in results {
            match result {
                Ok((batch_rows, batch_retries)) => {
                    rows.extend(batch_rows);
                    retries += batch_retries;
                }
                Err(err) => {
                    if chunk_error.is_none() {
                        chunk_error = Some(err);
                    }
                }
            }
        }
        if let Some(err) = chunk_error {
            return Err(err);
        }
    }

    if rows.is_empty() {
        return Err(GenerationError::EmptyBatch(ctx.table.clone()));
    }

    Ok((rows, retries))
}

/// Generate one table, falling back to the deterministic generator for the
/// entire requested count when the primary path is exhausted.
pub async fn generate_table(
    primary: &dyn RowGenerator,
    fallback: &dyn RowGenerator,
    ctx: &GenerationContext,
    options: &GenerateOptions,
) -> Result<TableOutcome, GenerationError> {
    match generate_batched(primary, ctx, options).await {
        Ok((rows, retries)) => {
            let ids = extract_ids(&rows, &ctx.definition);
            info!(
                table = %ctx.table,
                rows = rows.len(),
                retries,
                generator = primary.name(),
                "table generated"
            );
            Ok(TableOutcome {
                table: ctx.table.clone(),
                rows,
                ids,
                source: GenerationSource::Primary,
                retries,
            })
        }
        Err(err) => {
            warn!(
                table = %ctx.table,
                error = %err,
                generator = fallback.name(),
                "primary generation exhausted, switching to fallback"
            );

            match fallback.generate(ctx, ctx.count).await {
                Ok(batch) if !batch.rows.is_empty() => {
                    let ids = if batch.ids.is_empty() {
                        extract_ids(&batch.rows, &ctx.definition)
                    } else {
                        batch.ids
                    };
                    Ok(TableOutcome {
                        table: ctx.table.clone(),
                        rows: batch.rows,
                        ids,
                        source: GenerationSource::Fallback,
                        retries: 0,
                    })
                }
                Ok(_) => Err(GenerationError::Exhausted {
                    table: ctx.table.clone(),
                    reason: "fallback generator returned no rows".to_string(),
                }),
                Err(fallback_err) => Err(GenerationError::Exhausted {
                    table: ctx.table.clone(),
                    reason: fallback_err.to_string(),
                }),
            }
        }
    }
}

/// Generate every table of a dependency level fully in parallel.
///
/// Each table carries its own fallback transition; one table's failure
/// never blocks or discards a sibling's success. Only an exhausted table
/// (primary and fallback both failed) propagates, after the whole level has
/// resolved.
pub async fn generate_level(
    primary: &dyn RowGenerator,
    fallback: &dyn RowGenerator,
    contexts: &[GenerationContext],
    options: &GenerateOptions,
) -> Result<Vec<TableOutcome>, GenerationError> {
    let inflight = contexts
        .iter()
        .map(|ctx| generate_table(primary, fallback, ctx, options));
    join_all(inflight).await.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use seedforge_core::{FieldDefinition, FieldType};

    fn definition(field_count: usize) -> TableDefinition {
        TableDefinition {
            name: "sample".to_string(),
            fields: (0..field_count)
                .map(|index| FieldDefinition {
                    name: format!("field_{index}"),
                    field_type: FieldType::Text,
                    is_array: false,
                    is_required: false,
                    is_unique: false,
                    is_id: false,
                    has_default: false,
                    enum_name: None,
                    relation: None,
                })
                .collect(),
            primary_key: Vec::new(),
            unique_constraints: Vec::new(),
        }
    }

    #[test]
    fn batch_size_tracks_field_count() {
        assert_eq!(batch_size_for(&definition(16)), 10);
        assert_eq!(batch_size_for(&definition(15)), 20);
        assert_eq!(batch_size_for(&definition(11)), 20);
        assert_eq!(batch_size_for(&definition(10)), 30);
        assert_eq!(batch_size_for(&definition(1)), 30);
    }

    #[test]
    fn split_assigns_remainder_to_final_batch() {
        assert_eq!(split_batches(105, 20), vec![20, 20, 20, 20, 20, 5]);
        assert_eq!(split_batches(105, 30), vec![30, 30, 30, 15]);
        assert_eq!(split_batches(60, 20), vec![20, 20, 20]);
        assert_eq!(split_batches(10, 30), vec![10]);
        assert_eq!(split_batches(0, 30), Vec::<usize>::new());
    }
}
