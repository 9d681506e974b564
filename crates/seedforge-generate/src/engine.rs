use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use seedforge_core::{
    IdStore, ParsedSchema, TableDefinition, build_graph, group_by_level, topological_sort,
};

use crate::context::GenerationContext;
use crate::errors::GenerationError;
use crate::generator::{GeneratedRow, RowGenerator};
use crate::orchestrator::{GenerateOptions, generate_level};
use crate::pattern::hash_seed;
use crate::report::{RunReport, TableReport};
use crate::resolver::{resolve_rows, resolve_self_references, validate_rows};

/// Per-table persistence outcome reported by a sink.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SinkReport {
    pub inserted: u64,
    /// Rows not persisted (e.g. skipped by a uniqueness conflict); counted
    /// with an explanatory message, never an error.
    pub failed: u64,
    pub messages: Vec<String>,
    /// Identifiers confirmed by the sink. Empty when the sink cannot
    /// harvest them; the engine then keeps the generator-extracted ids.
    pub ids: Vec<Value>,
}

/// Destination for accepted rows: a database, a seed file, a test buffer.
#[async_trait::async_trait]
pub trait SeedSink: Send + Sync {
    async fn persist_table(
        &self,
        definition: &TableDefinition,
        rows: &[GeneratedRow],
    ) -> Result<SinkReport, GenerationError>;
}

/// Options for a whole generation run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Row count for tables without an explicit request.
    pub default_rows: u64,
    /// Explicit per-table row counts. When empty, every table gets
    /// `default_rows`.
    pub rows_by_table: BTreeMap<String, u64>,
    pub generate: GenerateOptions,
    /// Run seed driving fallback generation and random FK repair.
    pub seed: u64,
    /// Optional per-table steering text passed through to generators.
    pub instructions: BTreeMap<String, String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            default_rows: 10,
            rows_by_table: BTreeMap::new(),
            generate: GenerateOptions::default(),
            seed: 0x5eed,
            instructions: BTreeMap::new(),
        }
    }
}

/// Outcome of a run: the report plus the final identifier store.
#[derive(Debug)]
pub struct RunResult {
    pub report: RunReport,
    pub ids: IdStore,
}

/// Complete requested counts by walking foreign-key parents.
///
/// A parent without an explicit count inherits its child's count, so no
/// generated table ends up referencing an empty parent. An empty request
/// means "everything": every table gets `default_rows`.
pub fn plan_counts(
    tables: &[TableDefinition],
    requested: &BTreeMap<String, u64>,
    default_rows: u64,
) -> BTreeMap<String, u64> {
    let known: BTreeSet<&str> = tables.iter().map(|table| table.name.as_str()).collect();

    if requested.is_empty() {
        return known
            .iter()
            .map(|name| (name.to_string(), default_rows))
            .collect();
    }

    let mut counts: BTreeMap<String, u64> = requested
        .iter()
        .filter(|(name, _)| known.contains(name.as_str()))
        .map(|(name, rows)| (name.clone(), *rows))
        .collect();

    let mut queue: VecDeque<String> = counts.keys().cloned().collect();
    while let Some(child) = queue.pop_front() {
        let child_rows = counts.get(&child).copied().unwrap_or(default_rows);
        let Some(definition) = tables.iter().find(|table| table.name == child) else {
            continue;
        };

        for field in definition.fk_fields() {
            let Some(relation) = field.relation.as_ref() else {
                continue;
            };
            let parent = relation.related_table.as_str();
            if parent == child || !known.contains(parent) || counts.contains_key(parent) {
                continue;
            }
            counts.insert(parent.to_string(), child_rows);
            queue.push_back(parent.to_string());
        }
    }

    counts
}

/// Level-driven run engine: the whole-run entry point over the lower-level
/// primitives (`build_graph`, `topological_sort`, `group_by_level`,
/// `generate_level`, `resolve_rows`/`validate_rows`, sink persistence).
pub struct Engine {
    primary: Arc<dyn RowGenerator>,
    fallback: Arc<dyn RowGenerator>,
    options: RunOptions,
}

impl Engine {
    pub fn new(
        primary: Arc<dyn RowGenerator>,
        fallback: Arc<dyn RowGenerator>,
        options: RunOptions,
    ) -> Self {
        Self {
            primary,
            fallback,
            options,
        }
    }

    pub async fn run(
        &self,
        schema: &ParsedSchema,
        sink: &dyn SeedSink,
    ) -> Result<RunResult, GenerationError> {
        let start = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let mut report = RunReport::new(run_id.clone());

        let counts = plan_counts(
            &schema.tables,
            &self.options.rows_by_table,
            self.options.default_rows,
        );
        let graph = build_graph(&schema.tables);
        let topo = topological_sort(&graph);
        if topo.has_cycles() {
            for cycle in &topo.cycles {
                warn!(
                    cycle = cycle.join(" -> "),
                    "dependency cycle detected; foreign keys inside it are not guaranteed"
                );
                report.record_warning("cycle_detected");
            }
            report.cycles = topo.cycles.clone();
        }
        let levels = group_by_level(&graph);

        info!(
            run_id = %run_id,
            tables = counts.len(),
            levels = levels.len(),
            "generation run started"
        );

        let mut store = IdStore::new();

        for (level_index, level) in levels.iter().enumerate() {
            let contexts: Vec<GenerationContext> = level
                .iter()
                .filter_map(|name| {
                    let rows = counts.get(name).copied().unwrap_or(0);
                    if rows == 0 {
                        return None;
                    }
                    let definition = schema.table(name)?.clone();
                    Some(GenerationContext::new(
                        definition,
                        rows as usize,
                        schema.enums.clone(),
                        self.options.instructions.get(name).cloned(),
                        &store,
                    ))
                })
                .collect();

            if contexts.is_empty() {
                continue;
            }

            info!(
                level = level_index,
                tables = contexts.len(),
                "generating level"
            );

            let outcomes = generate_level(
                &*self.primary,
                &*self.fallback,
                &contexts,
                &self.options.generate,
            )
            .await?;

            // Level barrier: every table of this level resolves, validates,
            // persists, and publishes its identifiers before the next level
            // builds its contexts.
            for outcome in outcomes {
                let Some(ctx) = contexts.iter().find(|ctx| ctx.table == outcome.table) else {
                    continue;
                };

                let mut rng = ChaCha8Rng::seed_from_u64(hash_seed(self.options.seed, &outcome.table));
                let rows = resolve_rows(outcome.rows, &ctx.definition, &store, &mut rng);
                // Second pass for self-references, now that this table's own
                // identifier list is known.
                let rows =
                    resolve_self_references(rows, &ctx.definition, &outcome.ids, &mut rng);

                // Validate against a store that already sees this table's
                // identifiers, so self-references check like any other key.
                let mut check_store = store.snapshot();
                check_store.insert(&outcome.table, outcome.ids.clone())?;
                let violations = validate_rows(&rows, &ctx.definition, &check_store);
                if !violations.is_empty() {
                    warn!(
                        table = %outcome.table,
                        violations = violations.len(),
                        "referential integrity violations recorded"
                    );
                    for violation in violations {
                        report.record_violation(violation);
                    }
                }

                let sink_report = sink.persist_table(&ctx.definition, &rows).await?;
                for message in &sink_report.messages {
                    report.record_note(message.clone());
                }

                let ids = if sink_report.ids.is_empty() {
                    outcome.ids
                } else {
                    sink_report.ids
                };
                store.insert(&outcome.table, ids)?;

                report.record_table(TableReport {
                    table: outcome.table,
                    rows_requested: ctx.count as u64,
                    rows_generated: rows.len() as u64,
                    inserted: sink_report.inserted,
                    failed: sink_report.failed,
                    retries: outcome.retries,
                    source: outcome.source,
                });
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            run_id = %run_id,
            tables = report.tables.len(),
            inserted = report.total_inserted(),
            duration_ms = report.duration_ms,
            "generation run completed"
        );

        Ok(RunResult { report, ids: store })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seedforge_core::{FieldDefinition, FieldType, RelationInfo, RelationKind};

    fn table(name: &str, deps: &[&str]) -> TableDefinition {
        let mut fields = vec![FieldDefinition {
            name: "id".to_string(),
            field_type: FieldType::Integer,
            is_array: false,
            is_required: true,
            is_unique: true,
            is_id: true,
            has_default: true,
            enum_name: None,
            relation: None,
        }];
        for dep in deps {
            fields.push(FieldDefinition {
                name: format!("{dep}_id"),
                field_type: FieldType::Integer,
                is_array: false,
                is_required: true,
                is_unique: false,
                is_id: false,
                has_default: false,
                enum_name: None,
                relation: Some(RelationInfo {
                    kind: RelationKind::ManyToOne,
                    related_table: dep.to_string(),
                    fk_field: Some(format!("{dep}_id")),
                    references_field: Some("id".to_string()),
                    nullable: false,
                }),
            });
        }
        TableDefinition {
            name: name.to_string(),
            fields,
            primary_key: vec!["id".to_string()],
            unique_constraints: Vec::new(),
        }
    }

    #[test]
    fn empty_request_plans_every_table() {
        let tables = vec![table("user", &[]), table("post", &["user"])];
        let counts = plan_counts(&tables, &BTreeMap::new(), 7);
        assert_eq!(counts.get("user"), Some(&7));
        assert_eq!(counts.get("post"), Some(&7));
    }

    #[test]
    fn parents_inherit_child_counts() {
        let tables = vec![
            table("user", &[]),
            table("post", &["user"]),
            table("comment", &["post"]),
        ];
        let mut requested = BTreeMap::new();
        requested.insert("comment".to_string(), 25_u64);

        let counts = plan_counts(&tables, &requested, 10);
        assert_eq!(counts.get("comment"), Some(&25));
        assert_eq!(counts.get("post"), Some(&25));
        assert_eq!(counts.get("user"), Some(&25));
    }

    #[test]
    fn explicit_counts_win_over_inheritance() {
        let tables = vec![table("user", &[]), table("post", &["user"])];
        let mut requested = BTreeMap::new();
        requested.insert("post".to_string(), 50_u64);
        requested.insert("user".to_string(), 5_u64);

        let counts = plan_counts(&tables, &requested, 10);
        assert_eq!(counts.get("user"), Some(&5));
        assert_eq!(counts.get("post"), Some(&50));
    }

    #[test]
    fn unknown_tables_in_request_are_dropped() {
        let tables = vec![table("user", &[])];
        let mut requested = BTreeMap::new();
        requested.insert("ghost".to_string(), 9_u64);
        requested.insert("user".to_string(), 3_u64);

        let counts = plan_counts(&tables, &requested, 10);
        assert_eq!(counts.len(), 1);
        assert_eq!(counts.get("user"), Some(&3));
    }
}
