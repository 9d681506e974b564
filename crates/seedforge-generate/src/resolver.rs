use std::fmt;
use std::sync::OnceLock;

use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use seedforge_core::{IdStore, TableDefinition};

use crate::generator::GeneratedRow;

/// Placeholder shape produced by generators for not-yet-known foreign keys:
/// `{{Table_n}}` with a 1-based index.
fn placeholder_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\{\{\s*(.+)_([0-9]+)\s*\}\}$").ok())
        .as_ref()
}

/// Rewrite foreign-key values in generated rows against the identifier
/// store.
///
/// Placeholders referencing a known table substitute the identifier at
/// their 1-based position. Afterwards every non-null foreign key is
/// membership-checked: a value absent from a non-empty candidate pool is
/// replaced with a uniformly-selected member, so any resolved key with an
/// available pool ends up referencing a row that exists. Null values pass
/// through untouched.
pub fn resolve_rows(
    mut rows: Vec<GeneratedRow>,
    definition: &TableDefinition,
    ids: &IdStore,
    rng: &mut impl Rng,
) -> Vec<GeneratedRow> {
    let targets = fk_targets(definition);
    if targets.is_empty() {
        return rows;
    }

    for row in &mut rows {
        for (field, related_table) in &targets {
            let Some(value) = row.get(field.as_str()) else {
                continue;
            };
            if value.is_null() {
                continue;
            }

            let mut resolved = substitute_placeholder(value, ids);

            if let Some(pool) = ids.get(related_table) {
                if !pool.is_empty() && !pool.iter().any(|known| fk_values_equal(known, &resolved)) {
                    resolved = pool[rng.random_range(0..pool.len())].clone();
                }
            }

            row.insert(field.clone(), resolved);
        }
    }

    rows
}

fn substitute_placeholder(value: &Value, ids: &IdStore) -> Value {
    let Some(text) = value.as_str() else {
        return value.clone();
    };
    let Some(captures) = placeholder_re().and_then(|re| re.captures(text)) else {
        return value.clone();
    };

    let table = &captures[1];
    let position: usize = match captures[2].parse() {
        Ok(position) => position,
        Err(_) => return value.clone(),
    };

    ids.get(table)
        .and_then(|pool| position.checked_sub(1).and_then(|index| pool.get(index)))
        .cloned()
        .unwrap_or_else(|| value.clone())
}

/// Loose equality for foreign-key membership: direct JSON equality, plus
/// numeric strings matching their number counterparts, since generators
/// routinely return "10" where the store holds 10.
fn fk_values_equal(left: &Value, right: &Value) -> bool {
    if left == right {
        return true;
    }
    match (left, right) {
        (Value::Number(number), Value::String(text))
        | (Value::String(text), Value::Number(number)) => text == &number.to_string(),
        _ => false,
    }
}

/// Second pass for self-referencing columns.
///
/// Self-edges are excluded from the dependency graph, so a generator cannot
/// see the owning table's identifiers: self-referencing fields arrive as
/// first-pass nulls (or stale placeholders). Once the table's own
/// identifier list is known, this pass fills them from that list, excluding
/// each row's own identifier so a row does not end up as its own parent. A
/// single-row table has no other candidate and keeps the null.
pub fn resolve_self_references(
    mut rows: Vec<GeneratedRow>,
    definition: &TableDefinition,
    own_ids: &[Value],
    rng: &mut impl Rng,
) -> Vec<GeneratedRow> {
    let self_fields: Vec<String> = definition
        .fk_fields()
        .filter_map(|field| {
            let relation = field.relation.as_ref()?;
            (relation.related_table == definition.name).then(|| relation.fk_field.clone())?
        })
        .collect();
    if self_fields.is_empty() || own_ids.is_empty() {
        return rows;
    }

    for (row_index, row) in rows.iter_mut().enumerate() {
        for field in &self_fields {
            let current = row.get(field.as_str());
            let already_valid = current
                .map(|value| {
                    !value.is_null() && own_ids.iter().any(|known| fk_values_equal(known, value))
                })
                .unwrap_or(false);
            if already_valid {
                continue;
            }

            let candidates: Vec<&Value> = own_ids
                .iter()
                .enumerate()
                .filter_map(|(index, id)| (index != row_index).then_some(id))
                .collect();
            if candidates.is_empty() {
                continue;
            }
            let pick = candidates[rng.random_range(0..candidates.len())].clone();
            row.insert(field.clone(), pick);
        }
    }

    rows
}

/// Category of a referential-integrity finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// The related table has no known identifiers at all.
    UnknownParent,
    /// The value is absent from the related table's identifier list.
    MissingIdentifier,
}

/// Advisory referential-integrity finding. Produced by [`validate_rows`],
/// never thrown; the calling layer decides severity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityViolation {
    pub table: String,
    pub field: String,
    pub row_index: usize,
    pub value: Value,
    pub related_table: String,
    pub kind: ViolationKind,
}

impl fmt::Display for IntegrityViolation {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ViolationKind::UnknownParent => write!(
                formatter,
                "{}.{} row {}: no identifiers known for referenced table '{}'",
                self.table, self.field, self.row_index, self.related_table
            ),
            ViolationKind::MissingIdentifier => write!(
                formatter,
                "{}.{} row {}: value {} not found among '{}' identifiers",
                self.table, self.field, self.row_index, self.value, self.related_table
            ),
        }
    }
}

/// Non-mutating referential check over resolved rows.
///
/// Null values on nullable relations are respected and skipped. Everything
/// else is checked against the identifier store and reported; this function
/// never fails.
pub fn validate_rows(
    rows: &[GeneratedRow],
    definition: &TableDefinition,
    ids: &IdStore,
) -> Vec<IntegrityViolation> {
    let mut violations = Vec::new();

    for field in definition.fk_fields() {
        let Some(relation) = field.relation.as_ref() else {
            continue;
        };
        let Some(fk_field) = relation.fk_field.as_deref() else {
            continue;
        };
        let pool = ids.get(&relation.related_table);

        for (row_index, row) in rows.iter().enumerate() {
            let value = row.get(fk_field).cloned().unwrap_or(Value::Null);
            if value.is_null() && relation.nullable {
                continue;
            }

            match pool {
                None => violations.push(IntegrityViolation {
                    table: definition.name.clone(),
                    field: fk_field.to_string(),
                    row_index,
                    value,
                    related_table: relation.related_table.clone(),
                    kind: ViolationKind::UnknownParent,
                }),
                Some(pool) if pool.is_empty() => violations.push(IntegrityViolation {
                    table: definition.name.clone(),
                    field: fk_field.to_string(),
                    row_index,
                    value,
                    related_table: relation.related_table.clone(),
                    kind: ViolationKind::UnknownParent,
                }),
                Some(pool) => {
                    if !pool.iter().any(|known| fk_values_equal(known, &value)) {
                        violations.push(IntegrityViolation {
                            table: definition.name.clone(),
                            field: fk_field.to_string(),
                            row_index,
                            value,
                            related_table: relation.related_table.clone(),
                            kind: ViolationKind::MissingIdentifier,
                        });
                    }
                }
            }
        }
    }

    violations
}

fn fk_targets(definition: &TableDefinition) -> Vec<(String, String)> {
    definition
        .fk_fields()
        .filter_map(|field| {
            let relation = field.relation.as_ref()?;
            Some((relation.fk_field.clone()?, relation.related_table.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use seedforge_core::{FieldDefinition, FieldType, RelationInfo, RelationKind};
    use serde_json::json;

    fn fk_table(nullable: bool) -> TableDefinition {
        TableDefinition {
            name: "post".to_string(),
            fields: vec![FieldDefinition {
                name: "user_id".to_string(),
                field_type: FieldType::Integer,
                is_array: false,
                is_required: !nullable,
                is_unique: false,
                is_id: false,
                has_default: false,
                enum_name: None,
                relation: Some(RelationInfo {
                    kind: RelationKind::ManyToOne,
                    related_table: "user".to_string(),
                    fk_field: Some("user_id".to_string()),
                    references_field: Some("id".to_string()),
                    nullable,
                }),
            }],
            primary_key: Vec::new(),
            unique_constraints: Vec::new(),
        }
    }

    fn row(value: Value) -> GeneratedRow {
        let mut row = GeneratedRow::new();
        row.insert("user_id".to_string(), value);
        row
    }

    fn user_ids() -> IdStore {
        let mut ids = IdStore::new();
        ids.insert("user", vec![json!(10), json!(20), json!(30)])
            .expect("insert");
        ids
    }

    #[test]
    fn placeholder_resolves_by_position() {
        let ids = user_ids();
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        let resolved = resolve_rows(vec![row(json!("{{user_2}}"))], &fk_table(false), &ids, &mut rng);
        assert_eq!(resolved[0].get("user_id"), Some(&json!(20)));
    }

    #[test]
    fn unknown_value_repaired_from_pool() {
        let ids = user_ids();
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        let resolved = resolve_rows(vec![row(json!(999))], &fk_table(false), &ids, &mut rng);
        let value = resolved[0].get("user_id").expect("present");
        assert!([json!(10), json!(20), json!(30)].contains(value));
    }

    #[test]
    fn null_passes_through() {
        let ids = user_ids();
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        let resolved = resolve_rows(vec![row(Value::Null)], &fk_table(true), &ids, &mut rng);
        assert_eq!(resolved[0].get("user_id"), Some(&Value::Null));
    }

    #[test]
    fn numeric_string_counts_as_member() {
        let ids = user_ids();
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        let resolved = resolve_rows(vec![row(json!("20"))], &fk_table(false), &ids, &mut rng);
        // Already a member under loose equality, so the value is kept.
        assert_eq!(resolved[0].get("user_id"), Some(&json!("20")));
    }

    #[test]
    fn placeholder_with_underscored_table_name() {
        let mut ids = IdStore::new();
        ids.insert("order_item", vec![json!(5), json!(6)])
            .expect("insert");

        let substituted = substitute_placeholder(&json!("{{order_item_1}}"), &ids);
        assert_eq!(substituted, json!(5));
    }

    #[test]
    fn validation_reports_missing_members() {
        let ids = user_ids();
        let rows = vec![row(json!(20)), row(json!(999)), row(Value::Null)];

        let violations = validate_rows(&rows, &fk_table(false), &ids);
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].row_index, 1);
        assert_eq!(violations[0].kind, ViolationKind::MissingIdentifier);
        // Null on a required relation is also not a known identifier.
        assert_eq!(violations[1].row_index, 2);
    }

    #[test]
    fn validation_skips_null_on_nullable() {
        let ids = user_ids();
        let rows = vec![row(Value::Null)];
        assert!(validate_rows(&rows, &fk_table(true), &ids).is_empty());
    }

    fn self_ref_table() -> TableDefinition {
        TableDefinition {
            name: "employee".to_string(),
            fields: vec![FieldDefinition {
                name: "manager_id".to_string(),
                field_type: FieldType::Integer,
                is_array: false,
                is_required: false,
                is_unique: false,
                is_id: false,
                has_default: false,
                enum_name: None,
                relation: Some(RelationInfo {
                    kind: RelationKind::ManyToOne,
                    related_table: "employee".to_string(),
                    fk_field: Some("manager_id".to_string()),
                    references_field: Some("id".to_string()),
                    nullable: true,
                }),
            }],
            primary_key: Vec::new(),
            unique_constraints: Vec::new(),
        }
    }

    fn manager_row(value: Value) -> GeneratedRow {
        let mut row = GeneratedRow::new();
        row.insert("manager_id".to_string(), value);
        row
    }

    #[test]
    fn self_references_fill_from_own_ids_without_self_loops() {
        let definition = self_ref_table();
        let own_ids = vec![json!(1), json!(2), json!(3)];
        let rows = vec![
            manager_row(Value::Null),
            manager_row(json!("{{employee_9}}")),
            manager_row(Value::Null),
        ];
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        let resolved = resolve_self_references(rows, &definition, &own_ids, &mut rng);
        for (index, row) in resolved.iter().enumerate() {
            let value = row.get("manager_id").expect("present");
            assert!(own_ids.contains(value), "not a member: {value}");
            assert_ne!(value, &own_ids[index], "row references itself");
        }
    }

    #[test]
    fn single_row_self_reference_stays_null() {
        let definition = self_ref_table();
        let own_ids = vec![json!(1)];
        let rows = vec![manager_row(Value::Null)];
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        let resolved = resolve_self_references(rows, &definition, &own_ids, &mut rng);
        assert_eq!(resolved[0].get("manager_id"), Some(&Value::Null));
    }

    #[test]
    fn validation_flags_unknown_parent() {
        let rows = vec![row(json!(1))];
        let violations = validate_rows(&rows, &fk_table(false), &IdStore::new());
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::UnknownParent);
    }
}
