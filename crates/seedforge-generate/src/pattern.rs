use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::{Map, Value};

use seedforge_core::{FieldDefinition, FieldType};

use crate::context::GenerationContext;
use crate::errors::GenerationError;
use crate::generator::{GeneratedBatch, GeneratedRow, RowGenerator, extract_ids};

const FIRST_NAMES: &[&str] = &[
    "Alice", "Bruno", "Carla", "Diego", "Elena", "Felipe", "Gabriela", "Henrique", "Irene", "Joao",
];
const LAST_NAMES: &[&str] = &[
    "Almeida", "Barbosa", "Costa", "Duarte", "Ferreira", "Gomes", "Lima", "Moreira", "Silva",
    "Teixeira",
];
const WORDS: &[&str] = &[
    "alpha", "bravo", "cedar", "delta", "ember", "fjord", "glade", "harbor", "iris", "juniper",
    "kelp", "lumen", "meadow", "nectar", "onyx", "prairie",
];

/// Deterministic, field-pattern driven row generator.
///
/// Serves as the always-available fallback path and as a standalone primary
/// generator for offline runs. Values derive from field names where a
/// pattern matches and from the scalar type otherwise; foreign-key fields
/// emit `{{Table_n}}` placeholders so resolution follows the same path as
/// any other generator. Output is a pure function of (seed, table, count).
#[derive(Debug, Clone)]
pub struct PatternGenerator {
    seed: u64,
}

impl PatternGenerator {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }
}

impl Default for PatternGenerator {
    fn default() -> Self {
        Self::new(0x5eed)
    }
}

#[async_trait::async_trait]
impl RowGenerator for PatternGenerator {
    async fn generate(
        &self,
        ctx: &GenerationContext,
        count: usize,
    ) -> Result<GeneratedBatch, GenerationError> {
        let mut rng = ChaCha8Rng::seed_from_u64(hash_seed(self.seed, &ctx.table));
        let base_date = base_date();

        let rows: Vec<GeneratedRow> = (0..count)
            .map(|index| build_row(ctx, index, base_date, &mut rng))
            .collect();
        let ids = extract_ids(&rows, &ctx.definition);

        Ok(GeneratedBatch { rows, ids })
    }

    fn name(&self) -> &'static str {
        "pattern"
    }
}

fn build_row(
    ctx: &GenerationContext,
    index: usize,
    base_date: NaiveDate,
    rng: &mut ChaCha8Rng,
) -> GeneratedRow {
    let mut row = Map::new();

    for field in &ctx.definition.fields {
        let value = if let Some(target) = ctx.relation_for(&field.name) {
            foreign_key_value(ctx, target.nullable, &target.related_table, rng)
        } else if field.is_id || field.is_unique {
            unique_value(field, index, base_date)
        } else if field.is_array {
            let len = rng.random_range(1..=3);
            let items = (0..len)
                .map(|offset| scalar_value(ctx, field, index + offset, base_date, rng))
                .collect();
            Value::Array(items)
        } else {
            scalar_value(ctx, field, index, base_date, rng)
        };
        row.insert(field.name.clone(), value);
    }

    row
}

fn foreign_key_value(
    ctx: &GenerationContext,
    nullable: bool,
    related_table: &str,
    rng: &mut ChaCha8Rng,
) -> Value {
    match ctx.known_ids.get(related_table) {
        Some(pool) if !pool.is_empty() => {
            let position = rng.random_range(1..=pool.len());
            Value::String(format!("{{{{{related_table}_{position}}}}}"))
        }
        // Parent not generated yet (same level or cycle). Nullable fields
        // take the first-pass-null strategy; required ones keep a
        // placeholder for the validator to flag.
        _ if nullable => Value::Null,
        _ => {
            let position = rng.random_range(1..=ctx.count.max(1));
            Value::String(format!("{{{{{related_table}_{position}}}}}"))
        }
    }
}

fn scalar_value(
    ctx: &GenerationContext,
    field: &FieldDefinition,
    index: usize,
    base_date: NaiveDate,
    rng: &mut ChaCha8Rng,
) -> Value {
    if field.field_type == FieldType::Enum {
        if let Some(values) = field
            .enum_name
            .as_deref()
            .and_then(|name| ctx.enum_values(name))
        {
            if !values.is_empty() {
                let pick = rng.random_range(0..values.len());
                return Value::String(values[pick].clone());
            }
        }
    }

    if let Some(value) = named_pattern_value(&field.name, index, rng) {
        return value;
    }

    match field.field_type {
        FieldType::Text | FieldType::Enum => {
            Value::String(format!("{} {}", word(rng), word(rng)))
        }
        FieldType::Integer => Value::from(rng.random_range(1..=100_000_i64)),
        FieldType::BigInt => Value::from(rng.random_range(1..=10_000_000_i64)),
        FieldType::Float => Value::from(round2(rng.random_range(0.0..=10_000.0))),
        FieldType::Decimal => Value::from(round2(rng.random_range(0.0..=100_000.0))),
        FieldType::Boolean => Value::Bool(rng.random_bool(0.5)),
        FieldType::Timestamp => {
            let date = base_date + Duration::days(rng.random_range(0..=365));
            let time = NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default();
            Value::String(
                NaiveDateTime::new(date, time)
                    .format("%Y-%m-%dT%H:%M:%S")
                    .to_string(),
            )
        }
        FieldType::Date => {
            let date = base_date + Duration::days(rng.random_range(0..=365));
            Value::String(date.format("%Y-%m-%d").to_string())
        }
        FieldType::Time => {
            let seconds = rng.random_range(0..86_400_u32);
            let time = NaiveTime::from_num_seconds_from_midnight_opt(seconds, 0).unwrap_or_default();
            Value::String(time.format("%H:%M:%S").to_string())
        }
        FieldType::Json => {
            let mut object = Map::new();
            object.insert("label".to_string(), Value::String(word(rng).to_string()));
            object.insert("rank".to_string(), Value::from(rng.random_range(1..=10)));
            Value::Object(object)
        }
        FieldType::Bytes => Value::String(format!("\\x{:08x}", rng.random::<u32>())),
        FieldType::Uuid => Value::String(random_uuid(rng)),
    }
}

fn named_pattern_value(name: &str, index: usize, rng: &mut ChaCha8Rng) -> Option<Value> {
    let lower = name.to_lowercase();

    if lower.contains("email") {
        let first = pick(FIRST_NAMES, rng).to_lowercase();
        return Some(Value::String(format!("{first}.{}@example.com", index + 1)));
    }
    if lower.contains("phone") || lower.contains("telefone") {
        return Some(Value::String(format!(
            "+55 11 9{:04}-{:04}",
            rng.random_range(0..10_000),
            rng.random_range(0..10_000)
        )));
    }
    if lower.contains("url") || lower.contains("website") || lower.contains("link") {
        return Some(Value::String(format!("https://{}.example.com", word(rng))));
    }
    if lower.ends_with("name") || lower == "nome" {
        return Some(Value::String(format!(
            "{} {}",
            pick(FIRST_NAMES, rng),
            pick(LAST_NAMES, rng)
        )));
    }
    if lower.contains("title") || lower.contains("subject") {
        return Some(Value::String(format!("{} {}", cap(word(rng)), word(rng))));
    }
    if lower.contains("description") || lower.contains("summary") || lower.contains("bio") {
        return Some(Value::String(format!(
            "{} {} {} {}",
            cap(word(rng)),
            word(rng),
            word(rng),
            word(rng)
        )));
    }
    if lower.contains("price") || lower.contains("amount") || lower.contains("total") {
        return Some(Value::from(round2(rng.random_range(1.0..=999.0))));
    }
    if lower.contains("quantity") || lower.contains("count") || lower.contains("stock") {
        return Some(Value::from(rng.random_range(1..=500_i64)));
    }
    if lower.contains("city") || lower.contains("cidade") {
        return Some(Value::String(cap(word(rng))));
    }

    None
}

fn unique_value(field: &FieldDefinition, index: usize, base_date: NaiveDate) -> Value {
    let lower = field.name.to_lowercase();
    if lower.contains("email") {
        return Value::String(format!("user{:05}@example.com", index + 1));
    }

    match field.field_type {
        FieldType::Integer | FieldType::BigInt | FieldType::Decimal => {
            Value::from(index as i64 + 1)
        }
        FieldType::Float => Value::from(index as f64 + 1.0),
        FieldType::Uuid => Value::String(uuid::Uuid::from_u128(index as u128 + 1).to_string()),
        FieldType::Date => {
            let date = base_date + Duration::days(index as i64);
            Value::String(date.format("%Y-%m-%d").to_string())
        }
        FieldType::Timestamp => {
            let date = base_date + Duration::days(index as i64);
            let time = NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default();
            Value::String(
                NaiveDateTime::new(date, time)
                    .format("%Y-%m-%dT%H:%M:%S")
                    .to_string(),
            )
        }
        FieldType::Time => {
            let seconds = (index % 86_400) as u32;
            let time = NaiveTime::from_num_seconds_from_midnight_opt(seconds, 0).unwrap_or_default();
            Value::String(time.format("%H:%M:%S").to_string())
        }
        _ => Value::String(format!("{}_{:05}", field.name, index + 1)),
    }
}

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default()
}

fn word(rng: &mut ChaCha8Rng) -> &'static str {
    pick(WORDS, rng)
}

fn pick<'pool>(pool: &'pool [&'static str], rng: &mut ChaCha8Rng) -> &'pool str {
    pool[rng.random_range(0..pool.len())]
}

fn cap(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn random_uuid(rng: &mut ChaCha8Rng) -> String {
    let mut bytes = [0_u8; 16];
    rng.fill(&mut bytes);
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    uuid::Uuid::from_bytes(bytes).to_string()
}

pub(crate) fn hash_seed(seed: u64, key: &str) -> u64 {
    let mut hash = seed ^ 0xcbf2_9ce4_8422_2325;
    for byte in key.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use seedforge_core::{IdStore, RelationInfo, RelationKind, TableDefinition};
    use serde_json::json;

    fn field(name: &str, field_type: FieldType) -> FieldDefinition {
        FieldDefinition {
            name: name.to_string(),
            field_type,
            is_array: false,
            is_required: true,
            is_unique: false,
            is_id: false,
            has_default: false,
            enum_name: None,
            relation: None,
        }
    }

    fn context(definition: TableDefinition, count: usize, ids: &IdStore) -> GenerationContext {
        GenerationContext::new(definition, count, Vec::new(), None, ids)
    }

    #[tokio::test]
    async fn output_is_deterministic_for_a_seed() {
        let definition = TableDefinition {
            name: "user".to_string(),
            fields: vec![field("name", FieldType::Text), field("age", FieldType::Integer)],
            primary_key: Vec::new(),
            unique_constraints: Vec::new(),
        };
        let ids = IdStore::new();
        let ctx = context(definition, 4, &ids);

        let first = PatternGenerator::new(42).generate(&ctx, 4).await.expect("generate");
        let second = PatternGenerator::new(42).generate(&ctx, 4).await.expect("generate");
        assert_eq!(first.rows, second.rows);
    }

    #[tokio::test]
    async fn fk_fields_emit_placeholders_into_known_pool() {
        let mut definition = TableDefinition {
            name: "post".to_string(),
            fields: vec![field("author_id", FieldType::Integer)],
            primary_key: Vec::new(),
            unique_constraints: Vec::new(),
        };
        definition.fields[0].relation = Some(RelationInfo {
            kind: RelationKind::ManyToOne,
            related_table: "user".to_string(),
            fk_field: Some("author_id".to_string()),
            references_field: Some("id".to_string()),
            nullable: false,
        });

        let mut ids = IdStore::new();
        ids.insert("user", vec![json!(10), json!(20), json!(30)])
            .expect("insert");
        let ctx = context(definition, 6, &ids);

        let batch = PatternGenerator::default().generate(&ctx, 6).await.expect("generate");
        for row in &batch.rows {
            let value = row.get("author_id").and_then(Value::as_str).expect("placeholder");
            assert!(value.starts_with("{{user_"), "unexpected value {value}");
            let position: usize = value
                .trim_start_matches("{{user_")
                .trim_end_matches("}}")
                .parse()
                .expect("position");
            assert!((1..=3).contains(&position));
        }
    }

    #[tokio::test]
    async fn nullable_fk_without_parent_pool_is_null() {
        let mut definition = TableDefinition {
            name: "employee".to_string(),
            fields: vec![field("manager_id", FieldType::Integer)],
            primary_key: Vec::new(),
            unique_constraints: Vec::new(),
        };
        definition.fields[0].relation = Some(RelationInfo {
            kind: RelationKind::ManyToOne,
            related_table: "employee".to_string(),
            fk_field: Some("manager_id".to_string()),
            references_field: None,
            nullable: true,
        });

        let ctx = context(definition, 3, &IdStore::new());
        let batch = PatternGenerator::default().generate(&ctx, 3).await.expect("generate");
        assert!(batch.rows.iter().all(|row| row.get("manager_id") == Some(&Value::Null)));
    }

    #[tokio::test]
    async fn unique_and_id_fields_are_index_derived() {
        let mut id = field("id", FieldType::Integer);
        id.is_id = true;
        let mut email = field("email", FieldType::Text);
        email.is_unique = true;

        let definition = TableDefinition {
            name: "account".to_string(),
            fields: vec![id, email],
            primary_key: vec!["id".to_string()],
            unique_constraints: Vec::new(),
        };
        let ctx = context(definition, 3, &IdStore::new());

        let batch = PatternGenerator::default().generate(&ctx, 3).await.expect("generate");
        assert_eq!(batch.ids, vec![json!(1), json!(2), json!(3)]);
        assert_eq!(
            batch.rows[2].get("email"),
            Some(&json!("user00003@example.com"))
        );
    }
}
