use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::query_builder::Separated;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::{info, warn};

use seedforge_core::{FieldDefinition, FieldType, TableDefinition};
use seedforge_generate::{GeneratedRow, GenerationError, SeedSink, SinkReport};

use crate::error::PersistError;

/// Default rows per insert statement.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Outcome of persisting one table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistReport {
    pub table: String,
    pub inserted: u64,
    /// Requested rows minus rows actually returned by the conflict-tolerant
    /// insert: conflict skips, counted with a note rather than an error.
    pub failed: u64,
    pub errors: Vec<String>,
    /// Identifiers harvested from the insert's RETURNING clause.
    pub ids: Vec<Value>,
}

/// Transactional batch persister over a Postgres pool.
#[derive(Debug, Clone)]
pub struct PostgresPersister {
    pool: PgPool,
}

impl PostgresPersister {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Connect and verify the destination is reachable. Failing here keeps
    /// a run from generating rows it could never persist.
    pub async fn connect(url: &str) -> Result<Self, PersistError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(std::time::Duration::from_secs(10))
            .connect(url)
            .await
            .map_err(|err| PersistError::Connection(err.to_string()))?;

        sqlx::query("select 1")
            .execute(&pool)
            .await
            .map_err(|err| PersistError::Connection(err.to_string()))?;

        Ok(Self { pool })
    }

    /// Write a table's rows in batches inside a single transaction.
    ///
    /// `BEGIN` precedes the first batch, `COMMIT` follows the last; any
    /// uncaught batch error rolls back everything inserted so far for this
    /// table and propagates. Conflicting rows are skipped by the insert's
    /// `ON CONFLICT DO NOTHING` and accounted as `failed`, not raised.
    pub async fn persist(
        &self,
        definition: &TableDefinition,
        rows: &[GeneratedRow],
        batch_size: usize,
    ) -> Result<PersistReport, PersistError> {
        let mut report = PersistReport {
            table: definition.name.clone(),
            ..PersistReport::default()
        };
        if rows.is_empty() {
            return Ok(report);
        }

        let columns = insert_columns(definition, rows);
        if columns.is_empty() {
            return Err(PersistError::Unsupported(format!(
                "no insertable columns for table '{}'",
                definition.name
            )));
        }
        let id_columns: Vec<&str> = definition
            .id_fields()
            .into_iter()
            .map(|field| field.name.as_str())
            .collect();

        let mut tx = self.pool.begin().await?;

        for (batch_index, chunk) in rows.chunks(batch_size.max(1)).enumerate() {
            let mut builder = insert_statement(definition, &columns, &id_columns, chunk);

            let returned: Vec<PgRow> = match builder.build().fetch_all(&mut *tx).await {
                Ok(returned) => returned,
                Err(err) => {
                    warn!(
                        table = %definition.name,
                        batch = batch_index + 1,
                        error = %err,
                        "batch insert failed, rolling back table"
                    );
                    if let Err(rollback_err) = tx.rollback().await {
                        warn!(error = %rollback_err, "rollback failed");
                    }
                    return Err(PersistError::Database(err));
                }
            };

            for row in &returned {
                report.ids.push(returned_id(row, &id_columns));
            }
            report.inserted += returned.len() as u64;

            let skipped = chunk.len().saturating_sub(returned.len());
            if skipped > 0 {
                report.failed += skipped as u64;
                report.errors.push(format!(
                    "batch {}: {} row(s) skipped by unique conflict (on conflict do nothing)",
                    batch_index + 1,
                    skipped
                ));
            }
        }

        tx.commit().await?;

        info!(
            table = %definition.name,
            inserted = report.inserted,
            failed = report.failed,
            "table persisted"
        );
        Ok(report)
    }
}

/// [`SeedSink`] adapter wiring the persister into the run engine.
#[derive(Debug, Clone)]
pub struct PostgresSink {
    persister: PostgresPersister,
    batch_size: usize,
}

impl PostgresSink {
    pub fn new(persister: PostgresPersister, batch_size: usize) -> Self {
        Self {
            persister,
            batch_size,
        }
    }
}

#[async_trait::async_trait]
impl SeedSink for PostgresSink {
    async fn persist_table(
        &self,
        definition: &TableDefinition,
        rows: &[GeneratedRow],
    ) -> Result<SinkReport, GenerationError> {
        let report = self
            .persister
            .persist(definition, rows, self.batch_size)
            .await
            .map_err(|err| GenerationError::Sink(err.to_string()))?;

        Ok(SinkReport {
            inserted: report.inserted,
            failed: report.failed,
            messages: report.errors,
            ids: report.ids,
        })
    }
}

/// Definition fields that actually appear in the generated rows. Inverse
/// relation sides carry no column and are never insertable.
fn insert_columns<'definition>(
    definition: &'definition TableDefinition,
    rows: &[GeneratedRow],
) -> Vec<&'definition FieldDefinition> {
    definition
        .fields
        .iter()
        .filter(|field| {
            field
                .relation
                .as_ref()
                .map(|relation| relation.fk_field.is_some())
                .unwrap_or(true)
        })
        .filter(|field| rows.iter().any(|row| row.contains_key(&field.name)))
        .collect()
}

fn insert_statement<'args>(
    definition: &TableDefinition,
    columns: &[&FieldDefinition],
    id_columns: &[&str],
    chunk: &'args [GeneratedRow],
) -> QueryBuilder<'args, Postgres> {
    let mut builder: QueryBuilder<'args, Postgres> =
        QueryBuilder::new(format!("insert into {} (", quote_ident(&definition.name)));

    for (index, column) in columns.iter().enumerate() {
        if index > 0 {
            builder.push(", ");
        }
        builder.push(quote_ident(&column.name));
    }
    builder.push(") ");

    builder.push_values(chunk, |mut binder, row| {
        for column in columns {
            bind_value(&mut binder, column, row.get(&column.name));
        }
    });

    builder.push(" on conflict do nothing returning ");
    if id_columns.is_empty() {
        builder.push("1");
    } else {
        for (index, column) in id_columns.iter().enumerate() {
            if index > 0 {
                builder.push(", ");
            }
            builder.push(format!(
                "{}::text as {}",
                quote_ident(column),
                quote_ident(column)
            ));
        }
    }

    builder
}

/// Bind one value with the cast its field type requires. Total: anything
/// unconvertible binds as NULL rather than failing mid-statement.
fn bind_value<'args>(
    binder: &mut Separated<'_, 'args, Postgres, &'static str>,
    field: &FieldDefinition,
    value: Option<&'args Value>,
) {
    let value = value.filter(|candidate| !candidate.is_null());

    if field.is_array {
        binder.push_bind(value.map(|inner| array_literal(inner)));
        binder.push_unseparated(format!("::{}", pg_array_type(field.field_type)));
        return;
    }

    match field.field_type {
        FieldType::Integer | FieldType::BigInt => {
            binder.push_bind(value.and_then(coerce_i64));
        }
        FieldType::Float | FieldType::Decimal => {
            binder.push_bind(value.and_then(coerce_f64));
        }
        FieldType::Boolean => {
            binder.push_bind(value.and_then(Value::as_bool));
        }
        FieldType::Timestamp => {
            binder.push_bind(value.and_then(value_text).map(|raw| normalize_timestamp(&raw)));
            binder.push_unseparated("::timestamp");
        }
        FieldType::Date => {
            binder.push_bind(value.and_then(value_text).map(|raw| normalize_date(&raw)));
            binder.push_unseparated("::date");
        }
        FieldType::Time => {
            binder.push_bind(value.and_then(value_text).map(|raw| normalize_time(&raw)));
            binder.push_unseparated("::time");
        }
        FieldType::Uuid => {
            binder.push_bind(value.and_then(value_text));
            binder.push_unseparated("::uuid");
        }
        FieldType::Json => {
            binder.push_bind(value.cloned());
        }
        FieldType::Bytes => {
            binder.push_bind(value.and_then(value_text));
            binder.push_unseparated("::bytea");
        }
        FieldType::Enum => {
            binder.push_bind(value.and_then(value_text));
            if let Some(enum_name) = field.enum_name.as_deref() {
                binder.push_unseparated(format!("::{}", quote_ident(enum_name)));
            }
        }
        FieldType::Text => {
            binder.push_bind(value.and_then(value_text));
        }
    }
}

fn returned_id(row: &PgRow, id_columns: &[&str]) -> Value {
    match id_columns.len() {
        0 => Value::Null,
        1 => row
            .try_get::<Option<String>, usize>(0)
            .ok()
            .flatten()
            .map(text_to_value)
            .unwrap_or(Value::Null),
        _ => {
            let mut composite = serde_json::Map::new();
            for (index, column) in id_columns.iter().enumerate() {
                let value = row
                    .try_get::<Option<String>, usize>(index)
                    .ok()
                    .flatten()
                    .map(text_to_value)
                    .unwrap_or(Value::Null);
                composite.insert(column.to_string(), value);
            }
            Value::Object(composite)
        }
    }
}

/// Integer-looking identifiers come back from `::text` casts; restore them
/// so membership checks against generated values stay cheap.
fn text_to_value(text: String) -> Value {
    match text.parse::<i64>() {
        Ok(number) => Value::from(number),
        Err(_) => Value::String(text),
    }
}

fn coerce_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|float| float.round() as i64)),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null => None,
        other => serde_json::to_string(other).ok(),
    }
}

/// Canonicalize the textual forms generators produce for temporal values.
fn normalize_timestamp(raw: &str) -> String {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed.naive_utc().format("%Y-%m-%dT%H:%M:%S").to_string();
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return parsed.format("%Y-%m-%dT%H:%M:%S").to_string();
        }
    }
    if let Ok(parsed) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let midnight = NaiveTime::from_hms_opt(0, 0, 0).unwrap_or_default();
        return NaiveDateTime::new(parsed, midnight)
            .format("%Y-%m-%dT%H:%M:%S")
            .to_string();
    }
    raw.to_string()
}

fn normalize_date(raw: &str) -> String {
    if let Ok(parsed) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return parsed.format("%Y-%m-%d").to_string();
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return parsed.date().format("%Y-%m-%d").to_string();
        }
    }
    raw.to_string()
}

fn normalize_time(raw: &str) -> String {
    for format in ["%H:%M:%S%.f", "%H:%M:%S", "%H:%M"] {
        if let Ok(parsed) = NaiveTime::parse_from_str(raw, format) {
            return parsed.format("%H:%M:%S").to_string();
        }
    }
    raw.to_string()
}

/// Postgres array literal with every element quoted and escaped.
fn array_literal(value: &Value) -> String {
    let elements: Vec<String> = match value {
        Value::Array(items) => items.iter().filter_map(array_element).collect(),
        other => array_element(other).into_iter().collect(),
    };
    format!("{{{}}}", elements.join(","))
}

fn array_element(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return Some("NULL".to_string()),
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        other => serde_json::to_string(other).ok()?,
    };
    Some(format!(
        "\"{}\"",
        text.replace('\\', "\\\\").replace('"', "\\\"")
    ))
}

fn pg_array_type(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::Integer => "int4[]",
        FieldType::BigInt => "int8[]",
        FieldType::Float => "float8[]",
        FieldType::Decimal => "numeric[]",
        FieldType::Boolean => "bool[]",
        FieldType::Timestamp => "timestamp[]",
        FieldType::Date => "date[]",
        FieldType::Time => "time[]",
        FieldType::Uuid => "uuid[]",
        FieldType::Json => "jsonb[]",
        FieldType::Text | FieldType::Bytes | FieldType::Enum => "text[]",
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
