use anyhow::Result;
use serde_json::{Value, json};

use seedforge_core::{FieldDefinition, FieldType, TableDefinition};
use seedforge_generate::GeneratedRow;
use seedforge_persist::{DEFAULT_BATCH_SIZE, PostgresPersister};

fn database_url() -> Option<String> {
    std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .ok()
}

fn roundtrip_table() -> TableDefinition {
    let id = FieldDefinition {
        name: "id".to_string(),
        field_type: FieldType::Integer,
        is_array: false,
        is_required: true,
        is_unique: true,
        is_id: true,
        has_default: false,
        enum_name: None,
        relation: None,
    };
    TableDefinition {
        name: "seedforge_roundtrip".to_string(),
        fields: vec![
            id,
            FieldDefinition {
                name: "label".to_string(),
                field_type: FieldType::Text,
                is_array: false,
                is_required: true,
                is_unique: false,
                is_id: false,
                has_default: false,
                enum_name: None,
                relation: None,
            },
        ],
        primary_key: vec!["id".to_string()],
        unique_constraints: Vec::new(),
    }
}

fn rows(count: i64) -> Vec<GeneratedRow> {
    (1..=count)
        .map(|index| {
            let mut row = GeneratedRow::new();
            row.insert("id".to_string(), json!(index));
            row.insert("label".to_string(), json!(format!("label_{index}")));
            row
        })
        .collect()
}

#[tokio::test]
async fn persist_is_conflict_tolerant_and_idempotent() -> Result<()> {
    let Some(url) = database_url() else {
        eprintln!("skipping: set TEST_DATABASE_URL or DATABASE_URL to run persistence tests");
        return Ok(());
    };

    let persister = PostgresPersister::connect(&url).await?;
    sqlx::query("drop table if exists seedforge_roundtrip")
        .execute(persister.pool())
        .await?;
    sqlx::query("create table seedforge_roundtrip (id int primary key, label text not null)")
        .execute(persister.pool())
        .await?;

    let definition = roundtrip_table();
    let data = rows(5);

    let first = persister
        .persist(&definition, &data, DEFAULT_BATCH_SIZE)
        .await?;
    assert_eq!(first.inserted, 5);
    assert_eq!(first.failed, 0);
    assert_eq!(first.ids, (1..=5).map(Value::from).collect::<Vec<_>>());

    // Re-running against already-seeded data skips every row silently.
    let second = persister
        .persist(&definition, &data, DEFAULT_BATCH_SIZE)
        .await?;
    assert_eq!(second.inserted, 0);
    assert_eq!(second.failed, 5);
    assert_eq!(second.errors.len(), 1);

    let count: i64 = sqlx::query_scalar("select count(*) from seedforge_roundtrip")
        .fetch_one(persister.pool())
        .await?;
    assert_eq!(count, 5);

    sqlx::query("drop table seedforge_roundtrip")
        .execute(persister.pool())
        .await?;
    Ok(())
}
