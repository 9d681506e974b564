use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parsed schema document handed over by the schema provider.
///
/// The provider owns parsing from whatever source language the schema was
/// written in; this crate treats the document as already validated.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ParsedSchema {
    pub tables: Vec<TableDefinition>,
    pub enums: Vec<EnumDefinition>,
}

impl ParsedSchema {
    pub fn table(&self, name: &str) -> Option<&TableDefinition> {
        self.tables.iter().find(|table| table.name == name)
    }
}

/// A single relational table with its fields and key constraints.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TableDefinition {
    pub name: String,
    pub fields: Vec<FieldDefinition>,
    /// Primary-key field names preserving declaration order.
    pub primary_key: Vec<String>,
    /// Multi-column unique constraints.
    pub unique_constraints: Vec<Vec<String>>,
}

impl TableDefinition {
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Fields that carry a foreign key to another table.
    pub fn fk_fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.iter().filter(|field| {
            field
                .relation
                .as_ref()
                .map(|relation| relation.fk_field.is_some())
                .unwrap_or(false)
        })
    }

    /// Identifier fields: `is_id` flagged fields, falling back to the
    /// primary-key columns when no field carries the flag.
    pub fn id_fields(&self) -> Vec<&FieldDefinition> {
        let flagged: Vec<&FieldDefinition> =
            self.fields.iter().filter(|field| field.is_id).collect();
        if !flagged.is_empty() {
            return flagged;
        }
        self.primary_key
            .iter()
            .filter_map(|name| self.field(name))
            .collect()
    }
}

/// Scalar types understood by the generation pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Integer,
    BigInt,
    Float,
    Decimal,
    Boolean,
    Timestamp,
    Date,
    Time,
    Json,
    Bytes,
    Uuid,
    Enum,
}

/// Column metadata for a table.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FieldDefinition {
    pub name: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub is_array: bool,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default)]
    pub is_unique: bool,
    #[serde(default)]
    pub is_id: bool,
    /// The column has a database-side default expression.
    #[serde(default)]
    pub has_default: bool,
    /// Enum type name when `field_type` is [`FieldType::Enum`].
    pub enum_name: Option<String>,
    pub relation: Option<RelationInfo>,
}

/// Relationship kinds mirrored from the source schema.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

/// Relation metadata attached to a field.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RelationInfo {
    pub kind: RelationKind,
    pub related_table: String,
    /// Field in the owning table that carries the foreign key. Absent on the
    /// inverse side of a relation.
    pub fk_field: Option<String>,
    /// Referenced field in the related table; defaults to its identifier.
    pub references_field: Option<String>,
    #[serde(default)]
    pub nullable: bool,
}

/// Enum type with its ordered labels.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EnumDefinition {
    pub name: String,
    pub values: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id_field(name: &str) -> FieldDefinition {
        FieldDefinition {
            name: name.to_string(),
            field_type: FieldType::Integer,
            is_array: false,
            is_required: true,
            is_unique: false,
            is_id: true,
            has_default: true,
            enum_name: None,
            relation: None,
        }
    }

    #[test]
    fn id_fields_prefer_flagged_columns() {
        let table = TableDefinition {
            name: "users".to_string(),
            fields: vec![id_field("id")],
            primary_key: vec!["email".to_string()],
            unique_constraints: Vec::new(),
        };
        let ids = table.id_fields();
        assert_eq!(ids.len(), 1);
        assert_eq!(ids[0].name, "id");
    }

    #[test]
    fn id_fields_fall_back_to_primary_key() {
        let mut field = id_field("tenant_id");
        field.is_id = false;
        let table = TableDefinition {
            name: "memberships".to_string(),
            fields: vec![field],
            primary_key: vec!["tenant_id".to_string()],
            unique_constraints: Vec::new(),
        };
        let ids = table.id_fields();
        assert_eq!(ids.len(), 1);
        assert_eq!(ids[0].name, "tenant_id");
    }

    #[test]
    fn schema_round_trips_through_json() {
        let schema = ParsedSchema {
            tables: vec![TableDefinition {
                name: "users".to_string(),
                fields: vec![id_field("id")],
                primary_key: vec!["id".to_string()],
                unique_constraints: vec![vec!["id".to_string()]],
            }],
            enums: vec![EnumDefinition {
                name: "role".to_string(),
                values: vec!["admin".to_string(), "member".to_string()],
            }],
        };

        let encoded = serde_json::to_string(&schema).expect("serialize");
        let decoded: ParsedSchema = serde_json::from_str(&encoded).expect("deserialize");
        assert_eq!(decoded.tables[0].name, "users");
        assert_eq!(decoded.enums[0].values.len(), 2);
    }
}
