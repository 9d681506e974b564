use seedforge_core::{EnumDefinition, IdStore, TableDefinition};

/// Foreign-key target extracted from a table's field definitions.
#[derive(Debug, Clone)]
pub struct RelationTarget {
    /// Field in the owning table that carries the foreign key.
    pub field: String,
    pub related_table: String,
    /// Referenced field in the related table.
    pub references_field: String,
    pub nullable: bool,
}

/// Everything a row generator needs to produce rows for one table.
///
/// `known_ids` is a read-only snapshot of the identifier store taken at
/// context construction; the level barrier in the engine guarantees it
/// already contains every table from earlier levels.
#[derive(Debug, Clone)]
pub struct GenerationContext {
    pub table: String,
    pub definition: TableDefinition,
    pub count: usize,
    pub relations: Vec<RelationTarget>,
    pub enums: Vec<EnumDefinition>,
    /// Optional free-form steering text for generators that accept it.
    pub instruction: Option<String>,
    pub known_ids: IdStore,
}

impl GenerationContext {
    pub fn new(
        definition: TableDefinition,
        count: usize,
        enums: Vec<EnumDefinition>,
        instruction: Option<String>,
        ids: &IdStore,
    ) -> Self {
        let relations = extract_relations(&definition);
        Self {
            table: definition.name.clone(),
            definition,
            count,
            relations,
            enums,
            instruction,
            known_ids: ids.snapshot(),
        }
    }

    pub fn enum_values(&self, name: &str) -> Option<&[String]> {
        self.enums
            .iter()
            .find(|definition| definition.name == name)
            .map(|definition| definition.values.as_slice())
    }

    pub fn relation_for(&self, field: &str) -> Option<&RelationTarget> {
        self.relations.iter().find(|target| target.field == field)
    }
}

fn extract_relations(definition: &TableDefinition) -> Vec<RelationTarget> {
    definition
        .fields
        .iter()
        .filter_map(|field| {
            let relation = field.relation.as_ref()?;
            let fk_field = relation.fk_field.clone()?;
            Some(RelationTarget {
                field: fk_field,
                related_table: relation.related_table.clone(),
                references_field: relation
                    .references_field
                    .clone()
                    .unwrap_or_else(|| "id".to_string()),
                nullable: relation.nullable,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use seedforge_core::{FieldDefinition, FieldType, RelationInfo, RelationKind};

    #[test]
    fn relations_skip_inverse_side() {
        let definition = TableDefinition {
            name: "post".to_string(),
            fields: vec![
                FieldDefinition {
                    name: "author_id".to_string(),
                    field_type: FieldType::Integer,
                    is_array: false,
                    is_required: true,
                    is_unique: false,
                    is_id: false,
                    has_default: false,
                    enum_name: None,
                    relation: Some(RelationInfo {
                        kind: RelationKind::ManyToOne,
                        related_table: "user".to_string(),
                        fk_field: Some("author_id".to_string()),
                        references_field: None,
                        nullable: false,
                    }),
                },
                FieldDefinition {
                    name: "comments".to_string(),
                    field_type: FieldType::Integer,
                    is_array: true,
                    is_required: false,
                    is_unique: false,
                    is_id: false,
                    has_default: false,
                    enum_name: None,
                    relation: Some(RelationInfo {
                        kind: RelationKind::OneToMany,
                        related_table: "comment".to_string(),
                        fk_field: None,
                        references_field: None,
                        nullable: true,
                    }),
                },
            ],
            primary_key: Vec::new(),
            unique_constraints: Vec::new(),
        };

        let ctx = GenerationContext::new(definition, 5, Vec::new(), None, &IdStore::new());
        assert_eq!(ctx.relations.len(), 1);
        assert_eq!(ctx.relations[0].related_table, "user");
        assert_eq!(ctx.relations[0].references_field, "id");
    }
}
