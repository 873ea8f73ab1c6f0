//! Schema resolver: model element → physical table/column names.
//!
//! Indices over the mapping trace are built once at construction; per-element
//! resolutions are memoized in caches owned by the resolver instance.

use std::sync::Arc;

use moka::sync::Cache;
use rustc_hash::FxHashMap;
use strata_core::errors::SchemaError;
use strata_core::mapping::{IdType, MappingRule, SchemaMapping};
use strata_core::model::{AttributeId, EntityTypeId, Model, ReferenceId};

/// Required inputs of a resolver, validated by [`SchemaResolver::new`].
#[derive(Debug, Clone)]
pub struct SchemaResolverConfig {
    pub model: Arc<Model>,
    pub mapping: SchemaMapping,
}

/// A qualified column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

/// Physical table of a mapped entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub entity: EntityTypeId,
    pub table: String,
    pub id_column: String,
    pub id_type: IdType,
    pub version_column: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyMapping {
    pub table: String,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinTableMapping {
    pub table: String,
    pub source_column: String,
    pub target_column: String,
}

pub struct SchemaResolver {
    model: Arc<Model>,
    tables: FxHashMap<EntityTypeId, Vec<TableInfo>>,
    /// attribute name → (table-holding entity, column)
    attribute_columns: FxHashMap<String, Vec<(EntityTypeId, String)>>,
    foreign_keys: FxHashMap<ReferenceId, Vec<ForeignKeyMapping>>,
    inverse_foreign_keys: FxHashMap<ReferenceId, Vec<ForeignKeyMapping>>,
    join_tables: FxHashMap<ReferenceId, Vec<JoinTableMapping>>,
    column_cache: Cache<(EntityTypeId, AttributeId), Result<ColumnRef, SchemaError>>,
    chain_cache: Cache<EntityTypeId, Arc<Vec<TableInfo>>>,
}

impl SchemaResolver {
    /// Index the mapping trace. Fails fast on rules naming unknown model elements.
    pub fn new(config: SchemaResolverConfig) -> Result<Self, SchemaError> {
        let SchemaResolverConfig { model, mapping } = config;
        let mut tables: FxHashMap<EntityTypeId, Vec<TableInfo>> = FxHashMap::default();
        let mut attribute_columns: FxHashMap<String, Vec<(EntityTypeId, String)>> =
            FxHashMap::default();
        let mut foreign_keys: FxHashMap<ReferenceId, Vec<ForeignKeyMapping>> = FxHashMap::default();
        let mut inverse_foreign_keys: FxHashMap<ReferenceId, Vec<ForeignKeyMapping>> =
            FxHashMap::default();
        let mut join_tables: FxHashMap<ReferenceId, Vec<JoinTableMapping>> = FxHashMap::default();

        for rule in mapping.rules {
            let entity = model.entity_by_name(rule.entity())?.id;
            match rule {
                MappingRule::EntityTable {
                    table,
                    id_column,
                    id_type,
                    version_column,
                    ..
                } => tables.entry(entity).or_default().push(TableInfo {
                    entity,
                    table,
                    id_column,
                    id_type,
                    version_column,
                }),
                MappingRule::AttributeColumn {
                    attribute, column, ..
                } => {
                    if model.find_attribute(entity, &attribute).is_none() {
                        return Err(SchemaError::UnknownElement {
                            kind: "attribute",
                            name: format!("{}.{}", model.entity(entity).name, attribute),
                        });
                    }
                    attribute_columns
                        .entry(attribute)
                        .or_default()
                        .push((entity, column));
                }
                MappingRule::ForeignKey {
                    reference,
                    table,
                    column,
                    ..
                } => {
                    let id = resolve_reference(&model, entity, &reference)?;
                    foreign_keys
                        .entry(id)
                        .or_default()
                        .push(ForeignKeyMapping { table, column });
                }
                MappingRule::InverseForeignKey {
                    reference,
                    table,
                    column,
                    ..
                } => {
                    let id = resolve_reference(&model, entity, &reference)?;
                    inverse_foreign_keys
                        .entry(id)
                        .or_default()
                        .push(ForeignKeyMapping { table, column });
                }
                MappingRule::JoinTable {
                    reference,
                    table,
                    source_column,
                    target_column,
                    ..
                } => {
                    let id = resolve_reference(&model, entity, &reference)?;
                    join_tables.entry(id).or_default().push(JoinTableMapping {
                        table,
                        source_column,
                        target_column,
                    });
                }
            }
        }

        Ok(Self {
            model,
            tables,
            attribute_columns,
            foreign_keys,
            inverse_foreign_keys,
            join_tables,
            column_cache: Cache::builder().max_capacity(16_384).build(),
            chain_cache: Cache::builder().max_capacity(4_096).build(),
        })
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    fn own_table(&self, entity: EntityTypeId) -> Result<Option<&TableInfo>, SchemaError> {
        match self.tables.get(&entity).map(Vec::as_slice) {
            None | Some([]) => Ok(None),
            Some([info]) => Ok(Some(info)),
            Some(many) => Err(SchemaError::SchemaMapping {
                element: self.model.entity(entity).name.clone(),
                count: many.len(),
            }),
        }
    }

    /// The table holding rows of `entity`: its own, or the nearest mapped supertype's.
    pub fn table(&self, entity: EntityTypeId) -> Result<TableInfo, SchemaError> {
        let chain = self.table_chain(entity)?;
        chain.last().cloned().ok_or_else(|| SchemaError::SchemaMapping {
            element: self.model.entity(entity).name.clone(),
            count: 0,
        })
    }

    /// Mapped tables along the lineage of `entity`, root first.
    pub fn table_chain(&self, entity: EntityTypeId) -> Result<Arc<Vec<TableInfo>>, SchemaError> {
        if let Some(chain) = self.chain_cache.get(&entity) {
            return Ok(chain);
        }
        let mut chain = Vec::new();
        for id in self.model.lineage(entity) {
            if let Some(info) = self.own_table(id)? {
                chain.push(info.clone());
            }
        }
        let chain = Arc::new(chain);
        self.chain_cache.insert(entity, Arc::clone(&chain));
        Ok(chain)
    }

    /// Mapping of a physical table by name, whichever entity owns it.
    pub fn table_by_name(&self, table: &str) -> Result<TableInfo, SchemaError> {
        self.tables
            .values()
            .flatten()
            .find(|info| info.table == table)
            .cloned()
            .ok_or_else(|| SchemaError::SchemaMapping {
                element: table.to_string(),
                count: 0,
            })
    }

    pub fn id_column(&self, entity: EntityTypeId) -> Result<String, SchemaError> {
        Ok(self.table(entity)?.id_column)
    }

    pub fn identifier_type(&self, entity: EntityTypeId) -> Result<IdType, SchemaError> {
        let chain = self.table_chain(entity)?;
        chain
            .first()
            .map(|root| root.id_type)
            .ok_or_else(|| SchemaError::SchemaMapping {
                element: self.model.entity(entity).name.clone(),
                count: 0,
            })
    }

    /// Version column for optimistic locking, searched root first along the chain.
    pub fn version_column(&self, entity: EntityTypeId) -> Result<Option<ColumnRef>, SchemaError> {
        let chain = self.table_chain(entity)?;
        Ok(chain.iter().find_map(|info| {
            info.version_column.as_ref().map(|column| ColumnRef {
                table: info.table.clone(),
                column: column.clone(),
            })
        }))
    }

    /// Column of a stored attribute as seen from the concrete type `entity`.
    pub fn attribute_column(
        &self,
        entity: EntityTypeId,
        attribute: AttributeId,
    ) -> Result<ColumnRef, SchemaError> {
        self.column_cache
            .get_with((entity, attribute), || self.resolve_column(entity, attribute))
    }

    fn resolve_column(&self, entity: EntityTypeId, attribute: AttributeId) -> Result<ColumnRef, SchemaError> {
        let attr = self.model.attribute(attribute);
        let lineage = self.model.lineage(entity);
        let candidates: Vec<&(EntityTypeId, String)> = self
            .attribute_columns
            .get(&attr.name)
            .map(|rules| rules.iter().filter(|(holder, _)| lineage.contains(holder)).collect())
            .unwrap_or_default();
        match candidates.as_slice() {
            [(holder, column)] => {
                let table = self.own_table(*holder)?.ok_or_else(|| SchemaError::SchemaMapping {
                    element: self.model.entity(*holder).name.clone(),
                    count: 0,
                })?;
                Ok(ColumnRef {
                    table: table.table.clone(),
                    column: column.clone(),
                })
            }
            other => Err(SchemaError::SchemaMapping {
                element: format!("{}.{}", self.model.entity(entity).name, attr.name),
                count: other.len(),
            }),
        }
    }

    pub fn foreign_key(&self, reference: ReferenceId) -> Result<Option<ForeignKeyMapping>, SchemaError> {
        self.at_most_one(reference, self.foreign_keys.get(&reference))
    }

    pub fn inverse_foreign_key(
        &self,
        reference: ReferenceId,
    ) -> Result<Option<ForeignKeyMapping>, SchemaError> {
        self.at_most_one(reference, self.inverse_foreign_keys.get(&reference))
    }

    pub fn join_table(&self, reference: ReferenceId) -> Result<Option<JoinTableMapping>, SchemaError> {
        self.at_most_one(reference, self.join_tables.get(&reference))
    }

    fn at_most_one<T: Clone>(
        &self,
        reference: ReferenceId,
        rules: Option<&Vec<T>>,
    ) -> Result<Option<T>, SchemaError> {
        match rules.map(Vec::as_slice) {
            None | Some([]) => Ok(None),
            Some([one]) => Ok(Some(one.clone())),
            Some(many) => Err(SchemaError::SchemaMapping {
                element: self.model.qualified_name(reference),
                count: many.len(),
            }),
        }
    }
}

fn resolve_reference(model: &Model, entity: EntityTypeId, name: &str) -> Result<ReferenceId, SchemaError> {
    model
        .find_reference(entity, name)
        .ok_or_else(|| SchemaError::UnknownElement {
            kind: "reference",
            name: format!("{}.{}", model.entity(entity).name, name),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::model::ModelDefinition;

    fn resolver(model_toml: &str, rules: Vec<MappingRule>) -> SchemaResolver {
        let model = Model::from_definition(ModelDefinition::from_toml(model_toml).unwrap()).unwrap();
        SchemaResolver::new(SchemaResolverConfig {
            model: Arc::new(model),
            mapping: SchemaMapping::new(rules),
        })
        .unwrap()
    }

    const PARTY: &str = r#"
        [[entities]]
        name = "Party"
        abstract = true
        attributes = [{ name = "label", data_type = { type = "text" } }]

        [[entities]]
        name = "Person"
        supertype = "Party"
        attributes = [{ name = "age", data_type = { type = "integer" } }]
    "#;

    #[test]
    fn unmapped_supertype_columns_live_in_subtype_table() {
        let r = resolver(
            PARTY,
            vec![
                MappingRule::entity_table("Person", "person"),
                MappingRule::attribute_column("Person", "label", "label"),
                MappingRule::attribute_column("Person", "age", "age"),
            ],
        );
        let person = r.model().entity_by_name("Person").unwrap().id;
        let label = r.model().find_attribute(person, "label").unwrap();
        let col = r.attribute_column(person, label).unwrap();
        assert_eq!(col.table, "person");
        assert_eq!(col.column, "label");
        assert_eq!(r.table_chain(person).unwrap().len(), 1);
    }

    #[test]
    fn missing_table_is_a_mapping_error() {
        let r = resolver(PARTY, vec![]);
        let party = r.model().entity_by_name("Party").unwrap().id;
        let err = r.table(party).unwrap_err();
        assert!(matches!(err, SchemaError::SchemaMapping { count: 0, .. }));
    }

    #[test]
    fn duplicate_column_rules_are_rejected_at_first_use() {
        let r = resolver(
            PARTY,
            vec![
                MappingRule::entity_table("Person", "person"),
                MappingRule::attribute_column("Person", "age", "age"),
                MappingRule::attribute_column("Person", "age", "age_years"),
            ],
        );
        let person = r.model().entity_by_name("Person").unwrap().id;
        let age = r.model().find_attribute(person, "age").unwrap();
        let err = r.attribute_column(person, age).unwrap_err();
        assert_eq!(
            err,
            SchemaError::SchemaMapping {
                element: "Person.age".to_string(),
                count: 2
            }
        );
    }

    #[test]
    fn unknown_attribute_in_mapping_fails_construction() {
        let model = Model::from_definition(ModelDefinition::from_toml(PARTY).unwrap()).unwrap();
        let result = SchemaResolver::new(SchemaResolverConfig {
            model: Arc::new(model),
            mapping: SchemaMapping::new(vec![MappingRule::attribute_column("Person", "height", "h")]),
        });
        assert!(matches!(result, Err(SchemaError::UnknownElement { kind: "attribute", .. })));
    }
}
