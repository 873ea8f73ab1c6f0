//! Reference rule classifier.
//!
//! Decides whether a reference is stored as an owning foreign key, an inverse
//! foreign key, or a junction table. Bidirectional references share one physical
//! representation, so a reference without a direct rule borrows its opposite's.

use std::sync::Arc;

use moka::sync::Cache;
use strata_core::errors::SchemaError;
use strata_core::model::ReferenceId;

use crate::schema::SchemaResolver;

/// Physical storage of a reference, seen from its owning side.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StorageRule {
    /// The owner's row holds the target id in `table.column`.
    ForeignKey { table: String, column: String },
    /// The target's row holds the owner id in `table.column`.
    InverseForeignKey { table: String, column: String },
    /// Junction rows pair `source_column` (owner id) with `target_column` (target id).
    JoinTable {
        table: String,
        source_column: String,
        target_column: String,
    },
}

impl StorageRule {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::ForeignKey { .. } => "FOREIGN_KEY",
            Self::InverseForeignKey { .. } => "INVERSE_FOREIGN_KEY",
            Self::JoinTable { .. } => "JOIN_TABLE",
        }
    }

    /// The same physical relationship described from the opposite reference.
    pub fn reversed(&self) -> Self {
        match self {
            Self::ForeignKey { table, column } => Self::InverseForeignKey {
                table: table.clone(),
                column: column.clone(),
            },
            Self::InverseForeignKey { table, column } => Self::ForeignKey {
                table: table.clone(),
                column: column.clone(),
            },
            Self::JoinTable {
                table,
                source_column,
                target_column,
            } => Self::JoinTable {
                table: table.clone(),
                source_column: target_column.clone(),
                target_column: source_column.clone(),
            },
        }
    }
}

/// How to get from parent ids to child ids along one traversal direction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EdgeLink {
    /// Parent row carries the child id.
    OnParent { table: String, column: String },
    /// Child row carries the parent id.
    OnChild { table: String, column: String },
    /// Junction rows pair parent and child ids.
    Junction {
        table: String,
        parent_column: String,
        child_column: String,
    },
}

impl EdgeLink {
    /// Owner → target traversal.
    pub fn forward(rule: &StorageRule) -> Self {
        match rule {
            StorageRule::ForeignKey { table, column } => Self::OnParent {
                table: table.clone(),
                column: column.clone(),
            },
            StorageRule::InverseForeignKey { table, column } => Self::OnChild {
                table: table.clone(),
                column: column.clone(),
            },
            StorageRule::JoinTable {
                table,
                source_column,
                target_column,
            } => Self::Junction {
                table: table.clone(),
                parent_column: source_column.clone(),
                child_column: target_column.clone(),
            },
        }
    }

    /// Target → owner traversal.
    pub fn backward(rule: &StorageRule) -> Self {
        Self::forward(&rule.reversed())
    }

    pub fn is_junction(&self) -> bool {
        matches!(self, Self::Junction { .. })
    }
}

pub struct ReferenceRuleClassifier {
    resolver: Arc<SchemaResolver>,
    cache: Cache<ReferenceId, Result<StorageRule, SchemaError>>,
}

impl ReferenceRuleClassifier {
    pub fn new(resolver: Arc<SchemaResolver>) -> Self {
        Self {
            resolver,
            cache: Cache::builder().max_capacity(16_384).build(),
        }
    }

    pub fn resolver(&self) -> &Arc<SchemaResolver> {
        &self.resolver
    }

    /// Storage rule of `reference`, memoized for the classifier's lifetime.
    pub fn classify(&self, reference: ReferenceId) -> Result<StorageRule, SchemaError> {
        self.cache
            .get_with(reference, || self.classify_uncached(reference))
    }

    fn classify_uncached(&self, reference: ReferenceId) -> Result<StorageRule, SchemaError> {
        if let Some(rule) = self.direct_rule(reference)? {
            return Ok(rule);
        }
        let model = self.resolver.model();
        if let Some(opposite) = model.reference(reference).opposite {
            if let Some(rule) = self.direct_rule(opposite)? {
                tracing::debug!(
                    reference = %model.qualified_name(reference),
                    rule = rule.kind_name(),
                    "storage rule borrowed from opposite"
                );
                return Ok(rule.reversed());
            }
        }
        Err(SchemaError::invalid_model(format!(
            "no storage rule for reference '{}' or its opposite",
            model.qualified_name(reference)
        )))
    }

    fn direct_rule(&self, reference: ReferenceId) -> Result<Option<StorageRule>, SchemaError> {
        let mut found = Vec::new();
        if let Some(fk) = self.resolver.foreign_key(reference)? {
            found.push(StorageRule::ForeignKey {
                table: fk.table,
                column: fk.column,
            });
        }
        if let Some(ifk) = self.resolver.inverse_foreign_key(reference)? {
            found.push(StorageRule::InverseForeignKey {
                table: ifk.table,
                column: ifk.column,
            });
        }
        if let Some(jt) = self.resolver.join_table(reference)? {
            found.push(StorageRule::JoinTable {
                table: jt.table,
                source_column: jt.source_column,
                target_column: jt.target_column,
            });
        }
        match found.len() {
            0 => Ok(None),
            1 => Ok(found.pop()),
            count => Err(SchemaError::SchemaMapping {
                element: self.resolver.model().qualified_name(reference),
                count,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaResolverConfig;
    use strata_core::mapping::{MappingRule, SchemaMapping};
    use strata_core::model::{Model, ModelDefinition};

    const MODEL: &str = r#"
        [[entities]]
        name = "Author"
        references = [{ name = "books", target = "Book", upper = -1, opposite = "authors" }]

        [[entities]]
        name = "Book"
        references = [
            { name = "authors", target = "Author", upper = -1 },
            { name = "publisher", target = "Publisher" },
        ]

        [[entities]]
        name = "Publisher"
        references = [{ name = "titles", target = "Book", upper = -1, opposite = "publisher" }]
    "#;

    fn classifier(rules: Vec<MappingRule>) -> ReferenceRuleClassifier {
        let model = Model::from_definition(ModelDefinition::from_toml(MODEL).unwrap()).unwrap();
        let resolver = SchemaResolver::new(SchemaResolverConfig {
            model: Arc::new(model),
            mapping: SchemaMapping::new(rules),
        })
        .unwrap();
        ReferenceRuleClassifier::new(Arc::new(resolver))
    }

    fn reference(c: &ReferenceRuleClassifier, entity: &str, name: &str) -> ReferenceId {
        let model = c.resolver().model();
        let e = model.entity_by_name(entity).unwrap().id;
        model.find_reference(e, name).unwrap()
    }

    #[test]
    fn opposite_junction_swaps_columns() {
        let c = classifier(vec![MappingRule::join_table(
            "Author", "books", "AUTHOR_BOOK", "author_id", "book_id",
        )]);
        let rule = c.classify(reference(&c, "Book", "authors")).unwrap();
        assert_eq!(
            rule,
            StorageRule::JoinTable {
                table: "AUTHOR_BOOK".into(),
                source_column: "book_id".into(),
                target_column: "author_id".into(),
            }
        );
    }

    #[test]
    fn opposite_foreign_key_becomes_inverse() {
        let c = classifier(vec![MappingRule::foreign_key("Book", "publisher", "book", "publisher_id")]);
        let titles = c.classify(reference(&c, "Publisher", "titles")).unwrap();
        assert_eq!(
            titles,
            StorageRule::InverseForeignKey {
                table: "book".into(),
                column: "publisher_id".into(),
            }
        );
        assert_eq!(
            EdgeLink::forward(&titles),
            EdgeLink::OnChild {
                table: "book".into(),
                column: "publisher_id".into()
            }
        );
    }

    #[test]
    fn unmapped_pair_is_an_invalid_model() {
        let c = classifier(vec![]);
        let err = c.classify(reference(&c, "Book", "publisher")).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidModel { .. }));
    }

    #[test]
    fn two_rules_for_one_reference_are_rejected() {
        let c = classifier(vec![
            MappingRule::foreign_key("Book", "publisher", "book", "publisher_id"),
            MappingRule::inverse_foreign_key("Book", "publisher", "publisher", "book_id"),
        ]);
        let err = c.classify(reference(&c, "Book", "publisher")).unwrap_err();
        assert!(matches!(err, SchemaError::SchemaMapping { count: 2, .. }));
    }
}
