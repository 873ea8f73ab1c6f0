//! The loaded model: arenas of descriptors plus name indices.

use rustc_hash::FxHashMap;

use super::{
    Attribute, AttributeId, AttributeKind, EntityDefinition, EntityType, EntityTypeId, ModelDefinition,
    Multiplicity, Reference, ReferenceDefinition, ReferenceId,
};
use crate::errors::SchemaError;
use crate::payload::coerce::coerce;
use crate::payload::json::json_to_value;
use crate::payload::Value;

/// Immutable model registry. Built once, shared read-only across threads.
#[derive(Debug, Clone, Default)]
pub struct Model {
    entities: Vec<EntityType>,
    attributes: Vec<Attribute>,
    references: Vec<Reference>,
    by_name: FxHashMap<String, EntityTypeId>,
}

impl Model {
    /// Build and validate a model from its serializable definition.
    pub fn from_definition(definition: ModelDefinition) -> Result<Self, SchemaError> {
        let mut model = Model::default();

        for (index, def) in definition.entities.iter().enumerate() {
            let id = EntityTypeId(index as u32);
            if model.by_name.insert(def.name.clone(), id).is_some() {
                return Err(SchemaError::invalid_model(format!(
                    "duplicate entity type '{}'",
                    def.name
                )));
            }
            model.entities.push(EntityType {
                id,
                name: def.name.clone(),
                supertype: None,
                is_abstract: def.is_abstract,
                optimistic_locking: def.optimistic_locking,
                attributes: Vec::new(),
                references: Vec::new(),
            });
        }

        for (index, def) in definition.entities.iter().enumerate() {
            if let Some(supertype) = &def.supertype {
                let super_id = model.lookup(supertype)?;
                model.entities[index].supertype = Some(super_id);
            }
        }
        model.check_inheritance_acyclic()?;

        let mut pending_opposites = Vec::new();
        for (index, def) in definition.entities.iter().enumerate() {
            let owner = EntityTypeId(index as u32);
            model.load_attributes(owner, def)?;
            for reference in &def.references {
                let id = model.load_reference(owner, reference)?;
                if let Some(opposite) = &reference.opposite {
                    pending_opposites.push((id, opposite.clone()));
                }
            }
        }

        for (id, opposite_name) in &pending_opposites {
            let target = model.references[id.index()].target;
            let opposite = model.find_reference(target, opposite_name).ok_or_else(|| {
                SchemaError::UnknownElement {
                    kind: "reference",
                    name: format!("{}.{}", model.entities[target.index()].name, opposite_name),
                }
            })?;
            model.references[id.index()].opposite = Some(opposite);
        }
        // One-sided declarations are completed so both ends see each other.
        for (id, _) in &pending_opposites {
            if let Some(opposite) = model.references[id.index()].opposite {
                if model.references[opposite.index()].opposite.is_none() {
                    model.references[opposite.index()].opposite = Some(*id);
                }
            }
        }
        for (id, _) in &pending_opposites {
            model.check_opposite(*id)?;
        }

        for entity in &model.entities {
            model.check_unique_feature_names(entity.id)?;
        }

        Ok(model)
    }

    fn lookup(&self, name: &str) -> Result<EntityTypeId, SchemaError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| SchemaError::UnknownElement {
                kind: "entity type",
                name: name.to_string(),
            })
    }

    fn check_inheritance_acyclic(&self) -> Result<(), SchemaError> {
        for entity in &self.entities {
            let mut steps = 0;
            let mut current = entity.supertype;
            while let Some(id) = current {
                steps += 1;
                if id == entity.id || steps > self.entities.len() {
                    return Err(SchemaError::invalid_model(format!(
                        "inheritance cycle through '{}'",
                        entity.name
                    )));
                }
                current = self.entities[id.index()].supertype;
            }
        }
        Ok(())
    }

    fn load_attributes(&mut self, owner: EntityTypeId, def: &EntityDefinition) -> Result<(), SchemaError> {
        for attr in &def.attributes {
            let qualified = format!("{}.{}", def.name, attr.name);
            let kind = match (&attr.derived, &attr.static_value) {
                (Some(_), Some(_)) => {
                    return Err(SchemaError::invalid_model(format!(
                        "attribute '{qualified}' cannot be both derived and static"
                    )))
                }
                (Some(expression), None) => AttributeKind::Derived {
                    expression: expression.clone(),
                },
                (None, Some(json)) => AttributeKind::Static {
                    value: typed_json(json, &attr.data_type, &qualified)?,
                },
                (None, None) => AttributeKind::Stored,
            };
            let default = attr
                .default
                .as_ref()
                .map(|json| typed_json(json, &attr.data_type, &qualified))
                .transpose()?;

            let id = AttributeId(self.attributes.len() as u32);
            self.attributes.push(Attribute {
                id,
                name: attr.name.clone(),
                owner,
                data_type: attr.data_type.clone(),
                lower: attr.lower,
                default,
                kind,
            });
            self.entities[owner.index()].attributes.push(id);
        }
        Ok(())
    }

    fn load_reference(
        &mut self,
        owner: EntityTypeId,
        def: &ReferenceDefinition,
    ) -> Result<ReferenceId, SchemaError> {
        let qualified = format!("{}.{}", self.entities[owner.index()].name, def.name);
        let target = self.lookup(&def.target)?;
        let upper = match def.upper {
            -1 => None,
            n if n >= 1 && n <= u32::MAX as i64 => Some(n as u32),
            n => {
                return Err(SchemaError::invalid_model(format!(
                    "reference '{qualified}' has invalid upper bound {n}"
                )))
            }
        };
        if upper.is_some_and(|u| def.lower > u) {
            return Err(SchemaError::invalid_model(format!(
                "reference '{qualified}' has lower bound above upper bound"
            )));
        }
        if def.containment && def.derived {
            return Err(SchemaError::invalid_model(format!(
                "containment '{qualified}' cannot be derived"
            )));
        }

        let id = ReferenceId(self.references.len() as u32);
        self.references.push(Reference {
            id,
            name: def.name.clone(),
            owner,
            target,
            multiplicity: Multiplicity {
                lower: def.lower,
                upper,
            },
            containment: def.containment,
            derived: def.derived,
            opposite: None,
            embedded: def.embedded,
            range: def.range.clone(),
        });
        self.entities[owner.index()].references.push(id);
        Ok(id)
    }

    fn check_opposite(&self, id: ReferenceId) -> Result<(), SchemaError> {
        let reference = &self.references[id.index()];
        let Some(opposite_id) = reference.opposite else {
            return Ok(());
        };
        let opposite = &self.references[opposite_id.index()];
        if opposite.opposite.is_some_and(|back| back != id) {
            return Err(SchemaError::invalid_model(format!(
                "opposites of '{}' and '{}' are not mutual",
                self.qualified_name(id),
                self.qualified_name(opposite_id)
            )));
        }
        if reference.containment && opposite.containment {
            return Err(SchemaError::invalid_model(format!(
                "'{}' and its opposite are both containments",
                self.qualified_name(id)
            )));
        }
        if !self.is_subtype_of(reference.owner, opposite.target)
            && !self.is_subtype_of(opposite.target, reference.owner)
        {
            return Err(SchemaError::invalid_model(format!(
                "opposite of '{}' does not point back to its owner",
                self.qualified_name(id)
            )));
        }
        Ok(())
    }

    fn check_unique_feature_names(&self, entity: EntityTypeId) -> Result<(), SchemaError> {
        let mut seen: FxHashMap<&str, ()> = FxHashMap::default();
        let names = self
            .all_attributes(entity)
            .into_iter()
            .map(|a| self.attribute(a).name.as_str())
            .chain(
                self.all_references(entity)
                    .into_iter()
                    .map(|r| self.reference(r).name.as_str()),
            );
        for name in names {
            if seen.insert(name, ()).is_some() {
                return Err(SchemaError::invalid_model(format!(
                    "feature '{}' is declared twice in the lineage of '{}'",
                    name,
                    self.entity(entity).name
                )));
            }
        }
        Ok(())
    }

    // ---- Lookup ----

    pub fn entity(&self, id: EntityTypeId) -> &EntityType {
        &self.entities[id.index()]
    }

    pub fn attribute(&self, id: AttributeId) -> &Attribute {
        &self.attributes[id.index()]
    }

    pub fn reference(&self, id: ReferenceId) -> &Reference {
        &self.references[id.index()]
    }

    pub fn entity_by_name(&self, name: &str) -> Result<&EntityType, SchemaError> {
        self.lookup(name).map(|id| self.entity(id))
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityType> {
        self.entities.iter()
    }

    pub fn references(&self) -> impl Iterator<Item = &Reference> {
        self.references.iter()
    }

    /// Supertypes of `entity`, nearest first.
    pub fn ancestors(&self, entity: EntityTypeId) -> Vec<EntityTypeId> {
        let mut out = Vec::new();
        let mut current = self.entity(entity).supertype;
        while let Some(id) = current {
            out.push(id);
            current = self.entity(id).supertype;
        }
        out
    }

    /// Root supertype first, `entity` last.
    pub fn lineage(&self, entity: EntityTypeId) -> Vec<EntityTypeId> {
        let mut out = self.ancestors(entity);
        out.reverse();
        out.push(entity);
        out
    }

    /// Reflexive subtype test.
    pub fn is_subtype_of(&self, entity: EntityTypeId, supertype: EntityTypeId) -> bool {
        entity == supertype || self.ancestors(entity).contains(&supertype)
    }

    /// Direct and indirect subtypes of `entity`, excluding itself.
    pub fn subtypes_of(&self, entity: EntityTypeId) -> Vec<EntityTypeId> {
        self.entities
            .iter()
            .filter(|e| e.id != entity && self.is_subtype_of(e.id, entity))
            .map(|e| e.id)
            .collect()
    }

    /// Attributes visible on `entity`, inherited ones first.
    pub fn all_attributes(&self, entity: EntityTypeId) -> Vec<AttributeId> {
        self.lineage(entity)
            .into_iter()
            .flat_map(|id| self.entity(id).attributes.iter().copied())
            .collect()
    }

    /// References visible on `entity`, inherited ones first.
    pub fn all_references(&self, entity: EntityTypeId) -> Vec<ReferenceId> {
        self.lineage(entity)
            .into_iter()
            .flat_map(|id| self.entity(id).references.iter().copied())
            .collect()
    }

    pub fn find_attribute(&self, entity: EntityTypeId, name: &str) -> Option<AttributeId> {
        self.all_attributes(entity)
            .into_iter()
            .find(|id| self.attribute(*id).name == name)
    }

    pub fn find_reference(&self, entity: EntityTypeId, name: &str) -> Option<ReferenceId> {
        self.all_references(entity)
            .into_iter()
            .find(|id| self.reference(*id).name == name)
    }

    /// References whose target is `entity` or one of its supertypes.
    pub fn references_targeting(&self, entity: EntityTypeId) -> Vec<ReferenceId> {
        self.references
            .iter()
            .filter(|r| self.is_subtype_of(entity, r.target))
            .map(|r| r.id)
            .collect()
    }

    /// Containments that can hold instances of `entity`.
    pub fn containers_of(&self, entity: EntityTypeId) -> Vec<ReferenceId> {
        self.references_targeting(entity)
            .into_iter()
            .filter(|id| self.reference(*id).containment)
            .collect()
    }

    /// `Owner.feature` form used in diagnostics.
    pub fn qualified_name(&self, reference: ReferenceId) -> String {
        let r = self.reference(reference);
        format!("{}.{}", self.entity(r.owner).name, r.name)
    }

    pub fn qualified_attribute_name(&self, attribute: AttributeId) -> String {
        let a = self.attribute(attribute);
        format!("{}.{}", self.entity(a.owner).name, a.name)
    }
}

fn typed_json(
    json: &serde_json::Value,
    data_type: &super::DataType,
    qualified: &str,
) -> Result<Value, SchemaError> {
    let raw = json_to_value(json)
        .filter(Value::is_scalar)
        .ok_or_else(|| SchemaError::invalid_model(format!("'{qualified}' has a non-scalar constant")))?;
    coerce(&raw, data_type)
        .map_err(|reason| SchemaError::invalid_model(format!("'{qualified}': {reason}")))
}
