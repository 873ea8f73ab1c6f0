//! Dispatcher: routes named operation calls to CRUD primitives or SDK handlers.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::Value as Json;
use strata_core::constants::keys as payload_keys;
use strata_core::errors::{DispatchError, PersistenceError, StatementError, StrataErrorCode};
use strata_core::payload::{Id, Payload, Value};
use strata_core::query::{Page, QueryCustomizer};
use strata_core::traits::EntityStore;
use strata_core::Model;

use crate::collaborators::{map_identifiers, Actor, Collaborators};
use crate::exchange::Exchange;
use crate::fault::{business_fault, Fault, FaultType};
use crate::operation::{Behavior, CrudPrimitive, OperationContext, OperationDefinition};

/// Registry of operations over one store and its model.
pub struct Dispatcher {
    store: Arc<dyn EntityStore>,
    model: Arc<Model>,
    collaborators: Collaborators,
    operations: FxHashMap<String, OperationDefinition>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn EntityStore>, model: Arc<Model>) -> Self {
        Self::with_collaborators(store, model, Collaborators::default())
    }

    pub fn with_collaborators(
        store: Arc<dyn EntityStore>,
        model: Arc<Model>,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            store,
            model,
            collaborators,
            operations: FxHashMap::default(),
        }
    }

    /// Register an operation, returning the one it replaces.
    pub fn register(&mut self, definition: OperationDefinition) -> Option<OperationDefinition> {
        let replaced = self.operations.insert(definition.name.clone(), definition);
        if let Some(old) = &replaced {
            tracing::warn!(operation = %old.name, "operation re-registered");
        }
        replaced
    }

    /// Register the standard CRUD operations of `entity`, plus reference
    /// maintenance and range lookups for each of its mutable references.
    ///
    /// Returns the number of operations registered.
    pub fn register_crud(&mut self, entity: &str) -> Result<usize, DispatchError> {
        let entity_type = self
            .model
            .entity_by_name(entity)
            .map_err(PersistenceError::from)?
            .id;
        let mut primitives = vec![
            CrudPrimitive::GetByIdentifier,
            CrudPrimitive::Search,
            CrudPrimitive::Count,
            CrudPrimitive::Create,
            CrudPrimitive::Update,
            CrudPrimitive::Delete,
            CrudPrimitive::Template,
        ];
        for reference in self.model.all_references(entity_type) {
            let reference = self.model.reference(reference);
            if reference.containment || reference.derived {
                continue;
            }
            let name = reference.name.clone();
            primitives.extend([
                CrudPrimitive::SetReference { reference: name.clone() },
                CrudPrimitive::AddReferences { reference: name.clone() },
                CrudPrimitive::RemoveReferences { reference: name.clone() },
                CrudPrimitive::GetRangeOf { reference: name.clone() },
                CrudPrimitive::CountRangeOf { reference: name },
            ]);
        }
        let count = primitives.len();
        for primitive in primitives {
            self.register(OperationDefinition::crud(entity, primitive));
        }
        tracing::debug!(entity, count, "registered crud operations");
        Ok(count)
    }

    pub fn operation(&self, name: &str) -> Option<&OperationDefinition> {
        self.operations.get(name)
    }

    pub fn operation_count(&self) -> usize {
        self.operations.len()
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    /// Call an operation from inside the runtime; internal operations are allowed.
    ///
    /// The result payload holds the behavior result under the operation's output name.
    pub fn call(&self, name: &str, exchange: Exchange) -> Result<Payload, DispatchError> {
        let definition = self
            .operations
            .get(name)
            .ok_or_else(|| DispatchError::UnknownOperation {
                name: name.to_string(),
            })?;
        self.invoke(definition, exchange)
    }

    /// Call an exposed operation on behalf of an external caller.
    ///
    /// Never fails: errors come back as `{"__fault": {type, errorCode, cause, details}}`.
    pub fn call_external(&self, name: &str, exchange: Exchange) -> Json {
        let result = match self.operations.get(name) {
            None => Err(DispatchError::UnknownOperation {
                name: name.to_string(),
            }),
            Some(definition) if !definition.exposed => Err(DispatchError::OperationNotExposed {
                name: name.to_string(),
            }),
            Some(definition) => self
                .invoke(definition, exchange)
                .map(|payload| self.collaborators.converter.to_response(definition, &payload)),
        };
        match result {
            Ok(json) => json,
            Err(err) => {
                let fault = Fault::from_error(&err);
                match fault.fault_type {
                    FaultType::Server => {
                        tracing::error!(operation = name, error = %err, "operation failed")
                    }
                    _ => tracing::info!(
                        operation = name,
                        code = err.error_code(),
                        "operation rejected"
                    ),
                }
                let mut body = serde_json::Map::new();
                body.insert(payload_keys::FAULT.to_string(), fault.to_json());
                Json::Object(body)
            }
        }
    }

    fn invoke(&self, definition: &OperationDefinition, exchange: Exchange) -> Result<Payload, DispatchError> {
        let _span = tracing::info_span!("strata.dispatch", operation = %definition.name).entered();

        let actor = self
            .collaborators
            .actors
            .resolve(exchange.actor.as_deref(), exchange.principal.as_deref())?;
        let entity = self.resolve_entity(definition, &exchange)?;
        let instance = match (&exchange.instance, definition.bound) {
            (Some(id), true) => {
                let entity = entity
                    .as_deref()
                    .ok_or_else(|| invalid(definition, "bound operation without an entity type"))?;
                Some(self.verify(entity, id)?)
            }
            (None, true) => return Err(invalid(definition, "bound operation needs an instance identifier")),
            (_, false) => None,
        };

        let mut request = self
            .collaborators
            .converter
            .to_request(definition, &exchange.parameters)
            .map_err(|e| with_operation(e, definition))?;
        if let Some(entity) = entity.as_deref() {
            let input_entity = self.input_entity(definition, entity);
            let mut verify = |e: &str, id: &Id| self.verify(e, id);
            for nested in request.nested_mut(&definition.input) {
                map_identifiers(&self.model, &input_entity, nested, &mut verify)?;
            }
        }

        let result = match &definition.behavior {
            Behavior::Crud(primitive) => {
                let entity = entity
                    .as_deref()
                    .ok_or_else(|| invalid(definition, "no entity type given"))?;
                let input = request.remove(&definition.input);
                self.run_crud(
                    definition,
                    primitive,
                    entity,
                    instance.as_ref(),
                    input,
                    exchange.customizer.as_ref(),
                )?
            }
            Behavior::Sdk(handler) => {
                let context = OperationContext {
                    operation: definition,
                    store: self.store.as_ref(),
                    model: &self.model,
                    entity: entity.as_deref(),
                    instance: instance.as_ref(),
                    actor: actor.as_ref(),
                    customizer: exchange.customizer.as_ref(),
                };
                let result = handler.invoke(&context, request)?;
                if let Some(fault) = business_fault(&result) {
                    return Err(fault);
                }
                let mut result = result;
                self.sign_value(entity.as_deref(), &mut result)?;
                result
            }
        };

        tracing::debug!(actor = ?actor.as_ref().map(|a: &Actor| a.name.as_str()), "operation completed");
        Ok(Payload::new().with(&definition.output, result))
    }

    fn resolve_entity(
        &self,
        definition: &OperationDefinition,
        exchange: &Exchange,
    ) -> Result<Option<String>, DispatchError> {
        let name = match (&definition.entity, &exchange.entity_type) {
            (Some(declared), Some(requested)) if declared != requested => {
                let declared_id = self.entity_id(declared)?;
                let requested_id = self.entity_id(requested)?;
                if !self.model.is_subtype_of(requested_id, declared_id) {
                    return Err(invalid(
                        definition,
                        &format!("'{requested}' is not a subtype of '{declared}'"),
                    ));
                }
                Some(requested.clone())
            }
            (Some(declared), _) => Some(declared.clone()),
            (None, requested) => requested.clone(),
        };
        if let Some(name) = &name {
            self.entity_id(name)?;
        }
        Ok(name)
    }

    fn entity_id(&self, name: &str) -> Result<strata_core::EntityTypeId, DispatchError> {
        Ok(self
            .model
            .entity_by_name(name)
            .map_err(PersistenceError::from)?
            .id)
    }

    /// Entity the input payloads of `definition` belong to.
    fn input_entity(&self, definition: &OperationDefinition, entity: &str) -> String {
        let reference = match &definition.behavior {
            Behavior::Crud(
                CrudPrimitive::SetReference { reference }
                | CrudPrimitive::AddReferences { reference }
                | CrudPrimitive::RemoveReferences { reference },
            ) => reference,
            _ => return entity.to_string(),
        };
        self.target_of(entity, reference).unwrap_or_else(|| entity.to_string())
    }

    fn target_of(&self, entity: &str, reference: &str) -> Option<String> {
        let entity_type = self.model.entity_by_name(entity).ok()?.id;
        let reference = self.model.find_reference(entity_type, reference)?;
        Some(self.model.entity(self.model.reference(reference).target).name.clone())
    }

    fn verify(&self, entity: &str, id: &Id) -> Result<Id, DispatchError> {
        self.collaborators.signer.verify(entity, id)
    }

    fn sign_payload(&self, entity: &str, payload: &mut Payload) -> Result<(), DispatchError> {
        let signer = &self.collaborators.signer;
        map_identifiers(&self.model, entity, payload, &mut |e: &str, id: &Id| Ok(signer.sign(e, id)))
    }

    fn sign_value(&self, entity: Option<&str>, value: &mut Value) -> Result<(), DispatchError> {
        match value {
            Value::Payload(p) => {
                if let Some(entity) = p.type_name().map(str::to_string).or(entity.map(str::to_string)) {
                    self.sign_payload(&entity, p)?;
                }
            }
            Value::List(items) => {
                for item in items {
                    if let Some(entity) = item.type_name().map(str::to_string).or(entity.map(str::to_string)) {
                        self.sign_payload(&entity, item)?;
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn page_value(&self, entity: &str, page: Page<Payload>) -> Result<Value, DispatchError> {
        let mut items = page.items;
        for item in &mut items {
            self.sign_payload(entity, item)?;
        }
        let cursor = page.next_cursor.map_or(Value::Null, Value::Text);
        Ok(Value::Payload(Box::new(
            Payload::new()
                .with("items", items)
                .with("hasMore", page.has_more)
                .with("nextCursor", cursor),
        )))
    }

    fn run_crud(
        &self,
        definition: &OperationDefinition,
        primitive: &CrudPrimitive,
        entity: &str,
        instance: Option<&Id>,
        input: Option<Value>,
        customizer: Option<&QueryCustomizer>,
    ) -> Result<Value, DispatchError> {
        let store = self.store.as_ref();
        let default_customizer = QueryCustomizer::default();
        let customizer_or_default = customizer.unwrap_or(&default_customizer);
        let filter = customizer.and_then(|c| c.filter.as_ref());
        let needs_instance = || instance.ok_or_else(|| invalid(definition, "no instance identifier given"));

        let value = match primitive {
            CrudPrimitive::GetByIdentifier => {
                let id = needs_instance()?;
                let mut found = store.get_by_identifier(entity, id, customizer)?.ok_or_else(|| {
                    PersistenceError::from(StatementError::ConstraintNotFound {
                        entity: entity.to_string(),
                        id: id.to_string(),
                    })
                })?;
                self.sign_payload(entity, &mut found)?;
                Value::Payload(Box::new(found))
            }
            CrudPrimitive::Search => self.page_value(entity, store.search(entity, customizer_or_default)?)?,
            CrudPrimitive::Count => Value::Integer(count_value(store.count(entity, filter)?)),
            CrudPrimitive::Create => {
                let payload = single_payload(definition, input)?;
                let mut created = store.create(entity, payload)?;
                self.sign_payload(entity, &mut created)?;
                Value::Payload(Box::new(created))
            }
            CrudPrimitive::Update => {
                let mut payload = single_payload(definition, input)?;
                if let Some(id) = instance {
                    payload.set_id(id);
                }
                let mut updated = store.update(entity, payload)?;
                self.sign_payload(entity, &mut updated)?;
                Value::Payload(Box::new(updated))
            }
            CrudPrimitive::Delete => {
                let id = needs_instance()?;
                Value::Integer(store.delete(entity, std::slice::from_ref(id))? as i64)
            }
            CrudPrimitive::SetReference { reference } => {
                let targets = target_ids(definition, input)?;
                store.set_reference(entity, reference, needs_instance()?, &targets)?;
                Value::Null
            }
            CrudPrimitive::AddReferences { reference } => {
                let targets = target_ids(definition, input)?;
                store.add_references(entity, reference, needs_instance()?, &targets)?;
                Value::Null
            }
            CrudPrimitive::RemoveReferences { reference } => {
                let targets = target_ids(definition, input)?;
                store.remove_references(entity, reference, needs_instance()?, &targets)?;
                Value::Null
            }
            CrudPrimitive::GetRangeOf { reference } => {
                let page = store.get_range_of(entity, reference, customizer_or_default)?;
                let target = self.target_of(entity, reference).unwrap_or_else(|| entity.to_string());
                self.page_value(&target, page)?
            }
            CrudPrimitive::CountRangeOf { reference } => {
                Value::Integer(count_value(store.count_range_of(entity, reference, filter)?))
            }
            CrudPrimitive::Template => Value::Payload(Box::new(store.template(entity)?)),
        };
        Ok(value)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("operations", &self.operations.len())
            .finish_non_exhaustive()
    }
}

fn count_value(count: u64) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

fn single_payload(definition: &OperationDefinition, input: Option<Value>) -> Result<Payload, DispatchError> {
    match input {
        Some(Value::Payload(p)) => Ok(*p),
        _ => Err(invalid(
            definition,
            &format!("'{}' must be a single object", definition.input),
        )),
    }
}

/// Identifiers of the reference stubs passed as input; absent input means none.
fn target_ids(definition: &OperationDefinition, input: Option<Value>) -> Result<Vec<Id>, DispatchError> {
    let stubs = match input {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Payload(p)) => vec![*p],
        Some(Value::List(items)) => items,
        Some(other) => {
            return Err(invalid(
                definition,
                &format!("'{}' must hold reference stubs, got {}", definition.input, other.kind_name()),
            ))
        }
    };
    stubs
        .iter()
        .map(|stub| {
            stub.id()
                .ok_or_else(|| invalid(definition, "reference stub without an identifier"))
        })
        .collect()
}

fn invalid(definition: &OperationDefinition, message: &str) -> DispatchError {
    DispatchError::InvalidInput {
        operation: definition.name.clone(),
        message: message.to_string(),
    }
}

fn with_operation(err: DispatchError, definition: &OperationDefinition) -> DispatchError {
    match err {
        DispatchError::InvalidInput { operation, message } if operation.is_empty() => {
            DispatchError::InvalidInput {
                operation: definition.name.clone(),
                message,
            }
        }
        other => other,
    }
}
