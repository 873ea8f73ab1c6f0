//! Seams for the collaborators around dispatch: payload conversion, identifier
//! signing and actor resolution.
//!
//! Every method has a pass-through default, so implementations only override
//! what they care about.

use std::sync::Arc;

use serde_json::{Map, Value as Json};
use strata_core::errors::DispatchError;
use strata_core::payload::{Id, Payload, Value};

use crate::operation::OperationDefinition;

/// The caller an operation runs for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub name: String,
    pub principal: Option<String>,
}

/// Converts request parameters into a payload and results back into JSON.
pub trait PayloadConverter: Send + Sync {
    fn to_request(
        &self,
        operation: &OperationDefinition,
        parameters: &Map<String, Json>,
    ) -> Result<Payload, DispatchError> {
        Payload::from_json(&Json::Object(parameters.clone())).ok_or_else(|| {
            DispatchError::InvalidInput {
                operation: operation.name.clone(),
                message: "parameters must be objects, arrays of objects or scalars".to_string(),
            }
        })
    }

    fn to_response(&self, _operation: &OperationDefinition, result: &Payload) -> Json {
        result.to_json()
    }
}

/// Verifies identifiers arriving from callers and signs identifiers leaving.
pub trait IdentifierSigner: Send + Sync {
    fn verify(&self, _entity: &str, id: &Id) -> Result<Id, DispatchError> {
        Ok(id.clone())
    }

    fn sign(&self, _entity: &str, id: &Id) -> Id {
        id.clone()
    }
}

/// Resolves the reserved actor and principal values into an [`Actor`].
pub trait ActorResolver: Send + Sync {
    fn resolve(
        &self,
        actor: Option<&str>,
        principal: Option<&str>,
    ) -> Result<Option<Actor>, DispatchError> {
        Ok(actor.map(|name| Actor {
            name: name.to_string(),
            principal: principal.map(str::to_string),
        }))
    }
}

/// Pass-through implementation of every collaborator.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThrough;

impl PayloadConverter for PassThrough {}
impl IdentifierSigner for PassThrough {}
impl ActorResolver for PassThrough {}

/// The collaborator set a dispatcher is built with.
#[derive(Clone)]
pub struct Collaborators {
    pub converter: Arc<dyn PayloadConverter>,
    pub signer: Arc<dyn IdentifierSigner>,
    pub actors: Arc<dyn ActorResolver>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            converter: Arc::new(PassThrough),
            signer: Arc::new(PassThrough),
            actors: Arc::new(PassThrough),
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Apply `f` to the identifier of `payload` and of every nested payload,
/// passing the entity name each one belongs to.
///
/// The entity of a nested payload is its `__type` when present, else the
/// target of the reference it sits under.
pub(crate) fn map_identifiers<F>(
    model: &strata_core::Model,
    entity: &str,
    payload: &mut Payload,
    f: &mut F,
) -> Result<(), DispatchError>
where
    F: FnMut(&str, &Id) -> Result<Id, DispatchError>,
{
    let entity = payload.type_name().unwrap_or(entity).to_string();
    if let Some(id) = payload.id() {
        let mapped = f(&entity, &id)?;
        payload.set_id(&mapped);
    }
    let Ok(entity_type) = model.entity_by_name(&entity) else {
        return Ok(());
    };
    let entity_type = entity_type.id;
    let keys: Vec<String> = payload
        .features()
        .filter(|(_, v)| matches!(v, Value::Payload(_) | Value::List(_)))
        .map(|(k, _)| k.clone())
        .collect();
    for key in keys {
        let Some(reference) = model.find_reference(entity_type, &key) else {
            continue;
        };
        let target = model.entity(model.reference(reference).target).name.clone();
        for nested in payload.nested_mut(&key) {
            map_identifiers(model, &target, nested, f)?;
        }
    }
    Ok(())
}
