//! The inbound side of an operation call.

use serde_json::{Map, Value as Json};
use strata_core::errors::DispatchError;
use strata_core::payload::Id;
use strata_core::query::QueryCustomizer;

/// Reserved exchange keys. Everything else in an exchange object is a parameter.
pub mod keys {
    pub const ACTOR: &str = "__actor";
    pub const PRINCIPAL: &str = "__principal";
    /// Signed identifier of the instance a bound operation runs on.
    pub const INSTANCE: &str = "__instance";
    /// Entity-type discriminator for unbound generic operations.
    pub const TYPE: &str = "__type";
    pub const CUSTOMIZER: &str = "__customizer";
}

/// Raw request parameters plus the framework-reserved values that travel with them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Exchange {
    pub parameters: Map<String, Json>,
    pub actor: Option<String>,
    pub principal: Option<String>,
    pub instance: Option<Id>,
    pub entity_type: Option<String>,
    pub customizer: Option<QueryCustomizer>,
}

impl Exchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split a JSON object into reserved keys and parameters.
    pub fn from_json(json: Json) -> Result<Self, DispatchError> {
        let Json::Object(mut map) = json else {
            return Err(invalid("exchange must be a JSON object"));
        };
        let actor = take_string(&mut map, keys::ACTOR)?;
        let principal = take_string(&mut map, keys::PRINCIPAL)?;
        let entity_type = take_string(&mut map, keys::TYPE)?;
        let instance = match map.remove(keys::INSTANCE) {
            None | Some(Json::Null) => None,
            Some(Json::Number(n)) => Some(Id::Int(
                n.as_i64().ok_or_else(|| invalid("instance id is not an integer"))?,
            )),
            Some(Json::String(s)) => Some(Id::Text(s)),
            Some(_) => return Err(invalid("instance id must be a number or a string")),
        };
        let customizer = match map.remove(keys::CUSTOMIZER) {
            None | Some(Json::Null) => None,
            Some(raw) => Some(
                serde_json::from_value(raw).map_err(|e| invalid(&format!("bad customizer: {e}")))?,
            ),
        };
        Ok(Self {
            parameters: map,
            actor,
            principal,
            instance,
            entity_type,
            customizer,
        })
    }

    pub fn with_parameter(mut self, name: &str, value: impl Into<Json>) -> Self {
        self.parameters.insert(name.to_string(), value.into());
        self
    }

    pub fn with_actor(mut self, actor: &str) -> Self {
        self.actor = Some(actor.to_string());
        self
    }

    pub fn with_instance(mut self, id: Id) -> Self {
        self.instance = Some(id);
        self
    }

    pub fn with_entity_type(mut self, entity: &str) -> Self {
        self.entity_type = Some(entity.to_string());
        self
    }

    pub fn with_customizer(mut self, customizer: QueryCustomizer) -> Self {
        self.customizer = Some(customizer);
        self
    }
}

fn take_string(map: &mut Map<String, Json>, key: &str) -> Result<Option<String>, DispatchError> {
    match map.remove(key) {
        None | Some(Json::Null) => Ok(None),
        Some(Json::String(s)) => Ok(Some(s)),
        Some(_) => Err(invalid(&format!("'{key}' must be a string"))),
    }
}

fn invalid(message: &str) -> DispatchError {
    DispatchError::InvalidInput {
        operation: String::new(),
        message: message.to_string(),
    }
}
