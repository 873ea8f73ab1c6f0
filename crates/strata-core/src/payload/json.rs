//! JSON interchange for payloads.
//!
//! External callers exchange `serde_json` documents; typing against declared
//! datatypes happens later, in the parameter mapper.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{Map, Number, Value as Json};

use super::{Payload, Value};

impl Payload {
    /// Convert a JSON object into a payload. Returns `None` for non-objects.
    ///
    /// Arrays must hold objects (many references); scalar arrays are rejected.
    pub fn from_json(json: &Json) -> Option<Self> {
        let Json::Object(map) = json else {
            return None;
        };
        let mut payload = Payload::new();
        for (key, value) in map {
            payload.insert(key, json_to_value(value)?);
        }
        Some(payload)
    }

    /// Convert the payload into a JSON object.
    pub fn to_json(&self) -> Json {
        let mut map = Map::new();
        for (key, value) in self.iter() {
            map.insert(key.clone(), value_to_json(value));
        }
        Json::Object(map)
    }
}

/// Convert a JSON value into an untyped payload value.
pub fn json_to_value(json: &Json) -> Option<Value> {
    Some(match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Real(n.as_f64()?),
        },
        Json::String(s) => Value::Text(s.clone()),
        Json::Object(_) => Value::Payload(Box::new(Payload::from_json(json)?)),
        Json::Array(items) => {
            let mut payloads = Vec::with_capacity(items.len());
            for item in items {
                payloads.push(Payload::from_json(item)?);
            }
            Value::List(payloads)
        }
    })
}

/// Render a single value as JSON.
pub fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Integer(i) => Json::Number((*i).into()),
        Value::Real(f) => Number::from_f64(*f).map_or(Json::Null, Json::Number),
        Value::BigInteger(b) => Json::String(b.to_string()),
        Value::Decimal(d) => Json::String(d.to_string()),
        Value::Text(s) | Value::Enum { literal: s, .. } => Json::String(s.clone()),
        Value::Date(d) => Json::String(d.format("%Y-%m-%d").to_string()),
        Value::Time(t) => Json::String(t.format("%H:%M:%S%.f").to_string()),
        Value::Timestamp(t) => Json::String(t.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
        Value::ZonedTimestamp(t) => Json::String(t.to_rfc3339()),
        Value::Binary(bytes) => Json::String(STANDARD.encode(bytes)),
        Value::Payload(p) => p.to_json(),
        Value::List(items) => Json::Array(items.iter().map(Payload::to_json).collect()),
    }
}
