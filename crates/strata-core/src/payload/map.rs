//! The ordered payload map.

use indexmap::IndexMap;

use super::{Id, Value};
use crate::constants::keys;

/// An ordered key → value mapping representing one instance.
///
/// Attribute and reference values sit next to the reserved framework keys
/// (`__id`, `__version`, `__type`, ...). Key order is insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
    entries: IndexMap<String, Value>,
}

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    /// A payload carrying only the type discriminator.
    pub fn of_type(entity_name: &str) -> Self {
        let mut payload = Self::new();
        payload.insert(keys::TYPE, Value::Text(entity_name.to_string()));
        payload
    }

    /// A reference stub: identifier only.
    pub fn stub(id: &Id) -> Self {
        let mut payload = Self::new();
        payload.set_id(id);
        payload
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.insert(key, value.into());
        self
    }

    pub fn insert(&mut self, key: &str, value: Value) -> Option<Value> {
        self.entries.insert(key.to_string(), value)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.entries.get_mut(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// True when `key` is present with a non-null value.
    pub fn has_value(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| !v.is_null())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut Value)> {
        self.entries.iter_mut()
    }

    /// Non-reserved entries.
    pub fn features(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter().filter(|(k, _)| !keys::is_reserved(k))
    }

    // ---- Reserved keys ----

    pub fn id(&self) -> Option<Id> {
        self.get(keys::ID).and_then(Id::from_value)
    }

    pub fn set_id(&mut self, id: &Id) {
        self.insert(keys::ID, id.to_value());
    }

    pub fn version(&self) -> Option<i64> {
        self.get(keys::VERSION).and_then(Value::as_i64)
    }

    pub fn set_version(&mut self, version: i64) {
        self.insert(keys::VERSION, Value::Integer(version));
    }

    pub fn type_name(&self) -> Option<&str> {
        self.get(keys::TYPE).and_then(Value::as_str)
    }

    pub fn client_reference_id(&self) -> Option<&str> {
        self.get(keys::CLIENT_REFERENCE_ID).and_then(Value::as_str)
    }

    pub fn is_created(&self) -> bool {
        self.get(keys::CREATED)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn is_immutable(&self) -> bool {
        self.get(keys::IMMUTABLE)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    // ---- Nested instances ----

    /// Nested payloads stored under `key`, for single or many references.
    pub fn nested(&self, key: &str) -> Vec<&Payload> {
        self.get(key).map(Value::payloads).unwrap_or_default()
    }

    /// Mutable access to every nested payload under `key`.
    pub fn nested_mut(&mut self, key: &str) -> Vec<&mut Payload> {
        match self.entries.get_mut(key) {
            Some(Value::Payload(p)) => vec![p.as_mut()],
            Some(Value::List(items)) => items.iter_mut().collect(),
            _ => Vec::new(),
        }
    }

    /// Visit this payload and every nested payload, depth first.
    pub fn walk_mut(&mut self, f: &mut dyn FnMut(&mut Payload)) {
        f(self);
        for (_, value) in self.entries.iter_mut() {
            match value {
                Value::Payload(p) => p.walk_mut(f),
                Value::List(items) => {
                    for item in items {
                        item.walk_mut(f);
                    }
                }
                _ => {}
            }
        }
    }
}

impl FromIterator<(String, Value)> for Payload {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Payload {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
