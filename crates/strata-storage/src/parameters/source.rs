//! Named parameter source bound to rusqlite statements.

use indexmap::IndexMap;
use rusqlite::types::ToSql;

use super::Parameter;

/// Ordered name → parameter map. Names are bound as `:name`.
#[derive(Debug, Clone, Default)]
pub struct ParameterSource {
    params: IndexMap<String, Parameter>,
}

impl ParameterSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter; a later parameter with the same name replaces the earlier one.
    pub fn add(&mut self, parameter: Parameter) -> &mut Self {
        self.params
            .insert(format!(":{}", parameter.name), parameter);
        self
    }

    /// Add every parameter of a list and return the `(:p_0, :p_1, ...)` placeholder group.
    pub fn add_list(&mut self, parameters: Vec<Parameter>) -> String {
        let names: Vec<String> = parameters.iter().map(|p| format!(":{}", p.name)).collect();
        for p in parameters {
            self.add(p);
        }
        format!("({})", names.join(", "))
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.get(&format!(":{name}"))
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Borrowed named parameters in insertion order, ready for `query`/`execute`.
    pub fn as_named(&self) -> Vec<(&str, &dyn ToSql)> {
        self.params
            .iter()
            .map(|(name, p)| (name.as_str(), &p.value as &dyn ToSql))
            .collect()
    }
}

/// Split an id list into chunks no longer than `max`.
pub fn chunked<T>(items: &[T], max: usize) -> impl Iterator<Item = &[T]> {
    items.chunks(max.max(1))
}
