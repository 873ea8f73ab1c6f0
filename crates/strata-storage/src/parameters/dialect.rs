//! Ordered RDBMS type-name rules, with per-dialect overrides.
//!
//! The mapper tests a value against the rules in order and uses the first
//! match. Dialects replace individual named entries; the dispatch loop never changes.

use std::fmt;
use std::sync::Arc;

use strata_core::model::DataType;
use strata_core::payload::Value;

/// Inputs visible to a type-name rule.
#[derive(Debug, Clone, Copy)]
pub struct TypeNameInput<'a> {
    pub value: &'a Value,
    pub declared: Option<&'a DataType>,
    pub varchar_length: u32,
}

type Predicate = Arc<dyn Fn(&TypeNameInput<'_>) -> bool + Send + Sync>;
type Namer = Arc<dyn Fn(&TypeNameInput<'_>) -> String + Send + Sync>;

/// A `(predicate, type-name function)` pair identified by name.
#[derive(Clone)]
pub struct TypeNameRule {
    pub name: &'static str,
    applies: Predicate,
    type_name: Namer,
}

impl fmt::Debug for TypeNameRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeNameRule").field("name", &self.name).finish()
    }
}

impl TypeNameRule {
    pub fn new(
        name: &'static str,
        applies: impl Fn(&TypeNameInput<'_>) -> bool + Send + Sync + 'static,
        type_name: impl Fn(&TypeNameInput<'_>) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            applies: Arc::new(applies),
            type_name: Arc::new(type_name),
        }
    }

    pub fn applies(&self, input: &TypeNameInput<'_>) -> bool {
        (self.applies)(input)
    }

    pub fn type_name(&self, input: &TypeNameInput<'_>) -> String {
        (self.type_name)(input)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dialect {
    #[default]
    Sqlite,
    Postgres,
}

impl Dialect {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sqlite" => Some(Self::Sqlite),
            "postgres" | "postgresql" => Some(Self::Postgres),
            _ => None,
        }
    }

    /// The ordered rule table for this dialect.
    pub fn type_name_rules(self) -> Vec<TypeNameRule> {
        let mut rules = base_rules();
        if self == Self::Postgres {
            replace(&mut rules, TypeNameRule::new("string", is_string, |_| "TEXT".into()));
            replace(
                &mut rules,
                TypeNameRule::new("timestamp", is_timestamp, |_| "TIMESTAMPTZ".into()),
            );
            replace(
                &mut rules,
                TypeNameRule::new("timestamp_tz", is_zoned_timestamp, |_| "TIMESTAMPTZ".into()),
            );
            replace(&mut rules, TypeNameRule::new("binary", is_binary, |_| "BYTEA".into()));
        }
        rules
    }
}

/// Swap the entry named like `rule`, keeping its position.
pub fn replace(rules: &mut [TypeNameRule], rule: TypeNameRule) {
    if let Some(slot) = rules.iter_mut().find(|r| r.name == rule.name) {
        *slot = rule;
    }
}

fn base_rules() -> Vec<TypeNameRule> {
    vec![
        TypeNameRule::new("decimal", is_decimal, decimal_type_name),
        TypeNameRule::new("big_integer", is_big_integer, big_integer_type_name),
        TypeNameRule::new("boolean", is_boolean, |_| "BOOLEAN".into()),
        TypeNameRule::new("timestamp_tz", is_zoned_timestamp, |_| {
            "TIMESTAMP WITH TIME ZONE".into()
        }),
        TypeNameRule::new("timestamp", is_timestamp, |_| "TIMESTAMP".into()),
        TypeNameRule::new("time_tz", is_zoned_time, |_| "TIME WITH TIME ZONE".into()),
        TypeNameRule::new("time", is_time, |_| "TIME".into()),
        TypeNameRule::new("date", is_date, |_| "DATE".into()),
        TypeNameRule::new("integer", is_integer, |_| "BIGINT".into()),
        TypeNameRule::new("real", is_real, |_| "DOUBLE PRECISION".into()),
        TypeNameRule::new("binary", is_binary, |_| "VARBINARY".into()),
        TypeNameRule::new("string", is_string, string_type_name),
    ]
}

fn is_decimal(i: &TypeNameInput<'_>) -> bool {
    matches!(i.value, Value::Decimal(_)) || matches!(i.declared, Some(DataType::Decimal { .. }))
}

fn decimal_type_name(i: &TypeNameInput<'_>) -> String {
    match (i.declared, i.value) {
        (Some(DataType::Decimal { precision, scale }), _) => format!("DECIMAL({precision},{scale})"),
        (_, Value::Decimal(d)) => {
            let digits = d.mantissa().unsigned_abs().to_string().len() as u32;
            let scale = d.scale();
            format!("DECIMAL({},{})", digits.max(scale), scale)
        }
        _ => "DECIMAL".into(),
    }
}

fn is_big_integer(i: &TypeNameInput<'_>) -> bool {
    matches!(i.value, Value::BigInteger(_)) || matches!(i.declared, Some(DataType::BigInteger))
}

fn big_integer_type_name(i: &TypeNameInput<'_>) -> String {
    match i.value {
        Value::BigInteger(b) => {
            let digits = b.magnitude().to_string().len();
            format!("NUMERIC({digits})")
        }
        _ => "NUMERIC".into(),
    }
}

fn is_boolean(i: &TypeNameInput<'_>) -> bool {
    matches!(i.value, Value::Bool(_)) || matches!(i.declared, Some(DataType::Boolean))
}

fn is_zoned_timestamp(i: &TypeNameInput<'_>) -> bool {
    match i.declared {
        Some(DataType::Timestamp { with_timezone }) => *with_timezone,
        Some(_) => false,
        None => matches!(i.value, Value::ZonedTimestamp(_)),
    }
}

fn is_timestamp(i: &TypeNameInput<'_>) -> bool {
    match i.declared {
        Some(DataType::Timestamp { with_timezone }) => !*with_timezone,
        Some(_) => false,
        None => matches!(i.value, Value::Timestamp(_)),
    }
}

fn is_zoned_time(i: &TypeNameInput<'_>) -> bool {
    matches!(i.declared, Some(DataType::Time { with_timezone: true }))
}

fn is_time(i: &TypeNameInput<'_>) -> bool {
    match i.declared {
        Some(DataType::Time { with_timezone }) => !*with_timezone,
        Some(_) => false,
        None => matches!(i.value, Value::Time(_)),
    }
}

fn is_date(i: &TypeNameInput<'_>) -> bool {
    match i.declared {
        Some(DataType::Date) => true,
        Some(_) => false,
        None => matches!(i.value, Value::Date(_)),
    }
}

fn is_integer(i: &TypeNameInput<'_>) -> bool {
    match i.declared {
        Some(DataType::Integer | DataType::Enumeration { .. }) => true,
        Some(_) => false,
        None => matches!(i.value, Value::Integer(_) | Value::Enum { .. }),
    }
}

fn is_real(i: &TypeNameInput<'_>) -> bool {
    match i.declared {
        Some(DataType::Real) => true,
        Some(_) => false,
        None => matches!(i.value, Value::Real(_)),
    }
}

fn is_binary(i: &TypeNameInput<'_>) -> bool {
    match i.declared {
        Some(DataType::Binary) => true,
        Some(_) => false,
        None => matches!(i.value, Value::Binary(_)),
    }
}

fn is_string(i: &TypeNameInput<'_>) -> bool {
    match i.declared {
        Some(DataType::Text { .. }) => true,
        Some(_) => false,
        None => matches!(i.value, Value::Text(_)),
    }
}

fn string_type_name(i: &TypeNameInput<'_>) -> String {
    let length = match i.declared {
        Some(DataType::Text {
            max_length: Some(max),
        }) => *max,
        _ => i.varchar_length,
    };
    format!("VARCHAR({length})")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_match(dialect: Dialect, value: &Value, declared: Option<&DataType>) -> Option<String> {
        let input = TypeNameInput {
            value,
            declared,
            varchar_length: 255,
        };
        dialect
            .type_name_rules()
            .iter()
            .find(|r| r.applies(&input))
            .map(|r| r.type_name(&input))
    }

    #[test]
    fn postgres_overrides_string_and_timestamp_only() {
        let text = Value::Text("x".into());
        assert_eq!(first_match(Dialect::Sqlite, &text, None).unwrap(), "VARCHAR(255)");
        assert_eq!(first_match(Dialect::Postgres, &text, None).unwrap(), "TEXT");

        let ts = DataType::Timestamp { with_timezone: false };
        assert_eq!(first_match(Dialect::Sqlite, &Value::Null, Some(&ts)).unwrap(), "TIMESTAMP");
        assert_eq!(first_match(Dialect::Postgres, &Value::Null, Some(&ts)).unwrap(), "TIMESTAMPTZ");

        assert_eq!(first_match(Dialect::Postgres, &Value::Bool(true), None).unwrap(), "BOOLEAN");
    }

    #[test]
    fn rule_order_is_preserved_by_overrides() {
        let names: Vec<_> = Dialect::Postgres.type_name_rules().iter().map(|r| r.name).collect();
        let base: Vec<_> = Dialect::Sqlite.type_name_rules().iter().map(|r| r.name).collect();
        assert_eq!(names, base);
    }

    #[test]
    fn big_integer_sized_to_digits() {
        let big: num_bigint::BigInt = "-123456789012345678901234567890".parse().unwrap();
        assert_eq!(
            first_match(Dialect::Sqlite, &Value::BigInteger(big), None).unwrap(),
            "NUMERIC(30)"
        );
    }
}
