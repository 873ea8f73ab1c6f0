//! Typed attribute values carried by payloads.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use num_bigint::BigInt;
use rust_decimal::Decimal;

use super::Payload;

/// A single payload value.
///
/// Scalars map onto attribute datatypes; `Payload` and `List` hold nested
/// instances for single and many references.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    BigInteger(BigInt),
    Decimal(Decimal),
    Real(f64),
    Text(String),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    ZonedTimestamp(DateTime<FixedOffset>),
    /// Enumeration literal with its ordinal in the declared literal list.
    Enum { literal: String, ordinal: i64 },
    Binary(Vec<u8>),
    Payload(Box<Payload>),
    List(Vec<Payload>),
}

impl Value {
    pub fn enumeration(literal: &str, ordinal: i64) -> Self {
        Self::Enum {
            literal: literal.to_string(),
            ordinal,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, Self::Payload(_) | Self::List(_))
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) | Self::Enum { literal: s, .. } => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_payload(&self) -> Option<&Payload> {
        match self {
            Self::Payload(p) => Some(p),
            _ => None,
        }
    }

    /// Nested payloads of a reference value, whether single or many.
    pub fn payloads(&self) -> Vec<&Payload> {
        match self {
            Self::Payload(p) => vec![p.as_ref()],
            Self::List(items) => items.iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Short name of the value's runtime class, used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::BigInteger(_) => "big_integer",
            Self::Decimal(_) => "decimal",
            Self::Real(_) => "real",
            Self::Text(_) => "text",
            Self::Date(_) => "date",
            Self::Time(_) => "time",
            Self::Timestamp(_) => "timestamp",
            Self::ZonedTimestamp(_) => "zoned_timestamp",
            Self::Enum { .. } => "enum",
            Self::Binary(_) => "binary",
            Self::Payload(_) => "payload",
            Self::List(_) => "list",
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Self::Decimal(v)
    }
}

impl From<BigInt> for Value {
    fn from(v: BigInt) -> Self {
        Self::BigInteger(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Self::Timestamp(v)
    }
}

impl From<Payload> for Value {
    fn from(v: Payload) -> Self {
        Self::Payload(Box::new(v))
    }
}

impl From<Vec<Payload>> for Value {
    fn from(v: Vec<Payload>) -> Self {
        Self::List(v)
    }
}
