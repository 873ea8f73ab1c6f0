//! Declared attribute datatypes.

use serde::{Deserialize, Serialize};

/// The declared datatype of an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataType {
    Boolean,
    Integer,
    BigInteger,
    Decimal {
        precision: u32,
        scale: u32,
    },
    Real,
    Text {
        #[serde(default)]
        max_length: Option<u32>,
    },
    Date,
    Time {
        #[serde(default)]
        with_timezone: bool,
    },
    Timestamp {
        #[serde(default)]
        with_timezone: bool,
    },
    Enumeration {
        literals: Vec<String>,
    },
    Binary,
    Identifier,
}

impl DataType {
    /// Position of `literal` within an enumeration datatype.
    pub fn literal_ordinal(&self, literal: &str) -> Option<i64> {
        match self {
            Self::Enumeration { literals } => literals
                .iter()
                .position(|l| l == literal)
                .map(|p| p as i64),
            _ => None,
        }
    }

    /// Literal at `ordinal` within an enumeration datatype.
    pub fn literal_at(&self, ordinal: i64) -> Option<&str> {
        match self {
            Self::Enumeration { literals } => usize::try_from(ordinal)
                .ok()
                .and_then(|i| literals.get(i))
                .map(String::as_str),
            _ => None,
        }
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, Self::Date | Self::Time { .. } | Self::Timestamp { .. })
    }
}
