//! SQL type codes and target classes.

use strata_core::model::DataType;
use strata_core::payload::Value;

/// Bindable value handed to rusqlite.
pub type SqlValue = rusqlite::types::Value;

/// SQL type codes, numerically compatible with JDBC `java.sql.Types`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    Null,
    Boolean,
    BigInt,
    Integer,
    Decimal,
    Numeric,
    Double,
    Varchar,
    Date,
    Time,
    Timestamp,
    TimeWithTimezone,
    TimestampWithTimezone,
    Varbinary,
    Other,
}

impl SqlType {
    pub fn code(self) -> i32 {
        match self {
            Self::Null => 0,
            Self::Boolean => 16,
            Self::BigInt => -5,
            Self::Integer => 4,
            Self::Decimal => 3,
            Self::Numeric => 2,
            Self::Double => 8,
            Self::Varchar => 12,
            Self::Date => 91,
            Self::Time => 92,
            Self::Timestamp => 93,
            Self::TimeWithTimezone => 2013,
            Self::TimestampWithTimezone => 2014,
            Self::Varbinary => -3,
            Self::Other => 1111,
        }
    }
}

/// Host-side class a value is converted to before binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetClass {
    Boolean,
    Long,
    BigInteger,
    BigDecimal,
    Double,
    String,
    LocalDate,
    LocalTime,
    OffsetTime,
    LocalDateTime,
    OffsetDateTime,
    Bytes,
}

impl TargetClass {
    /// Registered mapping from declared datatypes. Enumerations bind as their ordinal.
    pub fn for_datatype(data_type: &DataType) -> Self {
        match data_type {
            DataType::Boolean => Self::Boolean,
            DataType::Integer | DataType::Enumeration { .. } => Self::Long,
            DataType::BigInteger => Self::BigInteger,
            DataType::Decimal { .. } => Self::BigDecimal,
            DataType::Real => Self::Double,
            DataType::Text { .. } | DataType::Identifier => Self::String,
            DataType::Date => Self::LocalDate,
            DataType::Time { with_timezone: false } => Self::LocalTime,
            DataType::Time { with_timezone: true } => Self::OffsetTime,
            DataType::Timestamp { with_timezone: false } => Self::LocalDateTime,
            DataType::Timestamp { with_timezone: true } => Self::OffsetDateTime,
            DataType::Binary => Self::Bytes,
        }
    }

    /// Inference from a runtime value when no datatype is declared.
    pub fn for_value(value: &Value) -> Option<Self> {
        Some(match value {
            Value::Null | Value::Payload(_) | Value::List(_) => return None,
            Value::Bool(_) => Self::Boolean,
            Value::Integer(_) | Value::Enum { .. } => Self::Long,
            Value::BigInteger(_) => Self::BigInteger,
            Value::Decimal(_) => Self::BigDecimal,
            Value::Real(_) => Self::Double,
            Value::Text(_) => Self::String,
            Value::Date(_) => Self::LocalDate,
            Value::Time(_) => Self::LocalTime,
            Value::Timestamp(_) => Self::LocalDateTime,
            Value::ZonedTimestamp(_) => Self::OffsetDateTime,
            Value::Binary(_) => Self::Bytes,
        })
    }

    pub fn sql_type(self) -> SqlType {
        match self {
            Self::Boolean => SqlType::Boolean,
            Self::Long => SqlType::BigInt,
            Self::BigInteger => SqlType::Numeric,
            Self::BigDecimal => SqlType::Decimal,
            Self::Double => SqlType::Double,
            Self::String => SqlType::Varchar,
            Self::LocalDate => SqlType::Date,
            Self::LocalTime => SqlType::Time,
            Self::OffsetTime => SqlType::TimeWithTimezone,
            Self::LocalDateTime => SqlType::Timestamp,
            Self::OffsetDateTime => SqlType::TimestampWithTimezone,
            Self::Bytes => SqlType::Varbinary,
        }
    }
}
