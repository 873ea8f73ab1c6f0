//! Conversion between payload values and SQLite storage classes.

use rusqlite::types::ValueRef;
use strata_core::model::DataType;
use strata_core::payload::coerce::coerce;
use strata_core::payload::Value;

use super::SqlValue;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Encode an already coerced value into its storage class.
pub fn to_sql_value(value: &Value, declared: Option<&DataType>) -> Result<SqlValue, String> {
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::BigInteger(b) => SqlValue::Text(b.to_string()),
        Value::Decimal(d) => SqlValue::Text(d.normalize().to_string()),
        Value::Real(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Date(d) => SqlValue::Text(d.format("%Y-%m-%d").to_string()),
        Value::Time(t) => SqlValue::Text(t.format("%H:%M:%S%.f").to_string()),
        Value::Timestamp(t) => SqlValue::Text(t.format(TIMESTAMP_FORMAT).to_string()),
        Value::ZonedTimestamp(t) => SqlValue::Text(t.to_rfc3339()),
        Value::Enum { literal, ordinal } => match declared {
            Some(dt @ DataType::Enumeration { .. }) => SqlValue::Integer(
                dt.literal_ordinal(literal)
                    .ok_or_else(|| format!("'{literal}' is not a literal of {dt:?}"))?,
            ),
            _ => SqlValue::Integer(*ordinal),
        },
        Value::Binary(b) => SqlValue::Blob(b.clone()),
        Value::Payload(_) | Value::List(_) => {
            return Err(format!("{} cannot be bound as a column value", value.kind_name()))
        }
    })
}

/// Decode a column read back from the database using the declared datatype.
pub fn from_sql_value(raw: ValueRef<'_>, data_type: &DataType) -> Result<Value, String> {
    let untyped = raw_value(raw)?;
    coerce(&untyped, data_type)
}

/// Untyped decoding, used for identifiers and foreign-key columns.
pub fn raw_value(raw: ValueRef<'_>) -> Result<Value, String> {
    Ok(match raw {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(bytes) => Value::Text(
            std::str::from_utf8(bytes)
                .map_err(|e| e.to_string())?
                .to_string(),
        ),
        ValueRef::Blob(bytes) => Value::Binary(bytes.to_vec()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    #[test]
    fn enums_bind_as_ordinals() {
        let dt = DataType::Enumeration {
            literals: vec!["OPEN".into(), "CLOSED".into()],
        };
        let v = to_sql_value(&Value::enumeration("CLOSED", 1), Some(&dt)).unwrap();
        assert_eq!(v, SqlValue::Integer(1));
        let back = from_sql_value(ValueRef::Integer(1), &dt).unwrap();
        assert_eq!(back, Value::enumeration("CLOSED", 1));
        assert_eq!(to_sql_value(&back, None).unwrap(), SqlValue::Integer(1));
    }

    #[test]
    fn decimals_round_trip_through_text() {
        let dt = DataType::Decimal { precision: 10, scale: 2 };
        let d = Decimal::from_str("12.50").unwrap();
        let v = to_sql_value(&Value::Decimal(d), Some(&dt)).unwrap();
        let SqlValue::Text(text) = &v else {
            panic!("expected text storage");
        };
        let back = from_sql_value(ValueRef::Text(text.as_bytes()), &dt).unwrap();
        assert_eq!(back, Value::Decimal(d));
    }

    #[test]
    fn nested_payloads_are_not_bindable() {
        let v = Value::List(vec![]);
        assert!(to_sql_value(&v, None).is_err());
    }
}
