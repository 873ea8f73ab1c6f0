//! Coercion of loosely typed values onto declared datatypes.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use num_bigint::BigInt;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use super::Value;
use crate::model::DataType;

const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Coerce `value` onto `data_type`.
///
/// Returns a human-readable reason when the value cannot represent the type.
pub fn coerce(value: &Value, data_type: &DataType) -> Result<Value, String> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    let mismatch = || format!("cannot coerce {} to {:?}", value.kind_name(), data_type);
    let coerced = match (data_type, value) {
        (DataType::Boolean, Value::Bool(b)) => Value::Bool(*b),
        (DataType::Boolean, Value::Integer(i)) if *i == 0 || *i == 1 => Value::Bool(*i == 1),
        (DataType::Boolean, Value::Text(s)) => Value::Bool(s.parse().map_err(|_| mismatch())?),

        (DataType::Integer, Value::Integer(i)) => Value::Integer(*i),
        (DataType::Integer, Value::Real(f)) if f.fract() == 0.0 => Value::Integer(f.to_i64().ok_or_else(mismatch)?),
        (DataType::Integer, Value::Decimal(d)) if d.fract().is_zero() => {
            Value::Integer(d.to_i64().ok_or_else(mismatch)?)
        }
        (DataType::Integer, Value::BigInteger(b)) => {
            Value::Integer(i64::try_from(b.clone()).map_err(|_| mismatch())?)
        }
        (DataType::Integer, Value::Text(s)) => Value::Integer(s.trim().parse().map_err(|_| mismatch())?),

        (DataType::BigInteger, Value::BigInteger(b)) => Value::BigInteger(b.clone()),
        (DataType::BigInteger, Value::Integer(i)) => Value::BigInteger(BigInt::from(*i)),
        (DataType::BigInteger, Value::Text(s)) => {
            Value::BigInteger(s.trim().parse().map_err(|_| mismatch())?)
        }

        (DataType::Decimal { scale, .. }, v) => {
            let d = match v {
                Value::Decimal(d) => *d,
                Value::Integer(i) => Decimal::from(*i),
                Value::Real(f) => Decimal::from_f64(*f).ok_or_else(mismatch)?,
                Value::Text(s) => s.trim().parse::<Decimal>().map_err(|_| mismatch())?,
                _ => return Err(mismatch()),
            };
            Value::Decimal(d.round_dp(*scale))
        }

        (DataType::Real, Value::Real(f)) => Value::Real(*f),
        (DataType::Real, Value::Integer(i)) => Value::Real(*i as f64),
        (DataType::Real, Value::Decimal(d)) => Value::Real(d.to_f64().ok_or_else(mismatch)?),
        (DataType::Real, Value::Text(s)) => Value::Real(s.trim().parse().map_err(|_| mismatch())?),

        (DataType::Text { .. }, Value::Text(s) | Value::Enum { literal: s, .. }) => Value::Text(s.clone()),

        (DataType::Date, Value::Date(d)) => Value::Date(*d),
        (DataType::Date, Value::Timestamp(t)) => Value::Date(t.date()),
        (DataType::Date, Value::Text(s)) => {
            Value::Date(NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| mismatch())?)
        }

        (DataType::Time { .. }, Value::Time(t)) => Value::Time(*t),
        (DataType::Time { .. }, Value::Text(s)) => Value::Time(
            NaiveTime::parse_from_str(s, "%H:%M:%S%.f").map_err(|_| mismatch())?,
        ),

        (DataType::Timestamp { with_timezone: false }, v) => match v {
            Value::Timestamp(t) => Value::Timestamp(*t),
            Value::ZonedTimestamp(t) => Value::Timestamp(t.naive_utc()),
            Value::Date(d) => Value::Timestamp(d.and_time(NaiveTime::default())),
            Value::Text(s) => Value::Timestamp(parse_naive_timestamp(s).ok_or_else(mismatch)?),
            _ => return Err(mismatch()),
        },
        (DataType::Timestamp { with_timezone: true }, v) => match v {
            Value::ZonedTimestamp(t) => Value::ZonedTimestamp(*t),
            Value::Timestamp(t) => Value::ZonedTimestamp(t.and_utc().fixed_offset()),
            Value::Text(s) => match DateTime::parse_from_rfc3339(s) {
                Ok(t) => Value::ZonedTimestamp(t),
                Err(_) => {
                    let naive = parse_naive_timestamp(s).ok_or_else(mismatch)?;
                    Value::ZonedTimestamp(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc).fixed_offset())
                }
            },
            _ => return Err(mismatch()),
        },

        (DataType::Enumeration { .. }, Value::Enum { literal: l, .. } | Value::Text(l)) => {
            let ordinal = data_type
                .literal_ordinal(l)
                .ok_or_else(|| format!("'{l}' is not a literal of {data_type:?}"))?;
            Value::enumeration(l, ordinal)
        }
        (DataType::Enumeration { .. }, Value::Integer(i)) => {
            Value::enumeration(data_type.literal_at(*i).ok_or_else(mismatch)?, *i)
        }

        (DataType::Binary, Value::Binary(b)) => Value::Binary(b.clone()),
        (DataType::Binary, Value::Text(s)) => {
            Value::Binary(STANDARD.decode(s).map_err(|_| mismatch())?)
        }

        (DataType::Identifier, Value::Integer(i)) => Value::Integer(*i),
        (DataType::Identifier, Value::Text(s)) => Value::Text(s.clone()),

        _ => return Err(mismatch()),
    };
    Ok(coerced)
}

fn parse_naive_timestamp(s: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}
