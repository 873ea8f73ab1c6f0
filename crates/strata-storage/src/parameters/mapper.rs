//! Parameter mapper: typed attribute values → bindable parameters.

use strata_core::errors::StorageError;
use strata_core::mapping::IdType;
use strata_core::model::DataType;
use strata_core::payload::coerce::coerce;
use strata_core::payload::{Id, Value};

use super::codec::to_sql_value;
use super::dialect::{Dialect, TypeNameInput, TypeNameRule};
use super::{SqlType, SqlValue, TargetClass};

/// A single bindable parameter. Produced immediately before binding, single use.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub value: SqlValue,
    pub sql_type: Option<SqlType>,
    pub type_name: Option<String>,
}

/// Stateless converter from values to parameters for one dialect.
#[derive(Debug, Clone)]
pub struct ParameterMapper {
    dialect: Dialect,
    varchar_length: u32,
    rules: Vec<TypeNameRule>,
}

impl ParameterMapper {
    pub fn new(dialect: Dialect, varchar_length: u32) -> Self {
        Self {
            dialect,
            varchar_length,
            rules: dialect.type_name_rules(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Build a parameter for `value`, typed from `declared` when given, else from the value.
    ///
    /// A null value without a declared datatype yields an untyped null parameter.
    pub fn create_parameter(
        &self,
        value: &Value,
        declared: Option<&DataType>,
        name: &str,
    ) -> Result<Parameter, StorageError> {
        let conversion = |message: String| StorageError::ValueConversion {
            column: name.to_string(),
            message,
        };
        let value = match declared {
            Some(dt) => coerce(value, dt).map_err(conversion)?,
            None => value.clone(),
        };

        let target = match declared {
            Some(dt) => Some(TargetClass::for_datatype(dt)),
            None => TargetClass::for_value(&value),
        };
        if target.is_none() && !value.is_null() {
            return Err(conversion(format!(
                "{} has no SQL representation",
                value.kind_name()
            )));
        }
        let sql_type = target.map(TargetClass::sql_type);

        let input = TypeNameInput {
            value: &value,
            declared,
            varchar_length: self.varchar_length,
        };
        let type_name = if value.is_null() && declared.is_none() {
            None
        } else {
            self.rules
                .iter()
                .find(|rule| rule.applies(&input))
                .map(|rule| rule.type_name(&input))
        };

        Ok(Parameter {
            name: name.to_string(),
            value: to_sql_value(&value, declared).map_err(conversion)?,
            sql_type,
            type_name,
        })
    }

    /// Parameter for an identifier, typed from the entity's identifier column.
    pub fn create_id_parameter(&self, id_type: IdType, id: &Id, name: &str) -> Parameter {
        let (value, sql_type, type_name) = match (id_type, id) {
            (IdType::Integer, Id::Int(i)) => (SqlValue::Integer(*i), SqlType::BigInt, "BIGINT".to_string()),
            (_, Id::Int(i)) => (
                SqlValue::Text(i.to_string()),
                SqlType::Varchar,
                format!("VARCHAR({})", self.varchar_length),
            ),
            (_, Id::Text(s)) => (
                SqlValue::Text(s.clone()),
                SqlType::Varchar,
                format!("VARCHAR({})", self.varchar_length),
            ),
        };
        Parameter {
            name: name.to_string(),
            value,
            sql_type: Some(sql_type),
            type_name: Some(type_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn mapper() -> ParameterMapper {
        ParameterMapper::new(Dialect::Sqlite, 255)
    }

    #[test]
    fn declared_decimal_uses_precision_and_scale() {
        let dt = DataType::Decimal { precision: 12, scale: 2 };
        let p = mapper()
            .create_parameter(&Value::Text("10.456".into()), Some(&dt), "price")
            .unwrap();
        assert_eq!(p.sql_type, Some(SqlType::Decimal));
        assert_eq!(p.type_name.as_deref(), Some("DECIMAL(12,2)"));
        assert_eq!(p.value, SqlValue::Text("10.46".into()));
    }

    #[test]
    fn inferred_decimal_sizes_from_value() {
        let d = Decimal::from_str("-1234.5").unwrap();
        let p = mapper().create_parameter(&Value::Decimal(d), None, "x").unwrap();
        assert_eq!(p.type_name.as_deref(), Some("DECIMAL(5,1)"));
    }

    #[test]
    fn untyped_null_has_no_type() {
        let p = mapper().create_parameter(&Value::Null, None, "x").unwrap();
        assert_eq!(p.value, SqlValue::Null);
        assert_eq!(p.sql_type, None);
        assert_eq!(p.type_name, None);
    }

    #[test]
    fn typed_null_keeps_declared_type() {
        let p = mapper()
            .create_parameter(&Value::Null, Some(&DataType::Boolean), "flag")
            .unwrap();
        assert_eq!(p.sql_type, Some(SqlType::Boolean));
        assert_eq!(p.sql_type.map(SqlType::code), Some(16));
        assert_eq!(p.type_name.as_deref(), Some("BOOLEAN"));
    }

    #[test]
    fn enum_literal_binds_as_integer() {
        let dt = DataType::Enumeration {
            literals: vec!["LOW".into(), "HIGH".into()],
        };
        let p = mapper()
            .create_parameter(&Value::Text("HIGH".into()), Some(&dt), "priority")
            .unwrap();
        assert_eq!(p.value, SqlValue::Integer(1));
        assert_eq!(p.sql_type, Some(SqlType::BigInt));
    }

    #[test]
    fn undeclared_enum_is_inferred_as_integer() {
        let p = mapper()
            .create_parameter(&Value::enumeration("SHIPPED", 1), None, "status")
            .unwrap();
        assert_eq!(p.value, SqlValue::Integer(1));
        assert_eq!(p.sql_type, Some(SqlType::BigInt));
        assert_eq!(p.type_name.as_deref(), Some("BIGINT"));
    }

    #[test]
    fn bad_literal_is_a_conversion_error() {
        let dt = DataType::Integer;
        let err = mapper()
            .create_parameter(&Value::Text("abc".into()), Some(&dt), "quantity")
            .unwrap_err();
        assert!(matches!(err, StorageError::ValueConversion { ref column, .. } if column == "quantity"));
    }

    #[test]
    fn text_ids_bind_as_varchar() {
        let p = mapper().create_id_parameter(IdType::Text, &Id::Text("a-b".into()), "id");
        assert_eq!(p.sql_type, Some(SqlType::Varchar));
        assert_eq!(p.value, SqlValue::Text("a-b".into()));
    }
}
