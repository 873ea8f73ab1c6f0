//! Fault payloads: the stable external shape of every failed call.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use strata_core::constants::keys;
use strata_core::errors::{error_code, DispatchError, PersistenceError, StrataErrorCode};
use strata_core::payload::{Payload, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FaultType {
    /// Raised on purpose by a behavior.
    Business,
    /// The caller can correct the request and resubmit.
    Client,
    /// Anything else; the cause is internal.
    Server,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fault {
    #[serde(rename = "type")]
    pub fault_type: FaultType,
    pub error_code: String,
    pub cause: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Json>,
}

impl Fault {
    pub fn from_error(err: &DispatchError) -> Self {
        match err {
            DispatchError::Business {
                code,
                message,
                details,
            } => Self {
                fault_type: FaultType::Business,
                error_code: code.clone(),
                cause: message.clone(),
                details: details.clone(),
            },
            _ if is_client_error(err) => Self {
                fault_type: FaultType::Client,
                error_code: err.error_code().to_string(),
                cause: err.to_string(),
                details: None,
            },
            _ => Self {
                fault_type: FaultType::Server,
                error_code: error_code::INTERNAL_ERROR.to_string(),
                cause: err.to_string(),
                details: Some(serde_json::json!({ "code": err.error_code() })),
            },
        }
    }

    pub fn to_json(&self) -> Json {
        serde_json::to_value(self).unwrap_or(Json::Null)
    }
}

fn is_client_error(err: &DispatchError) -> bool {
    match err {
        DispatchError::UnknownOperation { .. }
        | DispatchError::OperationNotExposed { .. }
        | DispatchError::InvalidInput { .. }
        | DispatchError::Signature { .. } => true,
        DispatchError::Persistence(e) => e.is_client_correctable() || is_not_found(e),
        DispatchError::Business { .. } | DispatchError::Behavior { .. } => false,
    }
}

fn is_not_found(err: &PersistenceError) -> bool {
    matches!(
        err,
        PersistenceError::Schema(strata_core::errors::SchemaError::UnknownElement { .. })
    )
}

/// Extract a business fault a behavior returned under the reserved `__fault` key.
///
/// The fault value is a payload carrying `errorCode`, `cause` and optional `details`.
pub fn business_fault(result: &Value) -> Option<DispatchError> {
    let fault = result.as_payload()?.get(keys::FAULT)?;
    let (code, message, details) = match fault {
        Value::Payload(p) => (
            text(p, "errorCode").unwrap_or(error_code::BUSINESS_ERROR).to_string(),
            text(p, "cause").unwrap_or_default().to_string(),
            p.get("details").map(strata_core::payload::json::value_to_json),
        ),
        Value::Text(code) => (code.clone(), String::new(), None),
        _ => (error_code::BUSINESS_ERROR.to_string(), String::new(), None),
    };
    Some(DispatchError::Business {
        code,
        message,
        details,
    })
}

fn text<'a>(payload: &'a Payload, key: &str) -> Option<&'a str> {
    payload.get(key).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::errors::StatementError;

    #[test]
    fn optimistic_lock_is_a_client_fault() {
        let err = DispatchError::Persistence(
            StatementError::OptimisticLock {
                entity: "Order".into(),
                id: "1".into(),
                version: 1,
            }
            .into(),
        );
        let fault = Fault::from_error(&err);
        assert_eq!(fault.fault_type, FaultType::Client);
        assert_eq!(fault.error_code, "OPTIMISTIC_LOCK_ERROR");
    }

    #[test]
    fn internal_errors_hide_behind_a_server_fault() {
        let err = DispatchError::Behavior {
            operation: "x".into(),
            message: "boom".into(),
        };
        let json = Fault::from_error(&err).to_json();
        assert_eq!(json["type"], "SERVER");
        assert_eq!(json["errorCode"], "INTERNAL_ERROR");
        assert_eq!(json["details"]["code"], "INTERNAL_ERROR");
    }

    #[test]
    fn fault_key_becomes_a_business_error() {
        let result = Value::Payload(Box::new(Payload::new().with(
            keys::FAULT,
            Payload::new()
                .with("errorCode", "CREDIT_LIMIT")
                .with("cause", "limit exceeded"),
        )));
        match business_fault(&result) {
            Some(DispatchError::Business { code, message, .. }) => {
                assert_eq!(code, "CREDIT_LIMIT");
                assert_eq!(message, "limit exceeded");
            }
            other => panic!("expected a business fault, got {other:?}"),
        }
        assert!(business_fault(&Value::Integer(1)).is_none());
    }
}
