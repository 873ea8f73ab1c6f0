//! Stable error codes surfaced to callers through fault payloads.

/// Every subsystem error maps onto one stable, UPPER_SNAKE error code.
pub trait StrataErrorCode {
    fn error_code(&self) -> &'static str;
}

pub const SCHEMA_MAPPING_ERROR: &str = "SCHEMA_MAPPING_ERROR";
pub const INVALID_MODEL_ERROR: &str = "INVALID_MODEL_ERROR";
pub const UNKNOWN_ELEMENT: &str = "UNKNOWN_ELEMENT";
pub const GRAPH_COLLECTION_ERROR: &str = "GRAPH_COLLECTION_ERROR";
pub const INSERTION_ERROR: &str = "INSERTION_ERROR";
pub const INVALID_PAYLOAD: &str = "INVALID_PAYLOAD";
pub const CARDINALITY_VIOLATION: &str = "CARDINALITY_VIOLATION";
pub const OPTIMISTIC_LOCK_ERROR: &str = "OPTIMISTIC_LOCK_ERROR";
pub const STATELESS_OPERATION: &str = "STATELESS_OPERATION";
pub const CONSTRAINT_NOT_FOUND: &str = "CONSTRAINT_NOT_FOUND";
pub const REFERENCE_NOT_MUTABLE: &str = "REFERENCE_NOT_MUTABLE";
pub const STATEMENT_ORDERING_ERROR: &str = "STATEMENT_ORDERING_ERROR";
pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
pub const CONFIG_ERROR: &str = "CONFIG_ERROR";
pub const UNKNOWN_OPERATION: &str = "UNKNOWN_OPERATION";
pub const OPERATION_NOT_EXPOSED: &str = "OPERATION_NOT_EXPOSED";
pub const INVALID_INPUT: &str = "INVALID_INPUT";
pub const SIGNATURE_ERROR: &str = "SIGNATURE_ERROR";
pub const BUSINESS_ERROR: &str = "BUSINESS_ERROR";
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
