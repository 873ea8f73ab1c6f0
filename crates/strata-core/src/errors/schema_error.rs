//! Model/schema inconsistencies discovered at load or resolution time.

use super::error_code::{self, StrataErrorCode};

/// Errors raised while building the model or resolving physical names.
///
/// These are deployment-time defects, never transient conditions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("schema mapping error: {element} has {count} physical mappings, expected exactly one")]
    SchemaMapping { element: String, count: usize },

    #[error("invalid model: {reason}")]
    InvalidModel { reason: String },

    #[error("unknown {kind} '{name}'")]
    UnknownElement { kind: &'static str, name: String },
}

impl SchemaError {
    pub fn invalid_model(reason: impl Into<String>) -> Self {
        Self::InvalidModel {
            reason: reason.into(),
        }
    }
}

impl StrataErrorCode for SchemaError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::SchemaMapping { .. } => error_code::SCHEMA_MAPPING_ERROR,
            Self::InvalidModel { .. } => error_code::INVALID_MODEL_ERROR,
            Self::UnknownElement { .. } => error_code::UNKNOWN_ELEMENT,
        }
    }
}
