//! Validation errors for domain payloads

/// Malformed client or server payload
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// A required field is missing or blank
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// Aggregate disclosure flags disagree with the payload
    #[error("inconsistent aggregate: {0}")]
    InconsistentAggregate(String),

    /// Unknown office scope
    #[error("unknown scope: {0}")]
    UnknownScope(String),
}
