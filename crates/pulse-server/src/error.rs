//! Error types for the pulse service
//!
//! Every variant maps to one HTTP status; handlers never leak internal
//! detail beyond the display string.

use pulse_model::ModelError;

/// Service error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServerError {
    /// Missing or unknown session cookie
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Entity not found
    #[error("{0} not found")]
    NotFound(String),

    /// Malformed request payload
    #[error("validation failed: {0}")]
    Validation(String),

    /// Invalid server configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage or other internal failure
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// HTTP status code for this error
    #[inline]
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::Unauthorized(_) => 401,
            Self::NotFound(_) => 404,
            Self::Validation(_) => 400,
            Self::Config(_) | Self::Internal(_) => 500,
        }
    }

    /// Missing session shorthand
    #[inline]
    #[must_use]
    pub fn session_missing() -> Self {
        Self::Unauthorized("session missing".to_string())
    }
}

impl From<ModelError> for ServerError {
    fn from(value: ModelError) -> Self {
        Self::Validation(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(ServerError::session_missing().status(), 401);
        assert_eq!(ServerError::NotFound("office".into()).status(), 404);
        assert_eq!(ServerError::from(ModelError::MissingField("state")).status(), 400);
        assert_eq!(ServerError::Internal("boom".into()).status(), 500);
    }

    #[test]
    fn display_is_readable() {
        let err = ServerError::NotFound("candidate".into());
        assert_eq!(err.to_string(), "candidate not found");
    }
}
