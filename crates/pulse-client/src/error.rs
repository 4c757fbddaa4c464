//! Error types for the client core

use pulse_model::ModelError;
use pulse_remote::TransportError;
use std::path::Path;

/// Local persistence failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// Filesystem failure
    #[error("io error at {path}: {message}")]
    Io {
        /// Path involved
        path: String,
        /// OS error text
        message: String,
    },

    /// Stored text could not be decoded
    #[error("corrupt value for {key}: {message}")]
    Corrupt {
        /// Storage key
        key: String,
        /// Decoder message
        message: String,
    },

    /// Value could not be encoded
    #[error("encode error: {0}")]
    Encode(String),
}

impl StorageError {
    pub(crate) fn io(path: &Path, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }

    /// Whether retrying the same operation may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

/// Client core error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Caller supplied an invalid payload
    #[error("validation error: {0}")]
    Validation(String),

    /// Local persistence failed
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Remote call failed
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ClientError {
    /// Whether retrying the same operation may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) => false,
            Self::Storage(e) => e.is_retryable(),
            Self::Transport(e) => e.is_retryable(),
        }
    }
}

impl From<ModelError> for ClientError {
    fn from(value: ModelError) -> Self {
        Self::Validation(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_is_final() {
        let err: ClientError = ModelError::MissingField("candidateId").into();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("candidateId"));
    }

    #[test]
    fn unreachable_transport_is_retryable() {
        let err: ClientError = TransportError::Network("offline".into()).into();
        assert!(err.is_retryable());
    }
}
