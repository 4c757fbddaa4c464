//! Transport error taxonomy
//!
//! Every remote call ends in one of:
//! - `Timeout`: no response within the bound
//! - `Network`: unreachable / offline
//! - `Http`: the server answered with a non-2xx status
//! - `Validation`: the client payload was malformed and never sent
//! - `Decode`: the server answered 2xx with a body we cannot read

use pulse_model::ModelError;

/// Remote call failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// No response within the bound
    #[error("{target} timed out after {after_ms}ms")]
    Timeout {
        /// Request target
        target: String,
        /// Bound that elapsed
        after_ms: u64,
    },

    /// Unreachable or offline
    #[error("network error: {0}")]
    Network(String),

    /// Server rejected the request
    #[error("http error {status}: {message}")]
    Http {
        /// Status code
        status: u16,
        /// Response body, if any
        message: String,
    },

    /// Malformed client payload
    #[error("validation error: {0}")]
    Validation(String),

    /// Unreadable response body
    #[error("malformed response: {0}")]
    Decode(String),
}

impl TransportError {
    /// Whether retrying the same request later may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Network(_) => true,
            Self::Http { status, .. } => *status >= 500 || matches!(status, 401 | 408 | 429),
            Self::Validation(_) | Self::Decode(_) => false,
        }
    }

    /// Whether the failure means the backend could not be reached at all
    #[inline]
    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Network(_))
    }

    /// HTTP status, when the server answered
    #[inline]
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<ModelError> for TransportError {
    fn from(value: ModelError) -> Self {
        Self::Validation(value.to_string())
    }
}
