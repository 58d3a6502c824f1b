use serde::Serialize;
use thiserror::Error;

use crate::codes;

/// Failure reported by a collaborator of the reconciliation engine
#[derive(Error, Debug)]
pub enum MonitorError {
    /// Connection could not be established or was dropped
    #[error("Network error: {0}")]
    Network(String),

    /// Request did not complete in time
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Backend answered with a non-2xx status
    #[error("Unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    /// Response body could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Local persistence failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Collaborator has nothing for this request
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Wrapped external errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MonitorError {
    /// Stable error code for this failure
    pub fn code(&self) -> &'static str {
        match self {
            Self::Network(_) => codes::transport::CONNECTION_FAILED,
            Self::Timeout(_) => codes::transport::TIMEOUT,
            Self::Status { .. } => codes::transport::BAD_STATUS,
            Self::Unavailable(_) => codes::transport::UNAVAILABLE,
            Self::Decode(_) => codes::payload::DECODE_FAILED,
            Self::Storage(_) => codes::storage::PERSISTENCE_FAILED,
            Self::Config(_) => codes::configuration::INVALID_CONFIG,
            Self::Other(_) => codes::internal::UNEXPECTED,
        }
    }

    /// Whether retrying on a later tick can reasonably succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::Unavailable(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Decode(_) | Self::Storage(_) | Self::Config(_) | Self::Other(_) => false,
        }
    }
}

/// Result type alias for collaborator operations
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Serializable summary of an error, suitable for a dismissible status line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub code: &'static str,
    pub message: String,
    pub transient: bool,
}

impl From<&MonitorError> for ErrorReport {
    fn from(error: &MonitorError) -> Self {
        Self {
            code: error.code(),
            message: error.to_string(),
            transient: error.is_transient(),
        }
    }
}

/// Log a collaborator error with its code attached
pub fn log_error(context: &str, error: &MonitorError) {
    tracing::warn!(
        context = context,
        error_code = error.code(),
        transient = error.is_transient(),
        error = %error,
        "Collaborator call failed"
    );
}
