//! Error types for the Restyle engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A shared error type for the entire Restyle engine.
///
/// This provides typed, structured error variants with automatic conversion
/// from common error types via the `From` trait. Provider errors carry a
/// `retryable` flag so that adapters can distinguish rate-limit/overload
/// conditions (worth backing off and retrying) from auth or request-shape
/// failures (fail immediately).
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum RestyleError {
    /// Error returned by a generative provider call
    #[error("Provider error: {message}")]
    Provider {
        message: String,
        /// True for rate-limit/overload/quota-class failures
        retryable: bool,
    },

    /// The provider responded but no inline image part was present
    #[error("Provider response contained no image data")]
    NoImage,

    /// A provider call exceeded its time budget
    #[error("Provider call timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// Configuration error (missing API key, bad settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization {
        format: String, // "TOML", "JSON", etc.
        message: String,
    },

    /// Data access error (repository/storage layer)
    #[error("Data access error: {0}")]
    DataAccess(String),

    /// Invalid input supplied by the caller
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RestyleError {
    /// Creates a retryable provider error (rate limit, overload, quota)
    pub fn provider_transient(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable provider error (auth, malformed request)
    pub fn provider_fatal(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates an IO error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates a DataAccess error
    pub fn data_access(message: impl Into<String>) -> Self {
        Self::DataAccess(message.into())
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether another attempt at the failed call may succeed.
    ///
    /// Timeouts count as retryable: the synthesis provider regularly
    /// recovers on the next attempt after an overload-induced stall.
    /// `NoImage` does not: re-sending the same prompt after a safety
    /// rejection or text-only response just burns quota.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Provider {
                retryable: true,
                ..
            } | Self::Timeout { .. }
        )
    }

    /// Check if this is a provider error
    pub fn is_provider(&self) -> bool {
        matches!(self, Self::Provider { .. })
    }

    /// Check if this is a config error
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for RestyleError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for RestyleError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for RestyleError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

/// Conversion from anyhow::Error (for adapter glue code)
impl From<anyhow::Error> for RestyleError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Conversion from String (for error messages)
impl From<String> for RestyleError {
    fn from(err: String) -> Self {
        Self::Internal(err)
    }
}

/// A type alias for `Result<T, RestyleError>`.
pub type Result<T> = std::result::Result<T, RestyleError>;
