//! Error types for the gridwatch monitor
//!
//! Three domain errors map to the three external boundaries (provider,
//! transport, persistence), each with its own recovery policy. The unified
//! [`Error`] wraps them for use across module boundaries.

use std::io;
use thiserror::Error;

/// Errors from the outage status provider boundary
#[derive(Error, Debug)]
pub enum ProviderError {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// Server returned a non-success status
    #[error("Server error: {0}")]
    ServerError(u16),

    /// Response body could not be decoded
    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    /// Session credential handshake failed
    #[error("Credential handshake failed: {0}")]
    Credential(String),

    /// Invalid rate limit configuration
    #[error("Invalid rate limit: {0}")]
    InvalidRate(f64),
}

/// Per-subscriber message delivery errors
#[derive(Error, Debug)]
pub enum TransportError {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The transport API rejected the call (blocked bot, deleted account, ...)
    #[error("Transport rejected call for subscriber {subscriber_id}: {description}")]
    Rejected {
        subscriber_id: i64,
        description: String,
    },

    /// Response from the transport API could not be decoded
    #[error("Malformed transport response: {0}")]
    MalformedResponse(String),
}

/// Durable store errors
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Referenced row does not exist
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Provider boundary (skip the address this cycle)
    Provider,
    /// Message delivery (skip the subscriber)
    Transport,
    /// Durable store (retry, then skip notifying)
    Persistence,
    /// Configuration and validation errors
    Config,
    /// Other/unknown errors
    Other,
}

/// Unified error type for the gridwatch crate
#[derive(Error, Debug)]
pub enum Error {
    /// Provider boundary errors
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Message delivery errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Durable store errors
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Check if this error is recoverable within the polling loop
    ///
    /// Provider and transport failures are transient by policy: the address
    /// is retried next cycle, the subscriber is skipped for this dispatch.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Provider(_) | Self::Transport(_) => true,
            Self::Persistence(_) => false,
            Self::Io(_) => true,
            Self::Json(_) => false,
            Self::Config(_) => false,
        }
    }

    /// Get the error category for handling strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Provider(_) => ErrorCategory::Provider,
            Self::Transport(_) => ErrorCategory::Transport,
            Self::Persistence(_) => ErrorCategory::Persistence,
            Self::Config(_) => ErrorCategory::Config,
            Self::Io(_) | Self::Json(_) => ErrorCategory::Other,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category() {
        let err: Error = ProviderError::Timeout.into();
        assert_eq!(err.category(), ErrorCategory::Provider);

        let err: Error = PersistenceError::NotFound("outage 7".into()).into();
        assert_eq!(err.category(), ErrorCategory::Persistence);
    }

    #[test]
    fn test_is_recoverable() {
        let err: Error = ProviderError::ServerError(503).into();
        assert!(err.is_recoverable());

        let err: Error = TransportError::Rejected {
            subscriber_id: 42,
            description: "bot was blocked by the user".into(),
        }
        .into();
        assert!(err.is_recoverable());

        let err = Error::config("missing bot token");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("invalid rate limit");
        assert_eq!(err.category(), ErrorCategory::Config);
    }
}
