//! Error types for render-batch
//!
//! Two families of errors live here:
//! - [`Error`] - hard failures of a whole call (invalid configuration, sink failures)
//! - [`ErrorRecord`] - per-item failures reported by a rendering operation, which the
//!   runner always recovers into an [`Outcome`](crate::types::Outcome)

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for render-batch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for render-batch
///
/// Only configuration and sink failures ever escape [`BatchRunner::run`](crate::BatchRunner::run)
/// or [`ResultAggregator::deliver`](crate::ResultAggregator::deliver). Per-item rendering
/// failures are recorded in the report instead.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "concurrency")
        key: Option<String>,
    },

    /// Persisting a record failed
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a configuration error for a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

/// Errors raised by a [`Sink`](crate::sink::Sink) while persisting records
#[derive(Debug, Error)]
pub enum SinkError {
    /// Underlying writer failed
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),

    /// Record could not be encoded
    #[error("encoding failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Sink refused the record
    #[error("record {sequence_index} rejected: {reason}")]
    Rejected {
        /// Sequence index of the rejected record
        sequence_index: usize,
        /// Why the sink refused it
        reason: String,
    },
}

/// Classification of a per-item rendering failure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Timeouts, rate limiting, transient network failures
    Transient,
    /// Malformed URL, authentication failure, 4xx-style rejection
    Permanent,
}

impl ErrorKind {
    /// Lowercase name used in records
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Transient => "transient",
            ErrorKind::Permanent => "permanent",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by a single rendering operation
///
/// Operations classify their own failures; the runner only looks at `retriable`.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind} error: {message}")]
pub struct ErrorRecord {
    /// Human-readable failure description
    pub message: String,
    /// Failure class
    pub kind: ErrorKind,
    /// Whether a retry may succeed
    pub retriable: bool,
}

impl ErrorRecord {
    /// A retriable failure
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ErrorKind::Transient,
            retriable: true,
        }
    }

    /// A failure that will not go away on retry
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ErrorKind::Permanent,
            retriable: false,
        }
    }

    /// The remote call did not answer in time
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::transient(format!("timed out: {}", message.into()))
    }

    /// The remote service asked us to slow down
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::transient(format!("rate limited: {}", message.into()))
    }

    /// Classify an HTTP-style status code returned by the remote service
    ///
    /// 408, 425, 429 and every 5xx are transient; any other code is permanent.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = format!("HTTP {}: {}", status, message.into());
        match status {
            408 | 425 | 429 | 500..=599 => Self::transient(message),
            _ => Self::permanent(message),
        }
    }
}
