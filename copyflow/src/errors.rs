//! Error types for copyflow.
//!
//! Content-shaped anomalies (malformed markup, broken embedded JSON, ids
//! missing from a service response) are never errors: they degrade to
//! "leave this text alone". The types here cover the failures a caller
//! has to act on.

use std::collections::HashMap;
use thiserror::Error;

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, CopyflowError>;

/// The main error type for copyflow operations.
#[derive(Debug, Error)]
pub enum CopyflowError {
    /// Missing or invalid configuration. Raised before any request is made.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A request to the text-generation service failed.
    #[error("{0}")]
    Service(#[from] ServiceError),

    /// The content repository could not be read or written.
    #[error("Repository error: {0}")]
    Repository(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The run was cancelled between suspension points.
    #[error("Rewrite cancelled: {0}")]
    Cancelled(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for CopyflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl CopyflowError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates a repository error.
    #[must_use]
    pub fn repository(message: impl Into<String>) -> Self {
        Self::Repository(message.into())
    }

    /// Whether retrying the same operation could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Service(err) => err.is_retryable(),
            Self::Io(_) => true,
            _ => false,
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let kind = match self {
            Self::Config(_) => "config",
            Self::Service(_) => "service",
            Self::Repository(_) => "repository",
            Self::Serialization(_) => "serialization",
            Self::Cancelled(_) => "cancelled",
            Self::Io(_) => "io",
        };
        let mut map = HashMap::new();
        map.insert("kind".to_string(), serde_json::Value::String(kind.to_string()));
        map.insert("message".to_string(), serde_json::Value::String(self.to_string()));
        map.insert("retryable".to_string(), serde_json::Value::Bool(self.is_retryable()));
        map
    }
}

/// Failure of a single exchange with the text-generation service.
///
/// One of these fails one batch; it never aborts the page.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// The request never produced a response (connect, timeout, TLS).
    #[error("Service transport error: {0}")]
    Transport(String),

    /// The service answered with a non-2xx status.
    #[error("Service returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// The response carried no usable `choices[0].message.content`.
    #[error("Service response contained no completion choice")]
    EmptyChoice,

    /// The response body was not the expected JSON shape.
    #[error("Service response could not be decoded: {0}")]
    Decode(String),
}

impl ServiceError {
    /// Whether this failure is worth another attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::EmptyChoice | Self::Decode(_) => false,
        }
    }

    /// HTTP status, if the service answered at all.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
