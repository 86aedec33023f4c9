//! Error types for request construction, dispatch and streaming.
//!
//! Every failure is returned to the caller of the terminal send operation.
//! Variants fall into three groups:
//!
//! | Group | Variants | Raised before network I/O? |
//! |-------|----------|----------------------------|
//! | Construction | `Serialization`, `TypeMismatch`, `UnsupportedContentType`, `MissingPathVariable`, `RequestConstruction`, `FileAccess` | yes (except remote attachment downloads) |
//! | Transport | `Network`, `Timeout`, `Cancelled`, `BodyRead`, `NonOkStatus`, `StreamRead` | no |
//! | Caller | `Deserialization`, `Handler`, `RetriesExhausted` | no |
//!
//! `Timeout` and `Cancelled` are the deadline- and cancellation-flavoured
//! network errors; [`RestError::is_network`] treats all three alike.

use thiserror::Error;

/// Result type for rest-chain operations
pub type Result<T> = std::result::Result<T, RestError>;

/// Errors raised while building, sending or streaming a request
#[derive(Error, Debug)]
pub enum RestError {
    /// The payload could not be serialized, or could not be flattened to a
    /// string map for a form content-type
    #[error("payload serialization failed: {0}")]
    Serialization(String),

    /// The response body could not be deserialized into the requested target
    #[error("response deserialization failed: {0}")]
    Deserialization(String),

    /// The payload shape does not fit the declared content-type
    #[error("content-type {content_type} expects {expected}")]
    TypeMismatch {
        /// Declared content-type
        content_type: String,
        /// Payload shape that content-type accepts
        expected: &'static str,
    },

    /// The declared content-type has no encoder
    #[error("content-type [{0}] not supported")]
    UnsupportedContentType(String),

    /// A `:name` placeholder in the path has no value
    #[error("path variable [{0}] not set")]
    MissingPathVariable(String),

    /// The method or URL cannot form a valid request
    #[error("invalid request: {0}")]
    RequestConstruction(String),

    /// Connection, TLS or protocol failure
    #[error("network error: {0}")]
    Network(String),

    /// The context deadline elapsed
    #[error("network error: deadline exceeded")]
    Timeout,

    /// The context was cancelled
    #[error("network error: request cancelled")]
    Cancelled,

    /// A streaming endpoint answered with something other than 200
    #[error("error: {status}, body: {body}")]
    NonOkStatus {
        /// Status line text, e.g. `500 Internal Server Error`
        status: String,
        /// Drained response body
        body: String,
    },

    /// Draining a response body failed
    #[error("error: {0}, read rsp body failed")]
    BodyRead(String),

    /// Reading the event stream failed mid-way
    #[error("stream read failed: {0}")]
    StreamRead(String),

    /// An attachment could not be opened, read or downloaded
    #[error("file attachment [{path}]: {message}")]
    FileAccess {
        /// Path, URL or filename of the attachment
        path: String,
        /// Underlying failure
        message: String,
    },

    /// Error raised by a caller-supplied callback or retry predicate
    #[error("{0}")]
    Handler(Box<dyn std::error::Error + Send + Sync>),

    /// Every retry attempt failed
    #[error("all {attempts} attempts failed: {}", join_errors(.errors))]
    RetriesExhausted {
        /// Number of attempts made
        attempts: u32,
        /// Error of each attempt, in order
        errors: Vec<RestError>,
    },
}

impl RestError {
    /// Wrap an arbitrary error (or message) raised by caller code
    pub fn handler(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        RestError::Handler(err.into())
    }

    /// Build a `FileAccess` error
    pub fn file_access(path: impl Into<String>, message: impl ToString) -> Self {
        RestError::FileAccess {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Connection, timeout or cancellation failure
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            RestError::Network(_) | RestError::Timeout | RestError::Cancelled
        )
    }

    /// Check if error is retryable
    ///
    /// Construction errors are deterministic and never retryable; cancellation
    /// is the caller's decision and is not retried either.
    pub fn is_retryable(&self) -> bool {
        match self {
            RestError::Network(_) | RestError::Timeout | RestError::BodyRead(_) => true,
            RestError::StreamRead(_) => true,
            RestError::NonOkStatus { status, .. } => status
                .split_whitespace()
                .next()
                .and_then(|code| code.parse::<u16>().ok())
                .map(crate::client::is_retryable_status)
                .unwrap_or(false),
            RestError::Handler(_) => true,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for RestError {
    fn from(err: serde_json::Error) -> Self {
        RestError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for RestError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RestError::Timeout
        } else if err.is_builder() {
            RestError::RequestConstruction(err.to_string())
        } else {
            RestError::Network(err.to_string())
        }
    }
}

fn join_errors(errors: &[RestError]) -> String {
    errors
        .iter()
        .enumerate()
        .map(|(i, e)| format!("#{}: {}", i + 1, e))
        .collect::<Vec<_>>()
        .join("; ")
}
