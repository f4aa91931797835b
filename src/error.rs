//! Error types for docweave
//!
//! This module provides the error taxonomy shared by the dispatch primitives and
//! the concrete workers:
//! - [`Error`] - the crate-level error returned by queues, dispatchers and collaborators
//! - [`WorkerError`] - a single task failure, carrying a numeric code
//! - [`ContextError`] - cancellation or deadline expiry of a [`Context`](crate::context::Context)
//! - [`ResourceError`] - resource-handler lookups and local link resolution

use std::fmt;
use thiserror::Error;

/// Result type alias for docweave operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for docweave
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_workers")
        key: Option<String>,
    },

    /// A task was refused by a queue (closed or full)
    #[error("scheduling {task} on queue {queue} failed: queue is closed or full")]
    SchedulingRejected {
        /// Name of the queue that refused the task
        queue: String,
        /// Short description of the refused task
        task: String,
    },

    /// A worker failed while executing a task
    #[error(transparent)]
    Worker(#[from] WorkerError),

    /// The governing context was canceled or its deadline expired
    #[error(transparent)]
    Context(#[from] ContextError),

    /// Resource handler error
    #[error("resource error: {0}")]
    Resource(#[from] ResourceError),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// URL parsing error
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a configuration error for the given key
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }

    /// Returns true if this error reports cancellation or deadline expiry
    /// rather than an application failure
    pub fn is_cancellation(&self) -> bool {
        match self {
            Error::Context(_) => true,
            Error::Worker(e) => e.is_cancellation(),
            _ => false,
        }
    }
}

/// Terminal state of a [`Context`](crate::context::Context)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    /// The context was canceled explicitly
    #[error("context canceled")]
    Canceled,
    /// The context deadline passed
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Failure of a single task execution
///
/// Wraps the underlying error message with a numeric code. For HTTP workers the
/// code is the response status; other workers use `0` unless they have a more
/// specific marker. A worker error created from a [`ContextError`] reports
/// [`is_cancellation`](Self::is_cancellation) so callers can tell an aborted
/// task from a failed one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerError {
    message: String,
    code: i32,
    cancellation: Option<ContextError>,
}

impl WorkerError {
    /// Create a worker error from any displayable error and a code
    pub fn new(err: impl fmt::Display, code: i32) -> Self {
        Self {
            message: err.to_string(),
            code,
            cancellation: None,
        }
    }

    /// Numeric code attached to the failure
    pub fn code(&self) -> i32 {
        self.code
    }

    /// Error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The context error this failure stands for, if the task was aborted
    pub fn cancellation(&self) -> Option<ContextError> {
        self.cancellation
    }

    /// Returns true if the task was aborted by cancellation or deadline expiry
    pub fn is_cancellation(&self) -> bool {
        self.cancellation.is_some()
    }
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WorkerError {}

impl From<ContextError> for WorkerError {
    fn from(err: ContextError) -> Self {
        Self {
            message: err.to_string(),
            code: 0,
            cancellation: Some(err),
        }
    }
}

impl From<Error> for WorkerError {
    fn from(err: Error) -> Self {
        match err {
            Error::Worker(e) => e,
            Error::Context(e) => e.into(),
            other => WorkerError::new(other, 0),
        }
    }
}

/// Resource handler errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    /// The resource cannot be resolved locally
    #[error("resource {0} not found")]
    NotFound(String),

    /// No registered handler accepts the URI
    #[error("no suitable resource handler for {0}")]
    NoHandler(String),

    /// Response body exceeded the configured size limit
    #[error("reading {uri} failed: response body too large (limit {limit} bytes)")]
    TooLarge {
        /// The resource being read
        uri: String,
        /// Configured size limit in bytes
        limit: u64,
    },

    /// The remote side answered with an error status
    #[error("reading {uri} failed with response code {status}")]
    Status {
        /// The resource being read
        uri: String,
        /// HTTP status code
        status: u16,
    },
}
