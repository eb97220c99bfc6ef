//! Error types for query runners.
//!
//! `RunnerError` covers every way a run can fail. Cancellation is not an error
//! and has its own type, `Cancelled`, so it cannot be absorbed by code that
//! handles failures generically.

use thiserror::Error;

/// Main error type for query runner operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RunnerError {
    /// Required option missing or malformed. Raised before any connection attempt.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The backend refused or failed to establish a connection.
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        raw_cause: Option<String>,
    },

    /// A startup command failed; the session was discarded.
    #[error("Startup command failed: {message}")]
    SessionSetup {
        message: String,
        raw_cause: Option<String>,
    },

    /// The backend rejected the submitted query. The message is the backend's own.
    #[error("{message}")]
    Query {
        message: String,
        raw_cause: Option<String>,
    },

    /// The statement ran but produced no result set shape at all.
    #[error("No data was returned.")]
    NoResultSet,

    /// The catalog query used for introspection failed.
    #[error("Failed getting schema: {0}")]
    SchemaUnavailable(String),

    /// Internal errors (broken invariants, worker failures, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RunnerError {
    /// Creates a configuration error with the given message.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection {
            message: msg.into(),
            raw_cause: None,
        }
    }

    /// Creates a session setup error with the given message.
    pub fn session_setup(msg: impl Into<String>) -> Self {
        Self::SessionSetup {
            message: msg.into(),
            raw_cause: None,
        }
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query {
            message: msg.into(),
            raw_cause: None,
        }
    }

    /// Creates a schema-unavailable error with the given message.
    pub fn schema_unavailable(msg: impl Into<String>) -> Self {
        Self::SchemaUnavailable(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Attaches backend-specific detail to errors that carry one.
    pub fn with_raw_cause(mut self, cause: Option<String>) -> Self {
        match &mut self {
            Self::Connection { raw_cause, .. }
            | Self::SessionSetup { raw_cause, .. }
            | Self::Query { raw_cause, .. } => *raw_cause = cause,
            _ => {}
        }
        self
    }

    /// Returns the backend-specific detail, if any.
    pub fn raw_cause(&self) -> Option<&str> {
        match self {
            Self::Connection { raw_cause, .. }
            | Self::SessionSetup { raw_cause, .. }
            | Self::Query { raw_cause, .. } => raw_cause.as_deref(),
            _ => None,
        }
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "Configuration Error",
            Self::Connection { .. } => "Connection Error",
            Self::SessionSetup { .. } => "Session Setup Error",
            Self::Query { .. } => "Query Error",
            Self::NoResultSet => "No Result Set",
            Self::SchemaUnavailable(_) => "Schema Unavailable",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Raised when an in-flight run is interrupted by its caller.
///
/// By the time a caller observes this, backend-side cancellation has been
/// requested and the connection has been released.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("query execution was cancelled")]
pub struct Cancelled;

/// Result type alias using RunnerError.
pub type Result<T> = std::result::Result<T, RunnerError>;
