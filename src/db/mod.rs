//! Driver layer for query runners.
//!
//! Provides a trait-based interface over backend drivers so the generic
//! connection lifecycle in `runner::manager` never sees a driver-specific
//! type. A driver hands out one `Connection` per run; the connection is
//! owned by exactly one caller and is consumed by `close`.

mod mock;
#[cfg(feature = "odbc")]
mod odbc;
mod sqlite;
mod types;

pub use mock::{MockDriver, MockResponse, MockStats};
#[cfg(feature = "odbc")]
pub use odbc::OdbcDriver;
pub use sqlite::SqliteDriver;
pub use types::{dbapi, NativeType, RawColumn, RawResult, Value};

use async_trait::async_trait;
use secrecy::SecretString;
use std::sync::Arc;
use thiserror::Error;

/// A failure reported by a driver, before any backend-specific message extraction.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct BackendError {
    /// Full text the driver reported.
    pub message: String,
    /// Optional structured detail (SQLSTATE, native error code, ...).
    pub detail: Option<String>,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Everything the driver reported, for diagnostics.
    pub fn raw_cause(&self) -> String {
        match &self.detail {
            Some(detail) => format!("{} ({})", self.message, detail),
            None => self.message.clone(),
        }
    }
}

/// Where and how to connect.
///
/// The full connection string may embed credentials and is kept secret;
/// `display` is the redacted form that is safe to log.
#[derive(Debug, Clone)]
pub struct ConnectTarget {
    pub connection_string: SecretString,
    pub display: String,
}

impl ConnectTarget {
    pub fn new(connection_string: impl Into<String>, display: impl Into<String>) -> Self {
        Self {
            connection_string: SecretString::from(connection_string.into()),
            display: display.into(),
        }
    }
}

/// Trait implemented by every backend driver.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Short driver name for logs.
    fn name(&self) -> &'static str;

    /// Reports whether the driver can be used in this process.
    fn is_available(&self) -> bool;

    /// Opens a new connection. No retries are attempted.
    async fn connect(&self, target: &ConnectTarget) -> Result<Box<dyn Connection>, BackendError>;
}

/// A single open backend connection.
#[async_trait]
pub trait Connection: Send {
    /// Returns a handle that can interrupt whatever this connection is executing.
    ///
    /// The handle is independent of `&mut self` so it can be used while an
    /// `execute` or `fetch_all` future is pending or was just dropped.
    fn canceller(&self) -> Arc<dyn Canceller>;

    /// Runs a session command on its own short-lived statement handle.
    async fn run_command(&mut self, sql: &str) -> Result<(), BackendError>;

    /// Submits the main statement.
    async fn execute(&mut self, sql: &str) -> Result<(), BackendError>;

    /// Retrieves column metadata and all rows of the last executed statement.
    async fn fetch_all(&mut self) -> Result<RawResult, BackendError>;

    /// Releases the connection.
    async fn close(self: Box<Self>) -> Result<(), BackendError>;
}

/// Backend-level statement cancellation.
pub trait Canceller: Send + Sync {
    /// Requests cancellation of the running statement.
    ///
    /// Returns `Ok(false)` when the backend has no cancel primitive and the
    /// statement is abandoned together with its connection instead.
    fn cancel(&self) -> Result<bool, BackendError>;
}

/// Canceller for connections whose backend has no cancel primitive.
#[derive(Debug, Default)]
pub struct NoopCanceller;

impl Canceller for NoopCanceller {
    fn cancel(&self) -> Result<bool, BackendError> {
        Ok(false)
    }
}

/// Stand-in for a driver that was not compiled into this build.
#[derive(Debug, Clone)]
pub struct UnavailableDriver {
    name: &'static str,
    reason: &'static str,
}

impl UnavailableDriver {
    pub fn new(name: &'static str, reason: &'static str) -> Self {
        Self { name, reason }
    }
}

#[async_trait]
impl Driver for UnavailableDriver {
    fn name(&self) -> &'static str {
        self.name
    }

    fn is_available(&self) -> bool {
        false
    }

    async fn connect(&self, _target: &ConnectTarget) -> Result<Box<dyn Connection>, BackendError> {
        Err(BackendError::new(self.reason))
    }
}
