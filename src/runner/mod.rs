//! The query runner contract and its generic SQL implementation.
//!
//! A `Backend` supplies everything that differs between databases: option
//! schema, driver, type mapping, catalog query, and error-message
//! extraction. `SqlRunner` combines a backend with a validated
//! `Configuration` and implements `QueryRunner` on top of the shared
//! `ConnectionManager`, `ResultNormalizer` and `SchemaIntrospector`.

pub mod charset;
pub mod introspect;
pub mod manager;
pub mod normalize;
pub mod options;
pub mod registry;
pub mod types;

pub use charset::Charset;
pub use introspect::{Schema, SchemaIntrospector, SchemaQuery, TableSchema};
pub use manager::{ConnectionManager, Phase, Session};
pub use normalize::ResultNormalizer;
pub use options::{Configuration, ConfigurationSchema, OptionKind, OptionSpec, SECRET_MASK};
pub use registry::Registry;
pub use types::{ColumnDescriptor, LogicalType, ResultSet, TypeMapper};

use crate::db::{BackendError, Driver};
use crate::error::{Cancelled, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, Instrument};

/// A query to run, with the identity of whoever asked for it.
///
/// `user` is only recorded in logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub text: String,
    pub user: Option<String>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            user: None,
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }
}

/// Outcome of a run that was not cancelled.
pub type RunResult = Result<ResultSet>;

/// The uniform adapter contract every backend satisfies.
#[async_trait]
pub trait QueryRunner: Send + Sync {
    /// Display name.
    fn name(&self) -> &'static str;

    /// Registry key.
    fn type_identifier(&self) -> &'static str;

    fn configuration_schema(&self) -> ConfigurationSchema;

    /// Whether the backend driver is usable in this process.
    fn is_enabled(&self) -> bool;

    /// Runs a query. `Err(Cancelled)` only when `cancel` fired.
    async fn run(
        &self,
        query: &Query,
        cancel: &CancellationToken,
    ) -> std::result::Result<RunResult, Cancelled>;

    /// Discovers tables and their columns through `run`.
    async fn get_schema(
        &self,
        cancel: &CancellationToken,
    ) -> std::result::Result<Result<Schema>, Cancelled>;

    /// Runs the backend's no-op query to check connectivity.
    async fn test_connection(
        &self,
        cancel: &CancellationToken,
    ) -> std::result::Result<Result<()>, Cancelled>;
}

/// Backend-specific half of a query runner.
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    fn type_identifier(&self) -> &'static str;

    fn configuration_schema(&self) -> ConfigurationSchema;

    fn driver(&self) -> &dyn Driver;

    fn type_mapper(&self) -> &dyn TypeMapper;

    /// Builds the connection target and session settings from validated options.
    fn session(&self, config: &Configuration) -> Result<Session>;

    /// Catalog query listing `(table, column)` pairs.
    fn schema_query(&self) -> SchemaQuery;

    fn noop_query(&self) -> &'static str {
        "SELECT 1"
    }

    /// Extracts the human-readable part of a driver failure.
    fn error_message(&self, error: &BackendError) -> String {
        error.message.clone()
    }

    fn is_enabled(&self) -> bool {
        self.driver().is_available()
    }
}

/// A configured query runner for one data source.
pub struct SqlRunner {
    backend: Arc<dyn Backend>,
    configuration: Configuration,
}

impl SqlRunner {
    /// Creates a runner from options already validated against the backend's schema.
    pub fn new(backend: Arc<dyn Backend>, configuration: Configuration) -> Self {
        Self {
            backend,
            configuration,
        }
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }
}

#[async_trait]
impl QueryRunner for SqlRunner {
    fn name(&self) -> &'static str {
        self.backend.name()
    }

    fn type_identifier(&self) -> &'static str {
        self.backend.type_identifier()
    }

    fn configuration_schema(&self) -> ConfigurationSchema {
        self.backend.configuration_schema()
    }

    fn is_enabled(&self) -> bool {
        self.backend.is_enabled()
    }

    async fn run(
        &self,
        query: &Query,
        cancel: &CancellationToken,
    ) -> std::result::Result<RunResult, Cancelled> {
        let span = info_span!(
            "run",
            runner = self.backend.type_identifier(),
            user = query.user.as_deref().unwrap_or("-"),
        );

        async {
            let session = match self.backend.session(&self.configuration) {
                Ok(session) => session,
                Err(e) => return Ok(Err(e)),
            };

            let extract = |e: &BackendError| self.backend.error_message(e);
            let manager = ConnectionManager::new(
                self.backend.driver(),
                self.backend.type_mapper(),
                &extract,
            );

            let outcome = manager.execute(&session, query, cancel).await;
            match &outcome {
                Ok(Ok(result)) => info!("Query returned {} rows", result.row_count()),
                Ok(Err(e)) => info!("Query failed: {}", e.category()),
                Err(_) => info!("Query cancelled"),
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn get_schema(
        &self,
        cancel: &CancellationToken,
    ) -> std::result::Result<Result<Schema>, Cancelled> {
        SchemaIntrospector::new(self.backend.schema_query())
            .introspect(self, cancel)
            .await
    }

    async fn test_connection(
        &self,
        cancel: &CancellationToken,
    ) -> std::result::Result<Result<()>, Cancelled> {
        let query = Query::new(self.backend.noop_query());
        Ok(self.run(&query, cancel).await?.map(|_| ()))
    }
}
