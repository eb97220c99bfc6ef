//! SQLite driver implementation.
//!
//! Provides `SqliteDriver` over sqlx. SQLite runs in-process, so there is no
//! server-side statement to cancel; an interrupted statement is abandoned
//! together with its connection.

use super::{
    BackendError, Canceller, ConnectTarget, Connection, Driver, NativeType, NoopCanceller,
    RawColumn, RawResult, Value,
};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Column as SqlxColumn, ConnectOptions, Connection as SqlxConnection, Executor};
use sqlx::{Row as SqlxRow, Statement, TypeInfo, ValueRef};
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// SQLite driver. Always available; sqlx bundles the engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDriver;

#[async_trait]
impl Driver for SqliteDriver {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn connect(&self, target: &ConnectTarget) -> Result<Box<dyn Connection>, BackendError> {
        let options = SqliteConnectOptions::from_str(target.connection_string.expose_secret())
            .map_err(map_sqlx_error)?
            .disable_statement_logging();

        let conn = options.connect().await.map_err(map_sqlx_error)?;
        debug!("Opened SQLite connection to {}", target.display);

        Ok(Box::new(SqliteSession {
            conn,
            pending: None,
        }))
    }
}

struct SqliteSession {
    conn: SqliteConnection,
    pending: Option<RawResult>,
}

#[async_trait]
impl Connection for SqliteSession {
    fn canceller(&self) -> Arc<dyn Canceller> {
        Arc::new(NoopCanceller)
    }

    async fn run_command(&mut self, sql: &str) -> Result<(), BackendError> {
        sqlx::query(sql)
            .execute(&mut self.conn)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn execute(&mut self, sql: &str) -> Result<(), BackendError> {
        // Prepare first: statement metadata is known even when no row comes back,
        // and statements without a result shape report zero columns.
        let statement = (&mut self.conn).prepare(sql).await.map_err(map_sqlx_error)?;
        let columns: Vec<RawColumn> = statement
            .columns()
            .iter()
            .map(|col| {
                RawColumn::new(
                    col.name(),
                    NativeType::Name(col.type_info().name().to_string()),
                )
            })
            .collect();

        let rows = sqlx::query(sql)
            .fetch_all(&mut self.conn)
            .await
            .map_err(map_sqlx_error)?;

        self.pending = Some(RawResult {
            columns: (!columns.is_empty()).then_some(columns),
            rows: rows.iter().map(convert_row).collect(),
        });
        Ok(())
    }

    async fn fetch_all(&mut self) -> Result<RawResult, BackendError> {
        self.pending
            .take()
            .ok_or_else(|| BackendError::new("no statement has been executed"))
    }

    async fn close(self: Box<Self>) -> Result<(), BackendError> {
        self.conn.close().await.map_err(map_sqlx_error)
    }
}

/// Converts a sqlx SqliteRow to driver values.
///
/// SQLite types values, not columns, so each cell is read by its storage
/// class. Declared BOOLEAN columns store integers and are read back as bools.
fn convert_row(row: &SqliteRow) -> Vec<Value> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| {
            let storage = row
                .try_get_raw(i)
                .map(|raw| raw.type_info().name().to_string())
                .unwrap_or_default();
            let declared_bool = col.type_info().name().eq_ignore_ascii_case("BOOLEAN");
            let type_name = if declared_bool && storage == "INTEGER" {
                "BOOLEAN"
            } else {
                storage.as_str()
            };
            convert_value(row, i, type_name)
        })
        .collect()
}

/// Converts a single column value using the storage class of that cell.
fn convert_value(row: &SqliteRow, index: usize, type_name: &str) -> Value {
    match type_name.to_uppercase().as_str() {
        "NULL" => Value::Null,

        "BOOLEAN" => row
            .try_get::<Option<bool>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),

        "INTEGER" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Int)
            .unwrap_or(Value::Null),

        "REAL" | "NUMERIC" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Float)
            .unwrap_or(Value::Null),

        "BLOB" => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null),

        // TEXT, DATE, DATETIME and anything else come back as text
        _ => row
            .try_get::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

fn map_sqlx_error(error: sqlx::Error) -> BackendError {
    match error.as_database_error() {
        Some(db_error) => {
            let backend = BackendError::new(db_error.message());
            match db_error.code() {
                Some(code) => backend.with_detail(format!("code: {code}")),
                None => backend,
            }
        }
        None => BackendError::new(error.to_string()),
    }
}
