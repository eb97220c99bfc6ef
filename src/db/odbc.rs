//! ODBC driver implementation.
//!
//! odbc-api connections are tied to the thread-unsafe ODBC handle model, so
//! each connection lives on its own worker thread and is driven through a
//! request channel. The statement handle of the running query is published
//! to a shared slot so `SQLCancel` can be issued from the caller's side.
//! A cancel that arrives before the worker reaches the statement is recorded
//! in the slot, and the worker refuses to start any further statement.
//!
//! Connections are opened with a UTF-8 client charset, so cell text is
//! decoded as UTF-8.

use super::types::dbapi;
use super::{
    BackendError, Canceller, ConnectTarget, Connection, Driver, NativeType, RawColumn, RawResult,
    Value,
};
use async_trait::async_trait;
use odbc_api::buffers::TextRowSet;
use odbc_api::handles::{AsStatementRef, Statement as _};
use odbc_api::{ConnectionOptions, Cursor, DataType, Environment, ResultSetMetadata};
use secrecy::{ExposeSecret, SecretString};
use std::sync::{Arc, Mutex, OnceLock};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Rows fetched per round trip.
const BATCH_SIZE: usize = 1000;

/// Upper bound for a single text cell. Longer values fail the fetch.
const MAX_STR_LEN: usize = 4096;

/// Class code for ODBC types outside the DB-API classes.
const CLASS_UNKNOWN: i32 = 0;

static ENVIRONMENT: OnceLock<Environment> = OnceLock::new();

fn environment() -> Result<&'static Environment, BackendError> {
    if let Some(env) = ENVIRONMENT.get() {
        return Ok(env);
    }
    let env = Environment::new().map_err(map_odbc_error)?;
    Ok(ENVIRONMENT.get_or_init(|| env))
}

/// Driver backed by the system ODBC driver manager.
#[derive(Debug, Clone)]
pub struct OdbcDriver {
    /// Substrings identifying a suitable installed ODBC driver.
    driver_markers: &'static [&'static str],
}

impl OdbcDriver {
    pub fn new(driver_markers: &'static [&'static str]) -> Self {
        Self { driver_markers }
    }

    fn probe(&self) -> bool {
        let env = match environment() {
            Ok(env) => env,
            Err(e) => {
                debug!("ODBC driver manager unavailable: {}", e);
                return false;
            }
        };

        match env.drivers() {
            Ok(drivers) => drivers.iter().any(|info| {
                let description = info.description.to_lowercase();
                self.driver_markers
                    .iter()
                    .any(|marker| description.contains(&marker.to_lowercase()))
            }),
            Err(e) => {
                debug!("Could not list ODBC drivers: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl Driver for OdbcDriver {
    fn name(&self) -> &'static str {
        "odbc"
    }

    fn is_available(&self) -> bool {
        static AVAILABLE: OnceLock<bool> = OnceLock::new();
        *AVAILABLE.get_or_init(|| self.probe())
    }

    async fn connect(&self, target: &ConnectTarget) -> Result<Box<dyn Connection>, BackendError> {
        let env = environment()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let running = Slot::default();

        let conn_str = target.connection_string.clone();
        let slot = Arc::clone(&running);
        std::thread::Builder::new()
            .name("odbc-connection".to_string())
            .spawn(move || worker(env, conn_str, slot, ready_tx, rx))
            .map_err(|e| BackendError::new(format!("could not start ODBC worker: {e}")))?;

        ready_rx.await.map_err(|_| worker_gone())??;
        debug!("Opened ODBC connection to {}", target.display);

        Ok(Box::new(OdbcSession {
            requests: tx,
            running,
            pending: None,
        }))
    }
}

/// Raw statement handle of the query currently running on a worker.
struct RunningStatement(odbc_api::sys::HStmt);

// SQLCancel is the one ODBC call specified to be safe from another thread.
unsafe impl Send for RunningStatement {}

#[derive(Default)]
struct SlotState {
    statement: Option<RunningStatement>,
    cancel_requested: bool,
}

type Slot = Arc<Mutex<SlotState>>;

fn lock(slot: &Slot) -> std::sync::MutexGuard<'_, SlotState> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn cancelled_before_start() -> BackendError {
    BackendError::new("statement was cancelled before it started")
}

/// Publishes `handle` as the running statement unless a cancel is pending.
fn begin_statement(slot: &Slot, handle: odbc_api::sys::HStmt) -> Result<(), BackendError> {
    let mut state = lock(slot);
    if state.cancel_requested {
        return Err(cancelled_before_start());
    }
    state.statement = Some(RunningStatement(handle));
    Ok(())
}

/// Unpublishes the running statement before its handle is freed.
fn end_statement(slot: &Slot) {
    lock(slot).statement = None;
}

fn check_cancelled(slot: &Slot) -> Result<(), BackendError> {
    if lock(slot).cancel_requested {
        Err(BackendError::new("statement was cancelled"))
    } else {
        Ok(())
    }
}

enum Request {
    Command {
        sql: String,
        reply: oneshot::Sender<Result<(), BackendError>>,
    },
    Query {
        sql: String,
        reply: oneshot::Sender<Result<RawResult, BackendError>>,
    },
    Close {
        reply: oneshot::Sender<Result<(), BackendError>>,
    },
}

fn worker(
    env: &'static Environment,
    conn_str: SecretString,
    slot: Slot,
    ready: oneshot::Sender<Result<(), BackendError>>,
    mut requests: mpsc::UnboundedReceiver<Request>,
) {
    let conn = match env
        .connect_with_connection_string(conn_str.expose_secret(), ConnectionOptions::default())
    {
        Ok(conn) => {
            let _ = ready.send(Ok(()));
            conn
        }
        Err(e) => {
            let _ = ready.send(Err(map_odbc_error(e)));
            return;
        }
    };

    while let Some(request) = requests.blocking_recv() {
        match request {
            Request::Command { sql, reply } => {
                let _ = reply.send(run_command(&conn, &sql, &slot));
            }
            Request::Query { sql, reply } => {
                let _ = reply.send(run_query(&conn, &sql, &slot));
            }
            Request::Close { reply } => {
                drop(conn);
                let _ = reply.send(Ok(()));
                return;
            }
        }
    }
}

fn run_command(
    conn: &odbc_api::Connection<'static>,
    sql: &str,
    slot: &Slot,
) -> Result<(), BackendError> {
    let mut stmt = conn.preallocate().map_err(map_odbc_error)?;
    begin_statement(slot, stmt.as_stmt_ref().as_sys())?;

    let result = stmt.execute(sql, ()).map(|_| ()).map_err(map_odbc_error);

    end_statement(slot);
    drop(stmt);
    result
}

fn run_query(
    conn: &odbc_api::Connection<'static>,
    sql: &str,
    slot: &Slot,
) -> Result<RawResult, BackendError> {
    let mut stmt = conn.preallocate().map_err(map_odbc_error)?;
    begin_statement(slot, stmt.as_stmt_ref().as_sys())?;

    let result = match stmt.execute(sql, ()) {
        Ok(Some(cursor)) => fetch_cursor(cursor, slot),
        Ok(None) => Ok(RawResult::default()),
        Err(e) => Err(map_odbc_error(e)),
    };

    end_statement(slot);
    drop(stmt);
    result
}

fn fetch_cursor(mut cursor: impl Cursor, slot: &Slot) -> Result<RawResult, BackendError> {
    let num_cols = cursor.num_result_cols().map_err(map_odbc_error)? as u16;
    if num_cols == 0 {
        return Ok(RawResult::default());
    }

    let mut columns = Vec::with_capacity(num_cols as usize);
    for i in 1..=num_cols {
        let name = cursor.col_name(i).map_err(map_odbc_error)?;
        let data_type = cursor.col_data_type(i).map_err(map_odbc_error)?;
        columns.push(RawColumn::new(name, NativeType::Code(class_of(&data_type))));
    }

    let buffer = TextRowSet::for_cursor(BATCH_SIZE, &mut cursor, Some(MAX_STR_LEN))
        .map_err(map_odbc_error)?;
    let mut row_set_cursor = cursor.bind_buffer(buffer).map_err(map_odbc_error)?;

    let mut rows = Vec::new();
    loop {
        // SQLCancel does not interrupt an idle cursor between batches.
        check_cancelled(slot)?;
        let batch = match row_set_cursor.fetch_with_truncation_check(true) {
            Ok(Some(batch)) => batch,
            Ok(None) => break,
            Err(e) => return Err(map_fetch_error(e, &columns)),
        };
        for row_idx in 0..batch.num_rows() {
            let row = columns
                .iter()
                .enumerate()
                .map(|(col_idx, column)| match batch.at(col_idx, row_idx) {
                    Some(bytes) => parse_cell(&column.native_type, bytes),
                    None => Value::Null,
                })
                .collect();
            rows.push(row);
        }
    }

    Ok(RawResult {
        columns: Some(columns),
        rows,
    })
}

fn map_fetch_error(error: odbc_api::Error, columns: &[RawColumn]) -> BackendError {
    match error {
        odbc_api::Error::TooLargeValueForBuffer { buffer_index, .. } => {
            let column = columns
                .get(buffer_index)
                .map(|c| c.name.as_str())
                .unwrap_or("?");
            BackendError::new(format!(
                "value in column '{column}' is longer than {MAX_STR_LEN} bytes"
            ))
        }
        other => map_odbc_error(other),
    }
}

/// Groups ODBC SQL data types into DB-API column classes.
fn class_of(data_type: &DataType) -> i32 {
    match data_type {
        DataType::Char { .. }
        | DataType::WChar { .. }
        | DataType::Varchar { .. }
        | DataType::WVarchar { .. }
        | DataType::LongVarchar { .. } => dbapi::STRING,
        DataType::Binary { .. } | DataType::Varbinary { .. } | DataType::LongVarbinary { .. } => {
            dbapi::BINARY
        }
        DataType::TinyInt { .. }
        | DataType::SmallInt { .. }
        | DataType::Integer { .. }
        | DataType::BigInt { .. }
        | DataType::Bit { .. } => dbapi::NUMBER,
        DataType::Date { .. } | DataType::Time { .. } | DataType::Timestamp { .. } => {
            dbapi::DATETIME
        }
        DataType::Numeric { .. }
        | DataType::Decimal { .. }
        | DataType::Float { .. }
        | DataType::Real { .. }
        | DataType::Double { .. } => dbapi::DECIMAL,
        _ => CLASS_UNKNOWN,
    }
}

fn parse_cell(native_type: &NativeType, bytes: &[u8]) -> Value {
    let text = String::from_utf8_lossy(bytes).into_owned();
    match native_type {
        NativeType::Code(dbapi::NUMBER) => text
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .or_else(|_| text.trim().parse::<f64>().map(Value::Float))
            .unwrap_or(Value::String(text)),
        NativeType::Code(dbapi::DECIMAL) => text
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .unwrap_or(Value::String(text)),
        _ => Value::String(text),
    }
}

struct OdbcSession {
    requests: mpsc::UnboundedSender<Request>,
    running: Slot,
    pending: Option<RawResult>,
}

impl OdbcSession {
    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T, BackendError>>) -> Request,
    ) -> Result<T, BackendError> {
        let (reply, response) = oneshot::channel();
        self.requests.send(make(reply)).map_err(|_| worker_gone())?;
        response.await.map_err(|_| worker_gone())?
    }
}

#[async_trait]
impl Connection for OdbcSession {
    fn canceller(&self) -> Arc<dyn Canceller> {
        Arc::new(OdbcCanceller {
            running: Arc::clone(&self.running),
        })
    }

    async fn run_command(&mut self, sql: &str) -> Result<(), BackendError> {
        let sql = sql.to_string();
        self.call(|reply| Request::Command { sql, reply }).await
    }

    async fn execute(&mut self, sql: &str) -> Result<(), BackendError> {
        let sql = sql.to_string();
        let result = self.call(|reply| Request::Query { sql, reply }).await?;
        self.pending = Some(result);
        Ok(())
    }

    async fn fetch_all(&mut self) -> Result<RawResult, BackendError> {
        self.pending
            .take()
            .ok_or_else(|| BackendError::new("no statement has been executed"))
    }

    async fn close(self: Box<Self>) -> Result<(), BackendError> {
        self.call(|reply| Request::Close { reply }).await
    }
}

struct OdbcCanceller {
    running: Slot,
}

impl Canceller for OdbcCanceller {
    fn cancel(&self) -> Result<bool, BackendError> {
        // Holding the lock keeps the worker from freeing the handle mid-call.
        let mut state = lock(&self.running);
        state.cancel_requested = true;
        let Some(running) = state.statement.as_ref() else {
            debug!("Cancel recorded before the statement started");
            return Ok(true);
        };

        let ret = unsafe { odbc_api::sys::SQLCancel(running.0) };
        if ret == odbc_api::sys::SqlReturn::SUCCESS
            || ret == odbc_api::sys::SqlReturn::SUCCESS_WITH_INFO
        {
            Ok(true)
        } else {
            warn!("SQLCancel returned {:?}", ret);
            Err(BackendError::new("statement cancellation was rejected by the driver"))
        }
    }
}

fn worker_gone() -> BackendError {
    BackendError::new("ODBC connection worker stopped unexpectedly")
}

/// Keeps the driver's diagnostic text; SQLSTATE and native code go into `detail`.
fn map_odbc_error(error: odbc_api::Error) -> BackendError {
    match &error {
        odbc_api::Error::Diagnostics { record, .. } => {
            BackendError::new(record.to_string()).with_detail(format!("{:?}", record.state))
        }
        _ => BackendError::new(error.to_string()),
    }
}
