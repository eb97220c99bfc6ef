//! Mock driver for testing.
//!
//! Scripted responses per statement, injectable failures at every lifecycle
//! step, and counters so tests can assert on what the connection manager did.

use super::{
    BackendError, Canceller, ConnectTarget, Connection, Driver, NativeType, RawColumn, RawResult,
    Value,
};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// What the mock does when a statement is executed.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Statement succeeds and `fetch_all` returns this result.
    Result(RawResult),
    /// `execute` fails with this error.
    Error(BackendError),
    /// `execute` never completes.
    HangOnExecute,
    /// `execute` succeeds, `fetch_all` never completes.
    HangOnFetch,
}

impl MockResponse {
    /// A result with the given `(name, native type)` columns and rows.
    pub fn rows(columns: Vec<(&str, NativeType)>, rows: Vec<Vec<Value>>) -> Self {
        let columns = columns
            .into_iter()
            .map(|(name, native_type)| RawColumn::new(name, native_type))
            .collect();
        Self::Result(RawResult {
            columns: Some(columns),
            rows,
        })
    }

    /// A statement without a result set (DDL/DML).
    pub fn no_result_set() -> Self {
        Self::Result(RawResult::default())
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(BackendError::new(message))
    }
}

/// Snapshot of everything the mock observed.
#[derive(Debug, Clone, Default)]
pub struct MockStats {
    pub connects: usize,
    pub targets: Vec<String>,
    pub connection_strings: Vec<String>,
    pub commands: Vec<String>,
    pub executed: Vec<String>,
    pub fetches: usize,
    pub cancels: usize,
    pub closes: usize,
}

#[derive(Debug, Default)]
struct MockState {
    responses: HashMap<String, MockResponse>,
    default_response: Option<MockResponse>,
    connect_error: Option<BackendError>,
    failing_commands: HashMap<String, BackendError>,
    close_error: Option<BackendError>,
    unavailable: bool,
    stats: MockStats,
}

/// A mock driver that returns predefined results.
#[derive(Debug, Clone, Default)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    /// Creates a mock where every statement echoes itself in a one-column result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the response for an exact statement text.
    pub fn with_response(self, sql: impl Into<String>, response: MockResponse) -> Self {
        self.lock().responses.insert(sql.into(), response);
        self
    }

    /// Scripts the response for statements without a dedicated response.
    pub fn with_default_response(self, response: MockResponse) -> Self {
        self.lock().default_response = Some(response);
        self
    }

    pub fn failing_connect(self, error: BackendError) -> Self {
        self.lock().connect_error = Some(error);
        self
    }

    pub fn failing_command(self, sql: impl Into<String>, error: BackendError) -> Self {
        self.lock().failing_commands.insert(sql.into(), error);
        self
    }

    pub fn failing_close(self, error: BackendError) -> Self {
        self.lock().close_error = Some(error);
        self
    }

    /// Makes `is_available` report false.
    pub fn unavailable(self) -> Self {
        self.lock().unavailable = true;
        self
    }

    pub fn stats(&self) -> MockStats {
        self.lock().stats.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        lock_state(&self.state)
    }
}

fn lock_state(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl Driver for MockDriver {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn is_available(&self) -> bool {
        !self.lock().unavailable
    }

    async fn connect(&self, target: &ConnectTarget) -> Result<Box<dyn Connection>, BackendError> {
        let mut state = self.lock();
        state.stats.connects += 1;
        state.stats.targets.push(target.display.clone());
        state
            .stats
            .connection_strings
            .push(target.connection_string.expose_secret().to_string());

        if let Some(error) = state.connect_error.clone() {
            return Err(error);
        }

        Ok(Box::new(MockConnection {
            state: Arc::clone(&self.state),
            pending: None,
        }))
    }
}

struct MockConnection {
    state: Arc<Mutex<MockState>>,
    pending: Option<MockResponse>,
}

#[async_trait]
impl Connection for MockConnection {
    fn canceller(&self) -> Arc<dyn Canceller> {
        Arc::new(MockCanceller {
            state: Arc::clone(&self.state),
        })
    }

    async fn run_command(&mut self, sql: &str) -> Result<(), BackendError> {
        let mut state = lock_state(&self.state);
        state.stats.commands.push(sql.to_string());
        match state.failing_commands.get(sql) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn execute(&mut self, sql: &str) -> Result<(), BackendError> {
        let response = {
            let mut state = lock_state(&self.state);
            state.stats.executed.push(sql.to_string());
            state
                .responses
                .get(sql)
                .or(state.default_response.as_ref())
                .cloned()
                .unwrap_or_else(|| echo_response(sql))
        };

        match response {
            MockResponse::Error(error) => Err(error),
            MockResponse::HangOnExecute => std::future::pending().await,
            other => {
                self.pending = Some(other);
                Ok(())
            }
        }
    }

    async fn fetch_all(&mut self) -> Result<RawResult, BackendError> {
        lock_state(&self.state).stats.fetches += 1;
        match self.pending.take() {
            Some(MockResponse::Result(result)) => Ok(result),
            Some(MockResponse::HangOnFetch) => std::future::pending().await,
            _ => Err(BackendError::new("no statement has been executed")),
        }
    }

    async fn close(self: Box<Self>) -> Result<(), BackendError> {
        let mut state = lock_state(&self.state);
        state.stats.closes += 1;
        match state.close_error.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

struct MockCanceller {
    state: Arc<Mutex<MockState>>,
}

impl Canceller for MockCanceller {
    fn cancel(&self) -> Result<bool, BackendError> {
        lock_state(&self.state).stats.cancels += 1;
        Ok(true)
    }
}

fn echo_response(sql: &str) -> MockResponse {
    MockResponse::rows(
        vec![("result", NativeType::Name("text".to_string()))],
        vec![vec![Value::String(format!("Mock result for: {sql}"))]],
    )
}
