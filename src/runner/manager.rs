//! Connection lifecycle for a single run.
//!
//! `Idle → Connecting → SessionSetup → Executing → Fetching → Closed`, with
//! `Failed` reachable from every step after `Idle`. Once a connection is
//! open it is closed exactly once, whatever the outcome. Cancellation is
//! observed through a `CancellationToken` and handled apart from errors:
//! backend-side cancel first, then cleanup, then `Cancelled` to the caller.

use super::charset::Charset;
use super::normalize::ResultNormalizer;
use super::types::{ResultSet, TypeMapper};
use super::Query;
use crate::db::{BackendError, Canceller, ConnectTarget, Connection, Driver};
use crate::error::{Cancelled, Result, RunnerError};
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Everything needed to open and prepare one connection.
#[derive(Debug, Clone)]
pub struct Session {
    pub target: ConnectTarget,
    pub startup_commands: Vec<String>,
    pub charset: Charset,
}

impl Session {
    pub fn new(target: ConnectTarget) -> Self {
        Self {
            target,
            startup_commands: Vec::new(),
            charset: Charset::Utf8,
        }
    }

    /// Splits a semicolon-delimited command list; blank segments are dropped.
    pub fn with_startup_commands(mut self, commands: &str) -> Self {
        self.startup_commands = commands
            .split(';')
            .map(str::trim)
            .filter(|sql| !sql.is_empty())
            .map(str::to_string)
            .collect();
        self
    }

    pub fn with_charset(mut self, charset: Charset) -> Self {
        self.charset = charset;
        self
    }
}

/// Execution phases of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Connecting,
    SessionSetup,
    Executing,
    Fetching,
    Closed,
    Failed,
}

#[derive(Debug)]
struct PhaseTracker {
    current: Phase,
}

impl PhaseTracker {
    fn new() -> Self {
        Self {
            current: Phase::Idle,
        }
    }

    fn advance(&mut self, next: Phase) {
        debug!("Run phase {:?} -> {:?}", self.current, next);
        self.current = next;
    }

    fn fail(&mut self) {
        if self.current != Phase::Failed {
            self.advance(Phase::Failed);
        }
    }
}

/// Extracts a human-readable message from a driver failure.
pub type MessageExtractor<'a> = &'a (dyn Fn(&BackendError) -> String + Sync);

/// Owns the connection lifecycle of one `run` call.
pub struct ConnectionManager<'a> {
    driver: &'a dyn Driver,
    normalizer: ResultNormalizer<'a>,
    extract: MessageExtractor<'a>,
}

impl<'a> ConnectionManager<'a> {
    pub fn new(
        driver: &'a dyn Driver,
        mapper: &'a dyn TypeMapper,
        extract: MessageExtractor<'a>,
    ) -> Self {
        Self {
            driver,
            normalizer: ResultNormalizer::new(mapper),
            extract,
        }
    }

    /// Connects, prepares the session, runs `query`, and always closes.
    ///
    /// The outer `Err(Cancelled)` is only produced when `cancel` fires; every
    /// backend failure comes back as the inner `Err`.
    pub async fn execute(
        &self,
        session: &Session,
        query: &Query,
        cancel: &CancellationToken,
    ) -> std::result::Result<Result<ResultSet>, Cancelled> {
        let mut phase = PhaseTracker::new();

        phase.advance(Phase::Connecting);
        info!("Connecting to {}", session.target.display);
        let connected = tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                phase.fail();
                return Err(Cancelled);
            }
            result = self.driver.connect(&session.target) => result,
        };

        let mut conn = match connected {
            Ok(conn) => conn,
            Err(e) => {
                phase.fail();
                warn!("Connection to {} failed: {}", session.target.display, e);
                return Ok(Err(
                    RunnerError::connection((self.extract)(&e)).with_raw_cause(Some(e.raw_cause()))
                ));
            }
        };

        let outcome = self.drive(conn.as_mut(), session, query, cancel, &mut phase).await;

        // Cleanup runs on every path; a failed close never replaces the outcome.
        if let Err(e) = conn.close().await {
            warn!("Failed to close connection: {}", (self.extract)(&e));
        }
        match &outcome {
            Ok(Ok(_)) => phase.advance(Phase::Closed),
            _ => phase.fail(),
        }

        outcome
    }

    async fn drive(
        &self,
        conn: &mut dyn Connection,
        session: &Session,
        query: &Query,
        cancel: &CancellationToken,
        phase: &mut PhaseTracker,
    ) -> std::result::Result<Result<ResultSet>, Cancelled> {
        let canceller = conn.canceller();

        phase.advance(Phase::SessionSetup);
        for command in &session.startup_commands {
            debug!("Running startup command: {}", command);
            let ran = interruptible(conn.run_command(command), cancel, canceller.as_ref()).await?;
            if let Err(e) = ran {
                phase.fail();
                return Ok(Err(
                    RunnerError::session_setup((self.extract)(&e))
                        .with_raw_cause(Some(e.raw_cause()))
                ));
            }
        }

        let sql = match session.charset.check(&query.text) {
            Ok(sql) => sql,
            Err(e) => {
                phase.fail();
                return Ok(Err(e));
            }
        };

        phase.advance(Phase::Executing);
        debug!("Running query: {}", sql);
        let executed = interruptible(conn.execute(sql), cancel, canceller.as_ref()).await?;
        if let Err(e) = executed {
            phase.fail();
            warn!("Query failed: {}", e);
            return Ok(Err(self.query_error(e)));
        }

        phase.advance(Phase::Fetching);
        let fetched = interruptible(conn.fetch_all(), cancel, canceller.as_ref()).await?;
        let raw = match fetched {
            Ok(raw) => raw,
            Err(e) => {
                phase.fail();
                warn!("Fetching results failed: {}", e);
                return Ok(Err(self.query_error(e)));
            }
        };

        Ok(self.normalizer.normalize(raw))
    }

    fn query_error(&self, error: BackendError) -> RunnerError {
        RunnerError::query((self.extract)(&error)).with_raw_cause(Some(error.raw_cause()))
    }
}

/// Races `work` against the cancellation token.
///
/// On cancellation the backend is asked to stop the running statement before
/// `Cancelled` is returned; `work` is dropped unfinished.
async fn interruptible<T>(
    work: impl Future<Output = T>,
    cancel: &CancellationToken,
    canceller: &dyn Canceller,
) -> std::result::Result<T, Cancelled> {
    tokio::select! {
        biased;

        _ = cancel.cancelled() => {
            request_backend_cancel(canceller);
            Err(Cancelled)
        }
        output = work => Ok(output),
    }
}

fn request_backend_cancel(canceller: &dyn Canceller) {
    match canceller.cancel() {
        Ok(true) => info!("Requested backend statement cancellation"),
        Ok(false) => debug!("Backend has no statement cancellation; abandoning statement"),
        Err(e) => warn!("Backend statement cancellation failed: {}", e),
    }
}
