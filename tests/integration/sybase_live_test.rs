//! Sybase ASE tests against a live server.
//!
//! Need a build with `--features odbc`, an installed ASE ODBC driver, and:
//! `SYBASE_TEST_SERVER`, `SYBASE_TEST_DB`, `SYBASE_TEST_USER`,
//! `SYBASE_TEST_PASSWORD` (optional `SYBASE_TEST_PORT`, `SYBASE_TEST_DRIVER`).

use query_runner::error::{Cancelled, RunnerError};
use query_runner::runner::{Query, QueryRunner, Registry, SqlRunner};
use serde_json::{json, Map, Value as JsonValue};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Builds a runner from `SYBASE_TEST_*` variables, or `None` to skip.
fn get_test_runner() -> Option<SqlRunner> {
    let server = std::env::var("SYBASE_TEST_SERVER").ok()?;
    let db = std::env::var("SYBASE_TEST_DB").ok()?;

    let registry = Registry::with_defaults();
    if !registry.contains("sybase") {
        eprintln!("Skipping test: Sybase runner not enabled in this build");
        return None;
    }

    let mut options = Map::new();
    options.insert("server".into(), json!(server));
    options.insert("db".into(), json!(db));
    for (key, var) in [
        ("user", "SYBASE_TEST_USER"),
        ("password", "SYBASE_TEST_PASSWORD"),
        ("driver", "SYBASE_TEST_DRIVER"),
    ] {
        if let Ok(value) = std::env::var(var) {
            options.insert(key.into(), json!(value));
        }
    }
    if let Some(port) = std::env::var("SYBASE_TEST_PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
    {
        options.insert("port".into(), json!(port));
    }

    registry.create("sybase", JsonValue::Object(options)).ok()
}

#[tokio::test]
async fn test_live_connection() {
    let Some(runner) = get_test_runner() else {
        eprintln!("Skipping test: SYBASE_TEST_SERVER/SYBASE_TEST_DB not set");
        return;
    };

    let outcome = runner
        .test_connection(&CancellationToken::new())
        .await
        .unwrap();
    assert!(outcome.is_ok(), "connection test failed: {outcome:?}");
}

#[tokio::test]
async fn test_live_select() {
    let Some(runner) = get_test_runner() else {
        eprintln!("Skipping test: SYBASE_TEST_SERVER/SYBASE_TEST_DB not set");
        return;
    };

    let result = runner
        .run(
            &Query::new("SELECT 1 AS one, 'x' AS letter"),
            &CancellationToken::new(),
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(result.columns()[0].name, "one");
    assert_eq!(result.columns()[1].name, "letter");
    assert_eq!(result.row_count(), 1);
}

#[tokio::test]
async fn test_live_syntax_error() {
    let Some(runner) = get_test_runner() else {
        eprintln!("Skipping test: SYBASE_TEST_SERVER/SYBASE_TEST_DB not set");
        return;
    };

    let err = runner
        .run(&Query::new("SELECT * FORM sysobjects"), &CancellationToken::new())
        .await
        .unwrap()
        .unwrap_err();

    assert!(matches!(err, RunnerError::Query { .. }));
    assert!(!err.to_string().starts_with("State:"));
}

#[tokio::test]
async fn test_live_schema() {
    let Some(runner) = get_test_runner() else {
        eprintln!("Skipping test: SYBASE_TEST_SERVER/SYBASE_TEST_DB not set");
        return;
    };

    let schema = runner
        .get_schema(&CancellationToken::new())
        .await
        .unwrap()
        .unwrap();

    assert!(schema.table("sysobjects").is_none());
}

#[tokio::test]
async fn test_live_cancel() {
    let Some(runner) = get_test_runner() else {
        eprintln!("Skipping test: SYBASE_TEST_SERVER/SYBASE_TEST_DB not set");
        return;
    };

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        trigger.cancel();
    });

    let outcome = runner
        .run(&Query::new("WAITFOR DELAY '00:01:00' SELECT 1"), &cancel)
        .await;
    assert!(matches!(outcome, Err(Cancelled)));
}
