//! Cancellation of in-flight runs.

use super::sybase_runner;
use query_runner::db::{dbapi, MockDriver, MockResponse, NativeType, Value};
use query_runner::error::Cancelled;
use query_runner::runner::{Query, QueryRunner, Registry};
use serde_json::json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A token that fires after `delay`.
fn cancel_after(delay: Duration) -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        trigger.cancel();
    });
    token
}

#[tokio::test]
async fn test_cancel_while_fetching() {
    let driver = MockDriver::new().with_default_response(MockResponse::HangOnFetch);
    let runner = sybase_runner(&driver);

    let outcome = runner
        .run(
            &Query::new("SELECT * FROM huge_table"),
            &cancel_after(Duration::from_millis(50)),
        )
        .await;

    assert!(matches!(outcome, Err(Cancelled)));
    let stats = driver.stats();
    assert_eq!(stats.executed, vec!["SELECT * FROM huge_table"]);
    assert_eq!(stats.cancels, 1);
    assert_eq!(stats.closes, 1);
}

#[tokio::test]
async fn test_cancel_while_executing() {
    let driver = MockDriver::new().with_default_response(MockResponse::HangOnExecute);
    let runner = sybase_runner(&driver);

    let outcome = runner
        .run(
            &Query::new("WAITFOR DELAY '01:00:00'"),
            &cancel_after(Duration::from_millis(50)),
        )
        .await;

    assert!(matches!(outcome, Err(Cancelled)));
    let stats = driver.stats();
    assert_eq!(stats.fetches, 0);
    assert_eq!(stats.cancels, 1);
    assert_eq!(stats.closes, 1);
}

#[tokio::test]
async fn test_cancelled_token_never_connects() {
    let driver = MockDriver::new();
    let runner = sybase_runner(&driver);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = runner.run(&Query::new("SELECT 1"), &cancel).await;

    assert!(matches!(outcome, Err(Cancelled)));
    assert_eq!(driver.stats().connects, 0);
}

#[tokio::test]
async fn test_cancel_propagates_through_schema() {
    let driver = MockDriver::new().with_default_response(MockResponse::HangOnFetch);
    let runner = sybase_runner(&driver);

    let outcome = runner
        .get_schema(&cancel_after(Duration::from_millis(50)))
        .await;

    assert!(matches!(outcome, Err(Cancelled)));
    assert_eq!(driver.stats().closes, 1);
}

#[tokio::test]
async fn test_run_after_cancelled_run_succeeds() {
    let driver = MockDriver::new()
        .with_response("SELECT slow", MockResponse::HangOnFetch)
        .with_response(
            "SELECT fast",
            MockResponse::rows(
                vec![("n", NativeType::Code(dbapi::NUMBER))],
                vec![vec![Value::Int(1)]],
            ),
        );
    let runner = sybase_runner(&driver);

    let first = runner
        .run(&Query::new("SELECT slow"), &cancel_after(Duration::from_millis(20)))
        .await;
    assert!(matches!(first, Err(Cancelled)));

    let second = runner
        .run(&Query::new("SELECT fast"), &CancellationToken::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.row_count(), 1);

    let stats = driver.stats();
    assert_eq!(stats.connects, 2);
    assert_eq!(stats.closes, 2);
}

#[tokio::test]
async fn test_sqlite_cancelled_before_start() {
    let runner = Registry::with_defaults()
        .create("sqlite", json!({"database": ":memory:"}))
        .unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = runner.run(&Query::new("SELECT 1"), &cancel).await;
    assert!(matches!(outcome, Err(Cancelled)));
}
