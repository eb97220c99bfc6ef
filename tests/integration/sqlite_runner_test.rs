//! End-to-end runs against SQLite.
//!
//! Each run opens a fresh connection, so in-memory databases are seeded
//! through the startup command.

use pretty_assertions::assert_eq;
use query_runner::db::Value;
use query_runner::error::{Result, RunnerError};
use query_runner::runner::{LogicalType, Query, QueryRunner, Registry, ResultSet, SqlRunner};
use serde_json::json;
use tokio_util::sync::CancellationToken;

const SEED: &str = "\
CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, score REAL, avatar BLOB);
INSERT INTO users VALUES (1, 'ada', 9.5, x'cafe');
INSERT INTO users VALUES (2, 'bob', NULL, NULL);
CREATE TABLE teams (id INTEGER, label TEXT)";

fn seeded_runner() -> SqlRunner {
    Registry::with_defaults()
        .create(
            "sqlite",
            json!({"database": ":memory:", "startup_command": SEED}),
        )
        .unwrap()
}

async fn run(runner: &SqlRunner, sql: &str) -> Result<ResultSet> {
    runner
        .run(&Query::new(sql), &CancellationToken::new())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_select_returns_typed_columns_and_rows() {
    let runner = seeded_runner();
    let result = run(&runner, "SELECT id, name, score FROM users ORDER BY id")
        .await
        .unwrap();

    let names: Vec<_> = result.columns().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "name", "score"]);
    assert_eq!(result.columns()[0].logical_type, LogicalType::Integer);
    assert_eq!(result.columns()[1].logical_type, LogicalType::String);
    assert_eq!(result.columns()[2].logical_type, LogicalType::Float);

    assert_eq!(
        result.rows(),
        &[
            vec![Value::Int(1), Value::from("ada"), Value::Float(9.5)],
            vec![Value::Int(2), Value::from("bob"), Value::Null],
        ]
    );
}

#[tokio::test]
async fn test_wire_shape() {
    let runner = seeded_runner();
    let result = run(&runner, "SELECT id, avatar FROM users WHERE id = 1")
        .await
        .unwrap();

    assert_eq!(
        result.to_json(),
        json!({
            "columns": [
                {"name": "id", "type": "integer"},
                {"name": "avatar", "type": "binary"},
            ],
            "rows": [{"id": 1, "avatar": "yv4="}],
        })
    );
}

#[tokio::test]
async fn test_rows_match_column_count() {
    let runner = seeded_runner();
    let result = run(&runner, "SELECT * FROM users").await.unwrap();

    for row in result.rows() {
        assert_eq!(row.len(), result.columns().len());
    }
    for record in result.records() {
        let keys: Vec<_> = record.iter().map(|(name, _)| *name).collect();
        assert_eq!(keys, vec!["id", "name", "score", "avatar"]);
    }
}

#[tokio::test]
async fn test_empty_result_keeps_columns() {
    let runner = seeded_runner();
    let result = run(&runner, "SELECT id, name FROM users WHERE id < 0")
        .await
        .unwrap();

    assert_eq!(result.columns().len(), 2);
    assert!(result.is_empty());
}

#[tokio::test]
async fn test_statement_without_result_set() {
    let runner = seeded_runner();

    let err = run(&runner, "CREATE TABLE extra (x INTEGER)").await.unwrap_err();
    assert_eq!(err, RunnerError::NoResultSet);
    assert_eq!(err.to_string(), "No data was returned.");

    let err = run(&runner, "UPDATE users SET name = 'eve'").await.unwrap_err();
    assert_eq!(err, RunnerError::NoResultSet);
}

#[tokio::test]
async fn test_duplicate_column_names_are_renamed() {
    let runner = seeded_runner();
    let result = run(&runner, "SELECT u.id, t.id, u.id FROM users u JOIN teams t ON 1 = 1")
        .await
        .unwrap();

    let names: Vec<_> = result.columns().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "id1", "id2"]);
}

#[tokio::test]
async fn test_query_error_carries_backend_message() {
    let runner = seeded_runner();
    let err = run(&runner, "SELECT * FROM missing_table").await.unwrap_err();

    assert!(matches!(err, RunnerError::Query { .. }));
    assert!(err.to_string().contains("missing_table"));
}

#[tokio::test]
async fn test_failing_startup_command() {
    let runner = Registry::with_defaults()
        .create(
            "sqlite",
            json!({"database": ":memory:", "startup_command": "PRAGMA nonsense(; SELECT 1"}),
        )
        .unwrap();

    let err = run(&runner, "SELECT 1").await.unwrap_err();
    assert!(matches!(err, RunnerError::SessionSetup { .. }));
}

#[tokio::test]
async fn test_schema() {
    let runner = seeded_runner();
    let schema = runner
        .get_schema(&CancellationToken::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        schema.to_json(),
        json!({
            "teams": {"name": "teams", "columns": ["id", "label"]},
            "users": {"name": "users", "columns": ["id", "name", "score", "avatar"]},
        })
    );
}

#[tokio::test]
async fn test_file_database_persists_between_runs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.db");
    let runner = Registry::with_defaults()
        .create("sqlite", json!({"database": path.to_str().unwrap()}))
        .unwrap();

    let err = run(&runner, "CREATE TABLE notes (body TEXT)").await.unwrap_err();
    assert_eq!(err, RunnerError::NoResultSet);

    let result = run(&runner, "SELECT body FROM notes").await.unwrap();
    assert_eq!(result.columns()[0].name, "body");
    assert!(result.is_empty());
}

#[tokio::test]
async fn test_connection_test() {
    let runner = seeded_runner();
    let outcome = runner
        .test_connection(&CancellationToken::new())
        .await
        .unwrap();
    assert!(outcome.is_ok());
}
