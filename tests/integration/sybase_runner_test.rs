//! Sybase runner behaviour over the mock driver.

use super::{sybase_runner, sybase_runner_with};
use pretty_assertions::assert_eq;
use query_runner::backends::SybaseBackend;
use query_runner::db::{dbapi, BackendError, MockDriver, MockResponse, NativeType, Value};
use query_runner::error::RunnerError;
use query_runner::runner::{Backend, LogicalType, Query, QueryRunner};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const SCHEMA_MARKER: &str = "FROM dbo.sysobjects so";

const CONNECT_FAILURE: &str = "State: 08001, Native error: 0, Message: [SAP][ASE ODBC Driver]\
                               Client unable to establish a connection";

#[tokio::test]
async fn test_columns_use_sybase_type_classes() {
    let driver = MockDriver::new().with_response(
        "SELECT title_id, price, pubdate, notes FROM titles",
        MockResponse::rows(
            vec![
                ("title_id", NativeType::Code(dbapi::STRING)),
                ("price", NativeType::Code(dbapi::DECIMAL)),
                ("pubdate", NativeType::Code(dbapi::DATETIME)),
                ("notes", NativeType::Code(42)),
            ],
            vec![vec![
                Value::from("BU1032"),
                Value::Float(19.99),
                Value::from("1991-06-12 00:00:00.000"),
                Value::Null,
            ]],
        ),
    );
    let runner = sybase_runner(&driver);

    let result = runner
        .run(
            &Query::new("SELECT title_id, price, pubdate, notes FROM titles"),
            &CancellationToken::new(),
        )
        .await
        .unwrap()
        .unwrap();

    let types: Vec<_> = result.columns().iter().map(|c| c.logical_type).collect();
    assert_eq!(
        types,
        vec![
            LogicalType::String,
            LogicalType::Float,
            LogicalType::Datetime,
            LogicalType::Unknown,
        ]
    );
    assert_eq!(result.row_count(), 1);
}

#[tokio::test]
async fn test_connection_string_and_session_setup() {
    let driver = MockDriver::new();
    let runner = sybase_runner_with(
        &driver,
        json!({
            "user": "reporting",
            "password": "pw",
            "server": "ase.internal",
            "port": 5000,
            "db": "pubs2",
            "startup_command": "set textsize 65536; set chained off",
        }),
    );

    runner
        .run(&Query::new("SELECT 1"), &CancellationToken::new())
        .await
        .unwrap()
        .unwrap();

    let stats = driver.stats();
    assert_eq!(
        stats.connection_strings,
        vec![
            "Driver=Adaptive Server Enterprise;Server=ase.internal;Port=5000;Database=pubs2;\
             UID=reporting;CharSet=utf8;PWD=pw;"
        ]
    );
    assert_eq!(stats.commands, vec!["set textsize 65536", "set chained off"]);
    assert_eq!(stats.executed, vec!["SELECT 1"]);
    assert_eq!(stats.closes, 1);
}

#[tokio::test]
async fn test_query_error_message_is_extracted() {
    let driver = MockDriver::new().with_response(
        "SELECT * FORM titles",
        MockResponse::Error(
            BackendError::new(
                "State: 42000, Native error: 102, Message: [SAP][ASE ODBC Driver]\
                 [Adaptive Server Enterprise]Incorrect syntax near 'FORM'.",
            )
            .with_detail("42000"),
        ),
    );
    let runner = sybase_runner(&driver);

    let err = runner
        .run(&Query::new("SELECT * FORM titles"), &CancellationToken::new())
        .await
        .unwrap()
        .unwrap_err();

    assert_eq!(err.to_string(), "Incorrect syntax near 'FORM'.");
    assert!(err.raw_cause().unwrap().contains("Native error: 102"));
    assert_eq!(driver.stats().closes, 1);
}

#[tokio::test]
async fn test_connect_failure() {
    let driver = MockDriver::new().failing_connect(BackendError::new(CONNECT_FAILURE));
    let runner = sybase_runner(&driver);

    let err = runner
        .run(&Query::new("SELECT 1"), &CancellationToken::new())
        .await
        .unwrap()
        .unwrap_err();

    assert_eq!(
        err,
        RunnerError::connection("Client unable to establish a connection")
            .with_raw_cause(Some(CONNECT_FAILURE.to_string()))
    );
    assert!(driver.stats().executed.is_empty());
}

#[tokio::test]
async fn test_ddl_yields_no_result_set() {
    let driver =
        MockDriver::new().with_response("CREATE TABLE t (a int)", MockResponse::no_result_set());
    let runner = sybase_runner(&driver);

    let err = runner
        .run(&Query::new("CREATE TABLE t (a int)"), &CancellationToken::new())
        .await
        .unwrap()
        .unwrap_err();

    assert_eq!(err, RunnerError::NoResultSet);
}

#[tokio::test]
async fn test_unencodable_query_for_charset() {
    let driver = MockDriver::new();
    let runner = sybase_runner_with(&driver, json!({"db": "pubs2", "charset": "ascii"}));

    let err = runner
        .run(&Query::new("SELECT 'naïve'"), &CancellationToken::new())
        .await
        .unwrap()
        .unwrap_err();

    assert!(matches!(err, RunnerError::Query { .. }));
    assert!(driver.stats().executed.is_empty());
}

#[tokio::test]
async fn test_latin1_session_talks_utf8_to_the_driver() {
    let driver = MockDriver::new().with_response(
        "SELECT 'café' AS word",
        MockResponse::rows(
            vec![("word", NativeType::Code(dbapi::STRING))],
            vec![vec![Value::from("café")]],
        ),
    );
    let runner = sybase_runner_with(&driver, json!({"db": "pubs2", "charset": "iso_1"}));

    let result = runner
        .run(&Query::new("SELECT 'café' AS word"), &CancellationToken::new())
        .await
        .unwrap()
        .unwrap();

    let stats = driver.stats();
    assert!(stats.connection_strings[0].ends_with("CharSet=utf8;"));
    assert_eq!(
        stats.executed[0].as_bytes(),
        b"SELECT 'caf\xc3\xa9' AS word".as_slice()
    );
    assert_eq!(result.rows()[0][0], Value::from("café"));
}

#[tokio::test]
async fn test_schema_groups_columns_by_table() {
    let schema_sql = SybaseBackend::with_driver(Arc::new(MockDriver::new()))
        .schema_query()
        .sql;
    assert!(schema_sql.contains(SCHEMA_MARKER));

    let driver = MockDriver::new().with_response(
        schema_sql,
        MockResponse::rows(
            vec![
                ("table_name", NativeType::Code(dbapi::STRING)),
                ("column_name", NativeType::Code(dbapi::STRING)),
            ],
            vec![
                vec![Value::from("T1"), Value::from("a")],
                vec![Value::from("T1"), Value::from("b")],
                vec![Value::from("T2"), Value::from("x")],
            ],
        ),
    );
    let runner = sybase_runner(&driver);

    let schema = runner
        .get_schema(&CancellationToken::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        schema.to_json(),
        json!({
            "T1": {"name": "T1", "columns": ["a", "b"]},
            "T2": {"name": "T2", "columns": ["x"]},
        })
    );
}

#[tokio::test]
async fn test_schema_query_failure() {
    let driver = MockDriver::new().with_default_response(MockResponse::error("permission denied"));
    let runner = sybase_runner(&driver);

    let err = runner
        .get_schema(&CancellationToken::new())
        .await
        .unwrap()
        .unwrap_err();

    assert_eq!(err, RunnerError::schema_unavailable("permission denied"));
}

#[tokio::test]
async fn test_connection_test_runs_noop_query() {
    let driver = MockDriver::new();
    let runner = sybase_runner(&driver);

    runner
        .test_connection(&CancellationToken::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(driver.stats().executed, vec!["SELECT 1"]);
}
