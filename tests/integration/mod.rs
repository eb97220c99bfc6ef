//! Integration tests for query runners.

pub mod cancellation_test;
pub mod sqlite_runner_test;
pub mod sybase_live_test;
pub mod sybase_runner_test;

use query_runner::backends::SybaseBackend;
use query_runner::db::MockDriver;
use query_runner::runner::{Backend, SqlRunner};
use serde_json::json;
use std::sync::Arc;

/// A Sybase runner backed by `driver`, with a complete option set.
pub fn sybase_runner(driver: &MockDriver) -> SqlRunner {
    sybase_runner_with(
        driver,
        json!({
            "user": "reporting",
            "password": "hunter2-secret",
            "server": "ase.internal",
            "db": "pubs2",
        }),
    )
}

pub fn sybase_runner_with(driver: &MockDriver, options: serde_json::Value) -> SqlRunner {
    let backend = SybaseBackend::with_driver(Arc::new(driver.clone()));
    let config = backend.configuration_schema().validate(options).unwrap();
    SqlRunner::new(Arc::new(backend), config)
}
