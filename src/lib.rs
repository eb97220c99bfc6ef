//! query-runner - pluggable query runners with a Sybase ASE backend.
//!
//! This library exposes the core modules for the `qrun` binary and for
//! integration tests.

pub mod backends;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod runner;
