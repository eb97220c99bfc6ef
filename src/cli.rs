//! Command-line argument parsing for `qrun`.

use crate::config::SourcesConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Run queries against configured data sources.
#[derive(Parser, Debug)]
#[command(name = "qrun")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Data-source file path
    #[arg(long, value_name = "PATH", env = "QRUN_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Cancel the operation after this many seconds
    #[arg(long, value_name = "SECS", global = true)]
    pub timeout: Option<u64>,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// List enabled runners and their configuration schemas
    Runners,

    /// Run a query and print the result as JSON
    Run {
        /// Data source name
        source: String,

        /// Query text
        #[arg(value_name = "SQL", required_unless_present = "file", conflicts_with = "file")]
        sql: Option<String>,

        /// Read the query text from a file
        #[arg(short, long, value_name = "PATH")]
        file: Option<PathBuf>,

        /// User recorded in logs for this run
        #[arg(short, long, value_name = "USER")]
        user: Option<String>,
    },

    /// Print the tables and columns of a data source as JSON
    Schema {
        /// Data source name
        source: String,
    },

    /// Check that a data source is reachable
    Test {
        /// Data source name
        source: String,
    },
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the data-source file path (from CLI or default).
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(SourcesConfig::default_path)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }
}

impl Command {
    /// Returns the query text of a `run` command, reading `--file` if given.
    pub fn query_text(&self) -> std::io::Result<Option<String>> {
        match self {
            Command::Run { sql: Some(sql), .. } => Ok(Some(sql.clone())),
            Command::Run {
                file: Some(path), ..
            } => std::fs::read_to_string(path).map(Some),
            _ => Ok(None),
        }
    }
}
