//! qrun - run queries against configured data sources.

use anyhow::{Context, Result};
use query_runner::cli::{Cli, Command};
use query_runner::config::SourcesConfig;
use query_runner::error::Cancelled;
use query_runner::logging::{init_file_logging, init_stderr_logging};
use query_runner::runner::{Query, QueryRunner, Registry, SqlRunner};
use serde_json::json;
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const EXIT_CANCELLED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();

    match &cli.log_file {
        Some(path) => init_file_logging(path),
        None => init_stderr_logging(),
    }

    match run(cli).await {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(Cancelled)) => {
            eprintln!("Cancelled");
            ExitCode::from(EXIT_CANCELLED)
        }
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<std::result::Result<(), Cancelled>> {
    let registry = Registry::with_defaults();

    if cli.command == Command::Runners {
        let runners: Vec<_> = registry
            .backends()
            .map(|backend| {
                json!({
                    "type": backend.type_identifier(),
                    "name": backend.name(),
                    "configuration_schema": backend.configuration_schema().to_json(),
                })
            })
            .collect();
        print_json(&json!(runners))?;
        return Ok(Ok(()));
    }

    let cancel = cancel_on_interrupt(cli.timeout());

    match &cli.command {
        Command::Runners => Ok(Ok(())),
        Command::Run { source, user, .. } => {
            let runner = load_runner(&cli, &registry, source)?;
            let text = cli
                .command
                .query_text()
                .context("Failed to read query file")?
                .unwrap_or_default();
            let mut query = Query::new(text);
            if let Some(user) = user {
                query = query.with_user(user.clone());
            }

            match runner.run(&query, &cancel).await {
                Ok(result) => {
                    print_json(&result?.to_json())?;
                    Ok(Ok(()))
                }
                Err(cancelled) => Ok(Err(cancelled)),
            }
        }
        Command::Schema { source } => {
            let runner = load_runner(&cli, &registry, source)?;
            match runner.get_schema(&cancel).await {
                Ok(schema) => {
                    print_json(&schema?.to_json())?;
                    Ok(Ok(()))
                }
                Err(cancelled) => Ok(Err(cancelled)),
            }
        }
        Command::Test { source } => {
            let runner = load_runner(&cli, &registry, source)?;
            match runner.test_connection(&cancel).await {
                Ok(outcome) => {
                    outcome?;
                    println!("{source}: OK");
                    Ok(Ok(()))
                }
                Err(cancelled) => Ok(Err(cancelled)),
            }
        }
    }
}

fn load_runner(cli: &Cli, registry: &Registry, source: &str) -> Result<SqlRunner> {
    let path = cli.config_path();
    info!("Loading data sources from: {}", path.display());

    let sources = SourcesConfig::load_from_file(&path)?;
    let runner = sources.get_source(source)?.create_runner(registry)?;
    info!(
        "Data source '{}' uses {}: {}",
        source,
        runner.name(),
        runner.configuration().redacted()
    );
    Ok(runner)
}

/// Cancels the returned token on Ctrl-C or when `timeout` elapses.
fn cancel_on_interrupt(timeout: Option<Duration>) -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        let interrupt = async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        };
        let deadline = async {
            match timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = interrupt => warn!("Interrupted, cancelling"),
            _ = deadline => warn!("Timed out, cancelling"),
        }
        trigger.cancel();
    });

    token
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to render JSON")?;
    println!("{text}");
    Ok(())
}
