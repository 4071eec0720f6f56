//! DB Schema Bridge - Main entry point.
//!
//! Connects to one database, then either prints its normalized schema or runs
//! a single guarded statement. Results go to stdout as JSON; logs go to stderr.

use std::process::ExitCode;

use clap::Parser;
use db_schema_bridge::{DatabaseSession, DbError, DbResult};
use db_schema_bridge::config::{Command, Config};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

async fn run(config: &Config, session: &mut DatabaseSession) -> DbResult<String> {
    let output = match &config.command {
        Command::Schema => to_json(&session.get_schema().await?)?,
        Command::Query { statement, .. } => {
            let params = config.command.query_params();
            to_json(&session.execute_query(statement, &params).await?)?
        }
    };
    Ok(output)
}

fn to_json<T: serde::Serialize>(value: &T) -> DbResult<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| DbError::internal(format!("Failed to serialize output: {}", e)))
}

/// Log a failure together with its hint, if the error carries one.
fn report(err: &DbError) {
    match err.suggestion() {
        Some(hint) => error!(error = %err, suggestion = hint, "Command failed"),
        None => error!(error = %err, "Command failed"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse configuration from command line and environment
    let config = Config::parse();

    // Initialize logging
    init_tracing(&config);

    let adapter_config = match config.to_adapter_config() {
        Ok(adapter_config) => adapter_config,
        Err(e) => {
            report(&e);
            return ExitCode::FAILURE;
        }
    };
    info!(
        database_type = %adapter_config.database_type(),
        allow_write = config.danger_allow_write,
        "Starting DB Schema Bridge v{}",
        env!("CARGO_PKG_VERSION")
    );

    let mut session = DatabaseSession::new(adapter_config)
        .with_allow_write(config.danger_allow_write)
        .with_enhancer(config.enhancer());

    if let Err(e) = session.connect().await {
        report(&e);
        return ExitCode::FAILURE;
    }
    let result = run(&config, &mut session).await;
    session.disconnect().await;

    match result {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}
