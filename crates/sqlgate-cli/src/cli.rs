//! sqlgate CLI
//!
//! Runs statements, cursor procedures and login checks against the
//! connection strings of a settings file.

mod args;
mod output;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use args::{Cli, Commands};
use clap::Parser;
use sqlgate::{Authenticator, CommandKind, Gateway, GatewaySettings};
use sqlgate_driver_postgres::PostgresDriver;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = load_settings(&cli)?;
    tracing::debug!(
        connections = settings.connection_strings.len(),
        default = %settings.default_connection,
        "settings loaded"
    );
    let gateway = Gateway::new(Arc::new(PostgresDriver::new())).with_settings(settings);

    match cli.command {
        Commands::Query { sql, json } => {
            let connection_string = gateway.connect_string(&cli.connection)?;
            let data = gateway
                .execute_dataset(&connection_string, CommandKind::Text, &sql, &[])
                .await
                .into_result()
                .context("query failed")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&data.to_json())?);
            } else {
                print!("{}", output::render_dataset(&data));
            }
        }

        Commands::Scalar { sql } => {
            let connection_string = gateway.connect_string(&cli.connection)?;
            let value = gateway
                .execute_scalar(&connection_string, CommandKind::Text, &sql, &[])
                .await
                .into_result()
                .context("query failed")?;
            match value {
                Some(value) => println!("{value}"),
                None => println!("NULL"),
            }
        }

        Commands::Call { procedure, payload, cursors } => {
            let connection_string = gateway.connect_string(&cli.connection)?;
            let cursor_names: Vec<&str> = cursors.iter().map(String::as_str).collect();
            let outcome = gateway
                .call_procedure(&connection_string, &payload, &procedure, &cursor_names)
                .await;
            let cursors = outcome
                .into_result()
                .with_context(|| format!("call to {procedure} failed"))?;
            println!("{}", serde_json::to_string_pretty(&cursors.to_json())?);
        }

        Commands::Login { username, password } => {
            let session = Authenticator::new(gateway)
                .with_connection(cli.connection)
                .authenticate(&username, &password)
                .await;
            println!("{}", serde_json::to_string_pretty(&session)?);
            if !session.is_authenticated() {
                anyhow::bail!("login rejected for {username}");
            }
        }
    }

    Ok(())
}

fn load_settings(cli: &Cli) -> anyhow::Result<GatewaySettings> {
    match &cli.settings {
        Some(path) => GatewaySettings::load(path)
            .with_context(|| format!("failed to load settings from {}", path.display())),
        None => GatewaySettings::load_default().context("failed to load default settings"),
    }
}

/// Initialize the logging system.
fn init_logging(verbose: bool) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = if verbose {
        EnvFilter::new("sqlgate=debug,sqlgate_driver_postgres=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
