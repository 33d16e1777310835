//! Docker container management for integration tests.

use std::time::Duration;

use anyhow::{Context, Result};
use sqlgate_core::DatabaseDriver;
use sqlgate_driver_postgres::PostgresDriver;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;

/// A running PostgreSQL container and the connection string that reaches it.
///
/// The container is removed when this value is dropped.
pub struct PostgresContainer {
    #[allow(dead_code)]
    inner: ContainerAsync<Postgres>,
    connection_string: String,
}

impl PostgresContainer {
    /// Start a container and wait until it accepts connections
    pub async fn start() -> Result<Self> {
        let inner = Postgres::default()
            .start()
            .await
            .context("failed to start postgres container")?;
        let host = inner.get_host().await?.to_string();
        let port = inner.get_host_port_ipv4(5432).await?;

        let connection_string = format!(
            "Server={host};Port={port};Database=postgres;User Id=postgres;Password=postgres;\
             SSL Mode=Disable;CommandTimeout=30;Pooling=true"
        );
        wait_until_ready(&connection_string).await?;

        tracing::info!(%host, port, "postgres container ready");
        Ok(Self {
            inner,
            connection_string,
        })
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }
}

async fn wait_until_ready(connection_string: &str) -> Result<()> {
    let driver = PostgresDriver::new();
    let max_retries = 10;

    for attempt in 1..=max_retries {
        match driver.connect(connection_string).await {
            Ok(connection) => {
                connection.close().await?;
                return Ok(());
            }
            Err(e) if attempt < max_retries => {
                let delay = Duration::from_millis(250 * 2u64.pow(attempt.min(4)));
                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "postgres not ready: {}",
                    e
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("postgres not ready after {max_retries} attempts"));
            }
        }
    }
    Ok(())
}
