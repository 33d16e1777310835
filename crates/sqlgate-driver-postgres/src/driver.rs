//! PostgreSQL driver implementation

use async_trait::async_trait;
use sqlgate_core::{Connection, DatabaseDriver, Result, SqlgateError};
use std::sync::Arc;
use std::time::Duration;
use tokio_postgres::NoTls;
use tokio_postgres::config::Host;

use crate::tls::{PostgresTlsConnector, TlsMode};
use crate::{PostgresConnection, parse_connection_string};

/// PostgreSQL database driver
pub struct PostgresDriver;

impl PostgresDriver {
    pub fn new() -> Self {
        tracing::debug!("PostgreSQL driver initialized");
        Self
    }
}

impl Default for PostgresDriver {
    fn default() -> Self {
        Self::new()
    }
}

fn describe_hosts(hosts: &[Host]) -> String {
    hosts
        .iter()
        .map(|host| match host {
            Host::Tcp(name) => name.clone(),
            #[allow(unreachable_patterns)]
            other => format!("{other:?}"),
        })
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl DatabaseDriver for PostgresDriver {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn display_name(&self) -> &'static str {
        "PostgreSQL"
    }

    #[tracing::instrument(skip_all)]
    async fn connect(&self, connection_string: &str) -> Result<Arc<dyn Connection>> {
        let options = parse_connection_string(connection_string)?;
        let host = describe_hosts(options.config.get_hosts());
        let database = options.config.get_dbname().unwrap_or_default().to_string();

        tracing::debug!(
            host = %host,
            database = %database,
            ssl_mode = ?options.tls.mode,
            "connecting to PostgreSQL"
        );

        let connection = if options.tls.mode == TlsMode::Disable {
            let (client, connection) = options.config.connect(NoTls).await.map_err(|e| {
                tracing::error!(error = %e, "failed to connect to PostgreSQL");
                SqlgateError::Connection(format!("Failed to connect to PostgreSQL: {e}"))
            })?;

            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::error!(error = %e, "PostgreSQL connection error");
                }
            });

            PostgresConnection::new(client, None)
        } else {
            let tls = PostgresTlsConnector::build(&options.tls)?;
            let (client, connection) = options.config.connect(tls.clone()).await.map_err(|e| {
                tracing::error!(error = %e, "failed to connect to PostgreSQL");
                SqlgateError::Connection(format!("Failed to connect to PostgreSQL: {e}"))
            })?;

            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::error!(error = %e, "PostgreSQL connection error");
                }
            });

            PostgresConnection::new(client, Some(tls))
        };

        tracing::info!(host = %host, database = %database, "PostgreSQL connection established");
        Ok(Arc::new(connection))
    }

    fn command_timeout(&self, connection_string: &str) -> Option<Duration> {
        parse_connection_string(connection_string)
            .ok()
            .and_then(|options| options.command_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_timeout_from_ado_string() {
        let driver = PostgresDriver::new();
        assert_eq!(
            driver.command_timeout("Server=db;CommandTimeout=12"),
            Some(Duration::from_secs(12))
        );
        assert_eq!(driver.command_timeout("host=db"), None);
        assert_eq!(driver.command_timeout("Port=nope;Server=db"), None);
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_string() {
        let driver = PostgresDriver::new();
        let result = driver.connect("Server=db;SSL Mode=whenever").await;
        assert!(matches!(result, Err(SqlgateError::Configuration(_))));
    }
}
