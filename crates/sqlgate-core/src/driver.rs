//! Database driver trait definition

use crate::{Connection, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Opens sessions from connection strings.
///
/// Drivers are expected to be cheap to share; the gateway keeps one behind an
/// `Arc` and asks it for a fresh session per logical operation.
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// Get the driver identifier (e.g., "postgres")
    fn name(&self) -> &'static str;

    /// Get the display name (e.g., "PostgreSQL")
    fn display_name(&self) -> &'static str;

    /// Open a new session
    async fn connect(&self, connection_string: &str) -> Result<Arc<dyn Connection>>;

    /// Open a session, run a trivial query and close it again
    async fn test_connection(&self, connection_string: &str) -> Result<()> {
        let conn = self.connect(connection_string).await?;
        let probe = conn.query("SELECT 1", &[]).await;
        conn.close().await?;
        probe.map(|_| ())
    }

    /// Statement deadline encoded in the connection string, if any
    fn command_timeout(&self, _connection_string: &str) -> Option<Duration> {
        None
    }
}
