//! Connection and transaction handles

use parking_lot::Mutex;
use sqlgate_core::{Connection, DatabaseDriver, Result, SqlgateError, Transaction};
use std::fmt;
use std::sync::Arc;

use crate::guard::CallGuard;

/// Who closes a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionOwnership {
    /// Opened by the gateway for one call; the gateway closes it
    Internal,
    /// Supplied by the caller; the gateway never closes it
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Open,
}

/// A lazily opened database connection.
///
/// The session is created by the driver on [`open`](Self::open) and released
/// on [`close`](Self::close) or drop. A handle must not be used by two
/// operations at the same time.
pub struct DbConnection {
    driver: Arc<dyn DatabaseDriver>,
    connection_string: String,
    session: Mutex<Option<Arc<dyn Connection>>>,
}

impl fmt::Debug for DbConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The connection string carries credentials
        f.debug_struct("DbConnection")
            .field("driver", &self.driver.name())
            .field("state", &self.state())
            .finish()
    }
}

impl DbConnection {
    pub fn new(driver: Arc<dyn DatabaseDriver>, connection_string: impl Into<String>) -> Self {
        Self {
            driver,
            connection_string: connection_string.into(),
            session: Mutex::new(None),
        }
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    pub fn state(&self) -> ConnectionState {
        match self.session.lock().as_ref() {
            Some(session) if !session.is_closed() => ConnectionState::Open,
            _ => ConnectionState::Closed,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Open the session unless it is already open.
    ///
    /// A session the driver reports as closed is replaced.
    pub async fn open(&self, guard: &CallGuard) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }

        tracing::debug!(driver = %self.driver.name(), "opening connection");
        let session = guard
            .run("open connection", None, self.driver.connect(&self.connection_string))
            .await
            .map_err(|e| match e {
                SqlgateError::Connection(_)
                | SqlgateError::Configuration(_)
                | SqlgateError::Timeout(_)
                | SqlgateError::Cancelled => e,
                other => SqlgateError::Connection(other.to_string()),
            })?;

        *self.session.lock() = Some(session);
        Ok(())
    }

    /// The open session
    pub fn session(&self) -> Result<Arc<dyn Connection>> {
        self.session
            .lock()
            .as_ref()
            .filter(|session| !session.is_closed())
            .cloned()
            .ok_or_else(|| SqlgateError::Connection("connection is not open".into()))
    }

    /// Close the session. Closing a closed connection is a no-op.
    pub async fn close(&self) -> Result<()> {
        let session = self.session.lock().take();
        match session {
            Some(session) => {
                tracing::debug!(driver = %self.driver.name(), "closing connection");
                session.close().await
            }
            None => Ok(()),
        }
    }

    /// Begin a transaction on the open session
    pub async fn begin_transaction(&self, guard: &CallGuard) -> Result<DbTransaction<'_>> {
        let session = self.session()?;
        tracing::debug!("beginning transaction");
        let inner = guard
            .run("begin transaction", session.cancel_handle(), session.begin_transaction())
            .await?;
        Ok(DbTransaction {
            connection: self,
            inner: Some(inner),
        })
    }
}

impl Drop for DbConnection {
    fn drop(&mut self) {
        if self.session.get_mut().take().is_some() {
            tracing::debug!("connection dropped while open, releasing session");
        }
    }
}

/// A transaction on a [`DbConnection`].
///
/// Dropping it without [`commit`](Self::commit) or
/// [`rollback`](Self::rollback) leaves the work uncommitted; the server
/// discards it when the session ends.
pub struct DbTransaction<'c> {
    connection: &'c DbConnection,
    inner: Option<Box<dyn Transaction>>,
}

impl fmt::Debug for DbTransaction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbTransaction")
            .field("active", &self.inner.is_some())
            .finish()
    }
}

impl<'c> DbTransaction<'c> {
    pub fn connection(&self) -> &'c DbConnection {
        self.connection
    }

    pub(crate) fn inner(&self) -> Result<&dyn Transaction> {
        self.inner
            .as_deref()
            .ok_or_else(|| SqlgateError::Statement("transaction is already finished".into()))
    }

    pub async fn commit(mut self, guard: &CallGuard) -> Result<()> {
        let inner = self.take_inner()?;
        tracing::debug!("committing transaction");
        let cancel = self.connection.session().ok().and_then(|s| s.cancel_handle());
        guard.run("commit", cancel, inner.commit()).await
    }

    pub async fn rollback(mut self, guard: &CallGuard) -> Result<()> {
        let inner = self.take_inner()?;
        tracing::debug!("rolling back transaction");
        let cancel = self.connection.session().ok().and_then(|s| s.cancel_handle());
        guard.run("rollback", cancel, inner.rollback()).await
    }

    fn take_inner(&mut self) -> Result<Box<dyn Transaction>> {
        self.inner
            .take()
            .ok_or_else(|| SqlgateError::Statement("transaction is already finished".into()))
    }
}

impl Drop for DbTransaction<'_> {
    fn drop(&mut self) {
        if self.inner.is_some() {
            tracing::warn!("transaction dropped without commit or rollback");
        }
    }
}
