//! Connection and transaction traits

use crate::{QueryResult, Result, Row, Value};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;

/// A forward-only stream of rows produced by a live statement
pub type RowStream = Pin<Box<dyn Stream<Item = Result<Row>> + Send>>;

/// Turn a materialised result into a [`RowStream`]
pub fn rows_into_stream(result: QueryResult) -> RowStream {
    Box::pin(futures::stream::iter(result.rows.into_iter().map(Ok)))
}

/// Handle for cancelling a running statement from any thread.
///
/// The handle is safe to call from any thread and can be called multiple
/// times (subsequent calls are no-ops).
pub trait QueryCancelHandle: Send + Sync {
    /// Cancel the statement currently running on the associated connection.
    ///
    /// If no statement is running, this is a no-op.
    fn cancel(&self);
}

/// An open database session
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "postgresql")
    fn driver_name(&self) -> &str;

    /// Execute a statement and return the number of rows affected
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Execute a statement that returns rows
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Execute text that may yield several results, one per statement.
    ///
    /// Drivers that cannot tell statements apart return a single result.
    async fn query_batch(&self, sql: &str, params: &[Value]) -> Result<Vec<QueryResult>> {
        Ok(vec![self.query(sql, params).await?])
    }

    /// Execute a statement and stream its rows.
    ///
    /// The default implementation materialises the rows first.
    async fn query_stream(&self, sql: &str, params: &[Value]) -> Result<RowStream> {
        let result = self.query(sql, params).await?;
        Ok(rows_into_stream(result))
    }

    /// Begin a transaction
    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>>;

    /// Close the session
    async fn close(&self) -> Result<()>;

    /// Check if the session is closed
    fn is_closed(&self) -> bool;

    /// Get a handle that can be used to cancel running statements.
    ///
    /// Returns `None` if the driver does not support cancellation.
    fn cancel_handle(&self) -> Option<Arc<dyn QueryCancelHandle>> {
        None
    }
}

/// A database transaction
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Commit the transaction
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> Result<()>;

    /// Execute a statement within the transaction
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Execute a query within the transaction
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    async fn query_batch(&self, sql: &str, params: &[Value]) -> Result<Vec<QueryResult>> {
        Ok(vec![self.query(sql, params).await?])
    }

    async fn query_stream(&self, sql: &str, params: &[Value]) -> Result<RowStream> {
        let result = self.query(sql, params).await?;
        Ok(rows_into_stream(result))
    }
}
