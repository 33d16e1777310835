//! Forward-only row reader

use futures::StreamExt;
use sqlgate_core::{QueryCancelHandle, Result, Row, RowStream};
use std::fmt;
use std::sync::Arc;

use crate::connection::{ConnectionOwnership, DbConnection};
use crate::guard::CallGuard;

/// A live row stream.
///
/// A reader over an internally owned connection holds that connection and
/// closes it when the stream is exhausted, when [`close`](Self::close) is
/// called, or when the reader is dropped. A reader over a caller's
/// connection never touches the connection.
pub struct DataReader {
    stream: Option<RowStream>,
    connection: Option<DbConnection>,
    ownership: ConnectionOwnership,
    guard: CallGuard,
    cancel: Option<Arc<dyn QueryCancelHandle>>,
    rows_read: u64,
}

impl fmt::Debug for DataReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataReader")
            .field("ownership", &self.ownership)
            .field("open", &self.stream.is_some())
            .field("rows_read", &self.rows_read)
            .finish()
    }
}

impl DataReader {
    /// Reader that releases `connection` when it finishes
    pub(crate) fn owning(
        stream: RowStream,
        connection: DbConnection,
        guard: CallGuard,
        cancel: Option<Arc<dyn QueryCancelHandle>>,
    ) -> Self {
        Self {
            stream: Some(stream),
            connection: Some(connection),
            ownership: ConnectionOwnership::Internal,
            guard,
            cancel,
            rows_read: 0,
        }
    }

    /// Reader over a connection the caller keeps
    pub(crate) fn borrowing(
        stream: RowStream,
        guard: CallGuard,
        cancel: Option<Arc<dyn QueryCancelHandle>>,
    ) -> Self {
        Self {
            stream: Some(stream),
            connection: None,
            ownership: ConnectionOwnership::External,
            guard,
            cancel,
            rows_read: 0,
        }
    }

    pub fn ownership(&self) -> ConnectionOwnership {
        self.ownership
    }

    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    /// The next row, or `None` once the stream is exhausted.
    ///
    /// Exhaustion and read errors close the reader.
    pub async fn next(&mut self) -> Result<Option<Row>> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };

        let item = self
            .guard
            .run("read row", self.cancel.clone(), async { Ok(stream.next().await) })
            .await;

        match item {
            Ok(Some(Ok(row))) => {
                self.rows_read += 1;
                Ok(Some(row))
            }
            Ok(None) => {
                tracing::debug!(rows_read = self.rows_read, "reader exhausted");
                self.close().await?;
                Ok(None)
            }
            Ok(Some(Err(e))) | Err(e) => {
                if let Err(close_error) = self.close().await {
                    tracing::warn!(error = %close_error, "failed to close reader after error");
                }
                Err(e)
            }
        }
    }

    /// Read every remaining row
    pub async fn collect(mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Stop reading; an owned connection is closed. Closing twice is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        self.stream = None;
        match self.connection.take() {
            Some(connection) => connection.close().await,
            None => Ok(()),
        }
    }
}
