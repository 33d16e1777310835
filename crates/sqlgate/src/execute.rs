//! Scoped execution primitives
//!
//! Each shape comes in three forms. The `connection_string` form opens a
//! connection for the call and always closes it before returning (the row
//! reader form hands it to the reader instead). The `_on` and `_in` forms run
//! on the caller's connection or transaction and never close it.

use sqlgate_core::{DataSet, Outcome, Parameter, Result, Value};

use crate::command::{CommandKind, prepare_command};
use crate::connection::{DbConnection, DbTransaction};
use crate::gateway::Gateway;
use crate::reader::DataReader;

/// Close an internally owned connection; a failing close is logged, not returned
async fn release(connection: &DbConnection) {
    if let Err(e) = connection.close().await {
        tracing::warn!(error = %e, "failed to close connection");
    }
}

impl Gateway {
    /// Execute a statement and return the number of rows affected
    pub async fn execute_non_query(
        &self,
        connection_string: &str,
        kind: CommandKind,
        text: &str,
        descriptors: &[Parameter],
    ) -> Result<u64> {
        let connection = self.connection(connection_string);
        let result = self.execute_non_query_on(&connection, kind, text, descriptors).await;
        release(&connection).await;
        result
    }

    pub async fn execute_non_query_on(
        &self,
        connection: &DbConnection,
        kind: CommandKind,
        text: &str,
        descriptors: &[Parameter],
    ) -> Result<u64> {
        let guard = self.guard_for(connection.connection_string());
        let command = prepare_command(connection, None, kind, text, descriptors, &guard).await?;
        command.execute_non_query(&guard).await
    }

    pub async fn execute_non_query_in(
        &self,
        transaction: &DbTransaction<'_>,
        kind: CommandKind,
        text: &str,
        descriptors: &[Parameter],
    ) -> Result<u64> {
        let connection = transaction.connection();
        let guard = self.guard_for(connection.connection_string());
        let command =
            prepare_command(connection, Some(transaction), kind, text, descriptors, &guard).await?;
        command.execute_non_query(&guard).await
    }

    /// Execute a statement and materialise every result it yields.
    ///
    /// On failure the data set is empty and the error is kept in the outcome.
    pub async fn execute_dataset(
        &self,
        connection_string: &str,
        kind: CommandKind,
        text: &str,
        descriptors: &[Parameter],
    ) -> Outcome<DataSet> {
        let connection = self.connection(connection_string);
        let outcome = self.execute_dataset_on(&connection, kind, text, descriptors).await;
        release(&connection).await;
        outcome
    }

    pub async fn execute_dataset_on(
        &self,
        connection: &DbConnection,
        kind: CommandKind,
        text: &str,
        descriptors: &[Parameter],
    ) -> Outcome<DataSet> {
        let guard = self.guard_for(connection.connection_string());
        let result = async {
            let command = prepare_command(connection, None, kind, text, descriptors, &guard).await?;
            command.fill(&guard).await
        }
        .await;
        Outcome::from_result(result, DataSet::default)
    }

    pub async fn execute_dataset_in(
        &self,
        transaction: &DbTransaction<'_>,
        kind: CommandKind,
        text: &str,
        descriptors: &[Parameter],
    ) -> Outcome<DataSet> {
        let connection = transaction.connection();
        let guard = self.guard_for(connection.connection_string());
        let result = async {
            let command =
                prepare_command(connection, Some(transaction), kind, text, descriptors, &guard)
                    .await?;
            command.fill(&guard).await
        }
        .await;
        Outcome::from_result(result, DataSet::default)
    }

    /// Execute a statement and stream its rows.
    ///
    /// The reader owns the connection opened for it. A failure before the
    /// first row closes that connection and is returned.
    pub async fn execute_reader(
        &self,
        connection_string: &str,
        kind: CommandKind,
        text: &str,
        descriptors: &[Parameter],
    ) -> Result<DataReader> {
        let connection = self.connection(connection_string);
        let guard = self.guard_for(connection_string);

        let stream = async {
            let command =
                prepare_command(&connection, None, kind, text, descriptors, &guard).await?;
            command.open_stream(&guard).await
        }
        .await;

        match stream {
            Ok(stream) => {
                let cancel = connection.session().ok().and_then(|s| s.cancel_handle());
                Ok(DataReader::owning(stream, connection, guard, cancel))
            }
            Err(e) => {
                release(&connection).await;
                Err(e)
            }
        }
    }

    pub async fn execute_reader_on(
        &self,
        connection: &DbConnection,
        kind: CommandKind,
        text: &str,
        descriptors: &[Parameter],
    ) -> Result<DataReader> {
        let guard = self.guard_for(connection.connection_string());
        let command = prepare_command(connection, None, kind, text, descriptors, &guard).await?;
        let stream = command.open_stream(&guard).await?;
        let cancel = connection.session().ok().and_then(|s| s.cancel_handle());
        Ok(DataReader::borrowing(stream, guard, cancel))
    }

    pub async fn execute_reader_in(
        &self,
        transaction: &DbTransaction<'_>,
        kind: CommandKind,
        text: &str,
        descriptors: &[Parameter],
    ) -> Result<DataReader> {
        let connection = transaction.connection();
        let guard = self.guard_for(connection.connection_string());
        let command =
            prepare_command(connection, Some(transaction), kind, text, descriptors, &guard).await?;
        let stream = command.open_stream(&guard).await?;
        let cancel = connection.session().ok().and_then(|s| s.cancel_handle());
        Ok(DataReader::borrowing(stream, guard, cancel))
    }

    /// First column of the first row, `None` when there are no rows.
    ///
    /// On failure the value is `None` and the error is kept in the outcome.
    pub async fn execute_scalar(
        &self,
        connection_string: &str,
        kind: CommandKind,
        text: &str,
        descriptors: &[Parameter],
    ) -> Outcome<Option<Value>> {
        let connection = self.connection(connection_string);
        let outcome = self.execute_scalar_on(&connection, kind, text, descriptors).await;
        release(&connection).await;
        outcome
    }

    pub async fn execute_scalar_on(
        &self,
        connection: &DbConnection,
        kind: CommandKind,
        text: &str,
        descriptors: &[Parameter],
    ) -> Outcome<Option<Value>> {
        let guard = self.guard_for(connection.connection_string());
        let result = async {
            let command = prepare_command(connection, None, kind, text, descriptors, &guard).await?;
            command.scalar(&guard).await
        }
        .await;
        Outcome::from_result(result, || None)
    }

    pub async fn execute_scalar_in(
        &self,
        transaction: &DbTransaction<'_>,
        kind: CommandKind,
        text: &str,
        descriptors: &[Parameter],
    ) -> Outcome<Option<Value>> {
        let connection = transaction.connection();
        let guard = self.guard_for(connection.connection_string());
        let result = async {
            let command =
                prepare_command(connection, Some(transaction), kind, text, descriptors, &guard)
                    .await?;
            command.scalar(&guard).await
        }
        .await;
        Outcome::from_result(result, || None)
    }
}

#[cfg(test)]
mod tests;
