//! PostgreSQL connection implementation

use async_trait::async_trait;
use futures::StreamExt;
use postgres_native_tls::MakeTlsConnector;
use sqlgate_core::{
    Connection, QueryCancelHandle, QueryResult, Result, RowStream, SqlgateError, Transaction, Value,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::Mutex;
use tokio_postgres::error::SqlState;
use tokio_postgres::{CancelToken, Client, NoTls, SimpleQueryMessage, Statement};

use crate::value::{PgValue, columns_meta, convert_row};

type SharedClient = Arc<Mutex<Option<Client>>>;

/// Cancel handle for PostgreSQL statements.
///
/// Wraps the tokio-postgres `CancelToken`; the cancel request is sent from a
/// spawned task so `cancel` can be called from synchronous code.
pub struct PostgresCancelHandle {
    cancel_token: CancelToken,
    tls: Option<MakeTlsConnector>,
}

impl QueryCancelHandle for PostgresCancelHandle {
    fn cancel(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no tokio runtime available, PostgreSQL cancel request not sent");
            return;
        };

        tracing::debug!("sending cancel request to PostgreSQL server");
        let cancel_token = self.cancel_token.clone();
        let tls = self.tls.clone();
        runtime.spawn(async move {
            let sent = match tls {
                Some(tls) => cancel_token.cancel_query(tls).await,
                None => cancel_token.cancel_query(NoTls).await,
            };
            if let Err(e) = sent {
                tracing::warn!(error = %e, "failed to cancel PostgreSQL statement");
            }
        });
    }
}

pub(crate) fn format_postgres_error(error: &tokio_postgres::Error) -> String {
    let Some(db_error) = error.as_db_error() else {
        return error.to_string();
    };

    let code = db_error.code();
    let mut message = db_error.message().to_string();

    if let Some(detail) = db_error.detail().filter(|detail| !detail.trim().is_empty()) {
        message.push_str(&format!(" (detail: {detail})"));
    }

    if let Some(hint) = db_error.hint().filter(|hint| !hint.trim().is_empty()) {
        message.push_str(&format!(" (hint: {hint})"));
    }

    if let Some(routine) = db_error.where_().filter(|w| !w.trim().is_empty()) {
        message.push_str(&format!(" (where: {routine})"));
    }

    match code.code() {
        "23505" => format!("duplicate value violates unique constraint: {message}"),
        "23503" => format!("foreign key violation: {message}"),
        "23502" => format!("null value violates not-null constraint: {message}"),
        "22P02" => format!("invalid input syntax: {message}"),
        "34000" => format!("cursor does not exist: {message}"),
        "42883" => format!("function or procedure does not exist: {message}"),
        _ => format!("{message} (SQLSTATE {})", code.code()),
    }
}

/// Map a driver error, keeping lost sessions apart from failed statements
fn statement_error(context: &str, error: &tokio_postgres::Error) -> SqlgateError {
    let message = format_postgres_error(error);
    if error.is_closed() {
        SqlgateError::Connection(format!("{context}: {message}"))
    } else {
        SqlgateError::Statement(format!("{context}: {message}"))
    }
}

fn closed_error() -> SqlgateError {
    SqlgateError::Connection("PostgreSQL connection is closed".into())
}

/// `simple_query` is the only way to run several statements in one round trip
fn is_multiple_commands_error(error: &tokio_postgres::Error) -> bool {
    error.as_db_error().is_some_and(|db_error| {
        *db_error.code() == SqlState::SYNTAX_ERROR
            && db_error.message().contains("multiple commands")
    })
}

fn sql_preview(sql: &str) -> String {
    sql.chars().take(100).collect()
}

/// Prepare `sql` and convert `params` against the server's parameter types
async fn prepare(
    client: &Client,
    sql: &str,
    params: &[Value],
) -> Result<(Statement, Vec<PgValue>)> {
    let statement = client
        .prepare(sql)
        .await
        .map_err(|e| statement_error("Failed to prepare statement", &e))?;
    let pg_params = bind(&statement, params)?;
    Ok((statement, pg_params))
}

fn bind(statement: &Statement, params: &[Value]) -> Result<Vec<PgValue>> {
    let param_types = statement.params();
    if params.len() != param_types.len() {
        return Err(SqlgateError::Statement(format!(
            "statement expects {} parameters but {} were bound",
            param_types.len(),
            params.len()
        )));
    }

    params
        .iter()
        .zip(param_types)
        .map(|(value, target)| PgValue::for_type(value, Some(target)))
        .collect()
}

fn as_sql_refs(params: &[PgValue]) -> Vec<&(dyn tokio_postgres::types::ToSql + Sync)> {
    params
        .iter()
        .map(|p| p as &(dyn tokio_postgres::types::ToSql + Sync))
        .collect()
}

async fn execute_on(client: &Client, sql: &str, params: &[Value]) -> Result<u64> {
    let (statement, pg_params) = prepare(client, sql, params).await?;
    let rows_affected = client
        .execute(&statement, &as_sql_refs(&pg_params))
        .await
        .map_err(|e| statement_error("Failed to execute statement", &e))?;
    tracing::debug!(affected_rows = rows_affected, "statement executed");
    Ok(rows_affected)
}

async fn query_on(client: &Client, sql: &str, params: &[Value]) -> Result<QueryResult> {
    let start_time = Instant::now();
    let (statement, pg_params) = prepare(client, sql, params).await?;
    query_prepared(client, &statement, &pg_params, start_time).await
}

async fn query_prepared(
    client: &Client,
    statement: &Statement,
    pg_params: &[PgValue],
    start_time: Instant,
) -> Result<QueryResult> {
    let pg_rows = client
        .query(statement, &as_sql_refs(pg_params))
        .await
        .map_err(|e| statement_error("Failed to execute query", &e))?;

    // Columns come from the statement so empty results still describe their shape
    let columns = columns_meta(statement.columns());
    let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
    let rows = pg_rows
        .iter()
        .map(|row| convert_row(row, &names))
        .collect::<Result<Vec<_>>>()?;

    let execution_time_ms = start_time.elapsed().as_millis() as u64;
    tracing::debug!(row_count = rows.len(), execution_time_ms, "query executed");

    Ok(QueryResult {
        columns,
        affected_rows: rows.len() as u64,
        rows,
        execution_time_ms,
    })
}

async fn query_batch_on(client: &Client, sql: &str, params: &[Value]) -> Result<Vec<QueryResult>> {
    let start_time = Instant::now();
    let statement = match client.prepare(sql).await {
        Ok(statement) => statement,
        Err(e) if params.is_empty() && is_multiple_commands_error(&e) => {
            return simple_query_on(client, sql).await;
        }
        Err(e) => return Err(statement_error("Failed to prepare statement", &e)),
    };
    let pg_params = bind(&statement, params)?;
    Ok(vec![query_prepared(client, &statement, &pg_params, start_time).await?])
}

/// Run multi-statement text; every statement that returns rows becomes a result.
///
/// The simple protocol only transfers text, so values arrive as strings.
async fn simple_query_on(client: &Client, sql: &str) -> Result<Vec<QueryResult>> {
    tracing::debug!("running multi-statement text through the simple query protocol");
    let messages = client
        .simple_query(sql)
        .await
        .map_err(|e| statement_error("Failed to execute batch", &e))?;

    let mut results = Vec::new();
    let mut current: Option<(Vec<String>, Vec<Vec<Value>>)> = None;

    for message in messages {
        match message {
            SimpleQueryMessage::RowDescription(columns) => {
                let names = columns.iter().map(|c| c.name().to_string()).collect();
                current = Some((names, Vec::new()));
            }
            SimpleQueryMessage::Row(row) => {
                let (_, rows) = current.get_or_insert_with(|| {
                    let names = row.columns().iter().map(|c| c.name().to_string()).collect();
                    (names, Vec::new())
                });
                let values = (0..row.len())
                    .map(|idx| match row.get(idx) {
                        Some(text) => Value::String(text.to_string()),
                        None => Value::Null,
                    })
                    .collect();
                rows.push(values);
            }
            SimpleQueryMessage::CommandComplete(count) => {
                if let Some((names, rows)) = current.take() {
                    let mut result = QueryResult::from_rows(names, rows);
                    result.affected_rows = count;
                    results.push(result);
                }
            }
            _ => {}
        }
    }

    Ok(results)
}

async fn query_stream_on(client: &Client, sql: &str, params: &[Value]) -> Result<RowStream> {
    let (statement, pg_params) = prepare(client, sql, params).await?;
    let names: Vec<String> = statement.columns().iter().map(|c| c.name().to_string()).collect();

    let stream = client
        .query_raw(&statement, pg_params.iter())
        .await
        .map_err(|e| statement_error("Failed to execute query", &e))?;

    Ok(Box::pin(stream.map(move |row| {
        let row = row.map_err(|e| statement_error("Failed to read row", &e))?;
        convert_row(&row, &names)
    })))
}

/// PostgreSQL session
pub struct PostgresConnection {
    client: SharedClient,
    cancel_token: CancelToken,
    tls: Option<MakeTlsConnector>,
    closed: AtomicBool,
}

impl PostgresConnection {
    pub(crate) fn new(client: Client, tls: Option<MakeTlsConnector>) -> Self {
        let cancel_token = client.cancel_token();
        Self {
            client: Arc::new(Mutex::new(Some(client))),
            cancel_token,
            tls,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Connection for PostgresConnection {
    fn driver_name(&self) -> &str {
        "postgresql"
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql_preview(sql)))]
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or_else(closed_error)?;
        execute_on(client, sql, params).await
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql_preview(sql)))]
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or_else(closed_error)?;
        query_on(client, sql, params).await
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql_preview(sql)))]
    async fn query_batch(&self, sql: &str, params: &[Value]) -> Result<Vec<QueryResult>> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or_else(closed_error)?;
        query_batch_on(client, sql, params).await
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql_preview(sql)))]
    async fn query_stream(&self, sql: &str, params: &[Value]) -> Result<RowStream> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or_else(closed_error)?;
        query_stream_on(client, sql, params).await
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
        tracing::debug!("beginning PostgreSQL transaction");
        {
            let guard = self.client.lock().await;
            let client = guard.as_ref().ok_or_else(closed_error)?;
            client
                .batch_execute("BEGIN")
                .await
                .map_err(|e| statement_error("Failed to begin transaction", &e))?;
        }

        Ok(Box::new(PostgresTransaction {
            client: Arc::clone(&self.client),
            finished: false,
        }))
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        // Dropping the client ends the background connection task
        let client = self.client.lock().await.take();
        drop(client);
        tracing::debug!("PostgreSQL connection closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return true;
        }
        // The server or the network may have ended the session
        match self.client.try_lock() {
            Ok(client) => client.as_ref().is_none_or(Client::is_closed),
            Err(_) => false,
        }
    }

    fn cancel_handle(&self) -> Option<Arc<dyn QueryCancelHandle>> {
        Some(Arc::new(PostgresCancelHandle {
            cancel_token: self.cancel_token.clone(),
            tls: self.tls.clone(),
        }))
    }
}

/// PostgreSQL transaction.
///
/// Statements share the session's client; the transaction is scoped by
/// `BEGIN` and `COMMIT`/`ROLLBACK` on that session.
pub struct PostgresTransaction {
    client: SharedClient,
    finished: bool,
}

impl PostgresTransaction {
    async fn finish(&mut self, sql: &str, context: &str) -> Result<()> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or_else(closed_error)?;
        self.finished = true;
        client
            .batch_execute(sql)
            .await
            .map_err(|e| statement_error(context, &e))
    }
}

impl Drop for PostgresTransaction {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!("PostgreSQL transaction dropped without commit or rollback");
        }
    }
}

#[async_trait]
impl Transaction for PostgresTransaction {
    async fn commit(mut self: Box<Self>) -> Result<()> {
        tracing::debug!("committing PostgreSQL transaction");
        self.finish("COMMIT", "Failed to commit transaction").await
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        tracing::debug!("rolling back PostgreSQL transaction");
        self.finish("ROLLBACK", "Failed to rollback transaction").await
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql_preview(sql)))]
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or_else(closed_error)?;
        execute_on(client, sql, params).await
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql_preview(sql)))]
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or_else(closed_error)?;
        query_on(client, sql, params).await
    }

    async fn query_batch(&self, sql: &str, params: &[Value]) -> Result<Vec<QueryResult>> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or_else(closed_error)?;
        query_batch_on(client, sql, params).await
    }

    async fn query_stream(&self, sql: &str, params: &[Value]) -> Result<RowStream> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or_else(closed_error)?;
        query_stream_on(client, sql, params).await
    }
}
