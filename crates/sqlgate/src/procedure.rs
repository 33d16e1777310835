//! Cursor fan-out procedure calls
//!
//! `call proc('<payload>', 'c1', 'c2', ...)` runs inside a transaction; the
//! procedure opens one refcursor per name it is given. Each cursor is then
//! drained with `FETCH ALL IN "<name>"` before the transaction commits.
//! Tables are named `Table`, `Table1`, ... by declaration position, not by
//! the cursor names.

use sqlgate_core::{CursorSet, ParamType, Parameter, Result, SqlgateError};

use crate::call_text::{build_call_text, fetch_all_statement, normalize_cursor_name};
use crate::command::{CommandKind, prepare_command};
use crate::connection::{DbConnection, DbTransaction};
use crate::gateway::Gateway;
use crate::guard::CallGuard;

/// Name of the payload parameter declared for fan-out calls
pub const INPUT_PARAMETER: &str = "inputjson";

/// Result of a fan-out call.
///
/// On failure `cursors` is empty, `result` is `""`, `error` holds the
/// message and `failure` the error itself.
#[derive(Debug, Default)]
pub struct ProcedureOutcome {
    pub cursors: CursorSet,
    pub result: String,
    pub error: String,
    pub failure: Option<SqlgateError>,
    cursor_names: Vec<String>,
}

impl ProcedureOutcome {
    fn success(cursors: CursorSet, cursor_names: Vec<String>) -> Self {
        Self {
            cursors,
            result: "OK".to_string(),
            error: String::new(),
            failure: None,
            cursor_names,
        }
    }

    fn failed(error: SqlgateError, cursor_names: Vec<String>) -> Self {
        Self {
            cursors: CursorSet::default(),
            result: String::new(),
            error: error.to_string(),
            failure: Some(error),
            cursor_names,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// The declared cursor name of the table at `index`
    pub fn cursor_name(&self, index: usize) -> Option<&str> {
        self.cursor_names.get(index).map(String::as_str)
    }

    /// Tables paired with the cursor name declared at the same position
    pub fn tables_by_cursor(&self) -> impl Iterator<Item = (&str, &sqlgate_core::QueryResult)> {
        self.cursor_names
            .iter()
            .map(String::as_str)
            .zip(self.cursors.iter().map(|(_, table)| table))
    }

    pub fn into_result(self) -> Result<CursorSet> {
        match self.failure {
            Some(error) => Err(error),
            None => Ok(self.cursors),
        }
    }
}

/// The payload parameter followed by one refcursor per name
fn procedure_parameters(payload: &str, cursor_names: &[String]) -> Vec<Parameter> {
    let mut parameters = Vec::with_capacity(cursor_names.len() + 1);
    parameters.push(Parameter::input(INPUT_PARAMETER, ParamType::Varchar, payload));
    parameters.extend(cursor_names.iter().map(Parameter::cursor));
    parameters
}

impl Gateway {
    /// Call a cursor-returning procedure on a connection opened for the call
    pub async fn call_procedure(
        &self,
        connection_string: &str,
        input_payload: &str,
        procedure_name: &str,
        output_cursor_names: &[&str],
    ) -> ProcedureOutcome {
        let connection = self.connection(connection_string);
        let outcome = self
            .call_procedure_on(&connection, input_payload, procedure_name, output_cursor_names)
            .await;
        if let Err(e) = connection.close().await {
            tracing::warn!(error = %e, "failed to close connection after procedure call");
        }
        outcome
    }

    /// Call a cursor-returning procedure on the caller's connection.
    ///
    /// The connection is opened if needed and left open.
    #[tracing::instrument(
        skip(self, connection, input_payload),
        fields(cursors = output_cursor_names.len())
    )]
    pub async fn call_procedure_on(
        &self,
        connection: &DbConnection,
        input_payload: &str,
        procedure_name: &str,
        output_cursor_names: &[&str],
    ) -> ProcedureOutcome {
        let cursor_names: Vec<String> = output_cursor_names
            .iter()
            .map(|name| normalize_cursor_name(name))
            .collect();
        let guard = self.guard_for(connection.connection_string());

        match self
            .run_procedure(connection, input_payload, procedure_name, &cursor_names, &guard)
            .await
        {
            Ok(cursors) => ProcedureOutcome::success(cursors, cursor_names),
            Err(e) => {
                tracing::warn!(error = %e, "procedure call failed");
                ProcedureOutcome::failed(e, cursor_names)
            }
        }
    }

    async fn run_procedure(
        &self,
        connection: &DbConnection,
        payload: &str,
        procedure_name: &str,
        cursor_names: &[String],
        guard: &CallGuard,
    ) -> Result<CursorSet> {
        let call = build_call_text(procedure_name, payload, cursor_names, self.payload_binding())?;
        let parameters = procedure_parameters(payload, cursor_names);

        connection.open(guard).await?;
        let transaction = connection.begin_transaction(guard).await?;

        match fan_out(&transaction, &call.text, &call.arguments, &parameters, guard).await {
            Ok(cursors) => {
                transaction.commit(guard).await?;
                Ok(cursors)
            }
            Err(e) => {
                if let Err(rollback_error) = transaction.rollback(guard).await {
                    tracing::warn!(
                        error = %rollback_error,
                        "rollback after failed procedure call failed"
                    );
                }
                Err(e)
            }
        }
    }
}

/// Execute the call, then drain every cursor parameter in order
async fn fan_out(
    transaction: &DbTransaction<'_>,
    call_text: &str,
    call_arguments: &[sqlgate_core::Value],
    parameters: &[Parameter],
    guard: &CallGuard,
) -> Result<CursorSet> {
    let command = prepare_command(
        transaction.connection(),
        Some(transaction),
        CommandKind::Text,
        call_text,
        parameters,
        guard,
    )
    .await?;

    command.execute_with_arguments(call_text, call_arguments, guard).await?;

    let mut cursors = CursorSet::default();
    for parameter in command.parameters.iter().filter(|p| p.is_cursor()) {
        tracing::debug!(cursor = %parameter.name, "fetching cursor");
        let table = command.query_table(&fetch_all_statement(&parameter.name), guard).await?;
        cursors.push_table(table);
    }
    Ok(cursors)
}
