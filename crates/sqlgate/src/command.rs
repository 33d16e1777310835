//! Command preparation and dispatch

use sqlgate_core::{
    Connection, DataSet, Parameter, QueryCancelHandle, QueryResult, Result, RowStream, Transaction,
    Value,
};
use std::sync::Arc;

use crate::binder::{arguments, attach_parameters};
use crate::call_text::{quote_identifier, validate_procedure_name};
use crate::connection::{DbConnection, DbTransaction};
use crate::guard::CallGuard;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandKind {
    /// SQL text with `$1..$n` placeholders in parameter order
    #[default]
    Text,
    /// A procedure name, invoked as `CALL name(...)` with one argument per parameter
    StoredProcedure,
}

/// An executable statement bound to a connection and optional transaction.
///
/// Created per call and not reused.
#[derive(Debug)]
pub struct Command<'a> {
    pub text: String,
    pub kind: CommandKind,
    pub parameters: Vec<Parameter>,
    pub connection: &'a DbConnection,
    pub transaction: Option<&'a DbTransaction<'a>>,
}

/// Build a command, opening `connection` first when it is not open
pub async fn prepare_command<'a>(
    connection: &'a DbConnection,
    transaction: Option<&'a DbTransaction<'a>>,
    kind: CommandKind,
    text: impl Into<String>,
    descriptors: &[Parameter],
    guard: &CallGuard,
) -> Result<Command<'a>> {
    connection.open(guard).await?;

    let mut command = Command {
        text: text.into(),
        kind,
        parameters: Vec::new(),
        connection,
        transaction,
    };
    if !descriptors.is_empty() {
        attach_parameters(&mut command.parameters, descriptors);
    }
    Ok(command)
}

fn is_plain_identifier(name: &str) -> bool {
    !name.contains('.') && !name.starts_with('"') && validate_procedure_name(name).is_ok()
}

enum Target<'t> {
    Session(Arc<dyn Connection>),
    Transaction(&'t dyn Transaction),
}

impl Target<'_> {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        match self {
            Target::Session(session) => session.execute(sql, params).await,
            Target::Transaction(tx) => tx.execute(sql, params).await,
        }
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        match self {
            Target::Session(session) => session.query(sql, params).await,
            Target::Transaction(tx) => tx.query(sql, params).await,
        }
    }

    async fn query_batch(&self, sql: &str, params: &[Value]) -> Result<Vec<QueryResult>> {
        match self {
            Target::Session(session) => session.query_batch(sql, params).await,
            Target::Transaction(tx) => tx.query_batch(sql, params).await,
        }
    }

    async fn query_stream(&self, sql: &str, params: &[Value]) -> Result<RowStream> {
        match self {
            Target::Session(session) => session.query_stream(sql, params).await,
            Target::Transaction(tx) => tx.query_stream(sql, params).await,
        }
    }
}

impl<'a> Command<'a> {
    /// The statement text sent to the server
    pub fn render(&self) -> Result<String> {
        match self.kind {
            CommandKind::Text => Ok(self.text.clone()),
            CommandKind::StoredProcedure => {
                validate_procedure_name(&self.text)?;
                let args: Vec<String> = self
                    .parameters
                    .iter()
                    .enumerate()
                    .map(|(i, parameter)| {
                        let mut arg = format!("${}", i + 1);
                        if let Some(pg_type) = parameter.param_type.pg_type_name() {
                            arg.push_str("::");
                            arg.push_str(pg_type);
                        }
                        if parameter.name.is_empty() {
                            arg
                        } else if is_plain_identifier(&parameter.name) {
                            format!("{} => {arg}", parameter.name)
                        } else {
                            format!("{} => {arg}", quote_identifier(&parameter.name))
                        }
                    })
                    .collect();
                Ok(format!("CALL {}({})", self.text, args.join(", ")))
            }
        }
    }

    /// Positional arguments in parameter order
    pub fn arguments(&self) -> Vec<Value> {
        arguments(&self.parameters)
    }

    fn target(&self) -> Result<Target<'a>> {
        match self.transaction {
            Some(tx) => Ok(Target::Transaction(tx.inner()?)),
            None => Ok(Target::Session(self.connection.session()?)),
        }
    }

    fn cancel_handle(&self) -> Option<Arc<dyn QueryCancelHandle>> {
        self.connection.session().ok().and_then(|session| session.cancel_handle())
    }

    pub(crate) async fn execute_non_query(&self, guard: &CallGuard) -> Result<u64> {
        let sql = self.render()?;
        self.execute_with_arguments(&sql, &self.arguments(), guard).await
    }

    /// Run `sql` with explicit arguments instead of the rendered parameters.
    ///
    /// The procedure caller uses this: its parameters only declare types.
    pub(crate) async fn execute_with_arguments(
        &self,
        sql: &str,
        arguments: &[Value],
        guard: &CallGuard,
    ) -> Result<u64> {
        let target = self.target()?;
        guard
            .run("execute", self.cancel_handle(), target.execute(sql, arguments))
            .await
    }

    /// Every result of the statement as `Table`, `Table1`, ...
    pub(crate) async fn fill(&self, guard: &CallGuard) -> Result<DataSet> {
        let sql = self.render()?;
        let arguments = self.arguments();
        let target = self.target()?;
        let results = guard
            .run("query", self.cancel_handle(), target.query_batch(&sql, &arguments))
            .await?;
        Ok(results.into_iter().collect())
    }

    pub(crate) async fn query_table(&self, sql: &str, guard: &CallGuard) -> Result<QueryResult> {
        let target = self.target()?;
        guard.run("fetch", self.cancel_handle(), target.query(sql, &[])).await
    }

    pub(crate) async fn open_stream(&self, guard: &CallGuard) -> Result<RowStream> {
        let sql = self.render()?;
        let arguments = self.arguments();
        let target = self.target()?;
        guard
            .run("open reader", self.cancel_handle(), target.query_stream(&sql, &arguments))
            .await
    }

    pub(crate) async fn scalar(&self, guard: &CallGuard) -> Result<Option<Value>> {
        let data = self.fill(guard).await?;
        Ok(data.first().and_then(QueryResult::scalar).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockDriver, MockState};
    use pretty_assertions::assert_eq;
    use sqlgate_core::{ParamDirection, ParamType};

    fn connection() -> (DbConnection, Arc<MockState>) {
        let state = MockState::new();
        let driver = Arc::new(MockDriver::new(Arc::clone(&state)));
        (DbConnection::new(driver, "mock"), state)
    }

    #[tokio::test]
    async fn test_prepare_opens_connection_once() {
        let (conn, state) = connection();
        let guard = CallGuard::unbounded();

        prepare_command(&conn, None, CommandKind::Text, "SELECT 1", &[], &guard).await.unwrap();
        prepare_command(&conn, None, CommandKind::Text, "SELECT 2", &[], &guard).await.unwrap();

        assert!(conn.is_open());
        assert_eq!(state.opened(), 1);
    }

    #[tokio::test]
    async fn test_prepare_binds_descriptors() {
        let (conn, _state) = connection();
        let guard = CallGuard::unbounded();
        let descriptors = [
            Parameter::input("id", ParamType::Integer, Value::Int32(4)),
            Parameter::input_output("note", ParamType::Text, None),
        ];

        let command = prepare_command(&conn, None, CommandKind::Text, "q", &descriptors, &guard)
            .await
            .unwrap();

        assert_eq!(command.parameters.len(), 2);
        assert_eq!(command.parameters[1].value, Some(Value::Null));
        assert_eq!(command.arguments(), vec![Value::Int32(4), Value::Null]);
    }

    #[tokio::test]
    async fn test_prepare_refused_connection() {
        let (conn, state) = connection();
        state.refuse_connections();

        let guard = CallGuard::unbounded();
        let result =
            prepare_command(&conn, None, CommandKind::Text, "SELECT 1", &[], &guard).await;
        assert!(matches!(result, Err(sqlgate_core::SqlgateError::Connection(_))));
        assert!(!conn.is_open());
    }

    #[tokio::test]
    async fn test_stored_procedure_rendering() {
        let (conn, _state) = connection();
        let descriptors = [
            Parameter::input("p_user", ParamType::Varchar, Value::from("sam")),
            Parameter::new("", ParamDirection::In, ParamType::Unspecified, Some(Value::Int64(1))),
            Parameter::cursor("Out Cursor"),
        ];
        let command = prepare_command(
            &conn,
            None,
            CommandKind::StoredProcedure,
            "stock.get_items",
            &descriptors,
            &CallGuard::unbounded(),
        )
        .await
        .unwrap();

        assert_eq!(
            command.render().unwrap(),
            r#"CALL stock.get_items(p_user => $1::varchar, $2, "Out Cursor" => $3::refcursor)"#
        );
    }

    #[tokio::test]
    async fn test_stored_procedure_name_is_validated() {
        let (conn, _state) = connection();
        let command = prepare_command(
            &conn,
            None,
            CommandKind::StoredProcedure,
            "p(); drop table x",
            &[],
            &CallGuard::unbounded(),
        )
        .await
        .unwrap();

        assert!(command.render().is_err());
    }

    #[tokio::test]
    async fn test_transaction_commands_run_on_transaction() {
        let (conn, state) = connection();
        let guard = CallGuard::unbounded();
        conn.open(&guard).await.unwrap();
        let tx = conn.begin_transaction(&guard).await.unwrap();

        let sql = "UPDATE t SET a = 1";
        let command = prepare_command(&conn, Some(&tx), CommandKind::Text, sql, &[], &guard)
            .await
            .unwrap();
        assert_eq!(command.execute_non_query(&guard).await.unwrap(), 1);
        drop(command);
        tx.commit(&guard).await.unwrap();

        assert_eq!(state.events(), vec!["BEGIN", "COMMIT"]);
        assert_eq!(state.sql(), vec!["UPDATE t SET a = 1"]);
    }
}
