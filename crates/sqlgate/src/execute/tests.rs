use super::*;
use crate::ConnectionOwnership;
use crate::test_support::mock_gateway;
use pretty_assertions::assert_eq;
use sqlgate_core::{ParamType, QueryResult, SqlgateError};
use std::time::Duration;

fn people() -> QueryResult {
    QueryResult::from_rows(
        ["id", "name"],
        vec![
            vec![Value::Int32(1), Value::from("a")],
            vec![Value::Int32(2), Value::from("b")],
        ],
    )
}

// =============================================================================
// Internal connections are released on every path
// =============================================================================

#[tokio::test]
async fn test_non_query_releases_connection() {
    let (gateway, state) = mock_gateway();

    let affected = gateway
        .execute_non_query("mock", CommandKind::Text, "DELETE FROM t", &[])
        .await
        .unwrap();
    assert_eq!(affected, 1);
    assert_eq!((state.opened(), state.closed(), state.released()), (1, 1, 1));

    state.fail_on("DELETE");
    let result = gateway
        .execute_non_query("mock", CommandKind::Text, "DELETE FROM t", &[])
        .await;
    assert!(matches!(result, Err(SqlgateError::Statement(_))));
    assert_eq!((state.opened(), state.closed(), state.released()), (2, 2, 2));
}

#[tokio::test]
async fn test_dataset_releases_connection_and_keeps_error() {
    let (gateway, state) = mock_gateway();
    state.respond("SELECT * FROM people", vec![people()]);

    let outcome = gateway
        .execute_dataset("mock", CommandKind::Text, "SELECT * FROM people", &[])
        .await;
    assert!(outcome.is_success());
    assert_eq!(outcome.value.names().collect::<Vec<_>>(), vec!["Table"]);
    assert_eq!(outcome.value.first().map(QueryResult::row_count), Some(2));
    assert_eq!(state.closed(), 1);

    state.fail_on("broken");
    let outcome = gateway
        .execute_dataset("mock", CommandKind::Text, "SELECT broken", &[])
        .await;
    assert!(outcome.is_failure());
    assert!(outcome.value.is_empty());
    assert!(matches!(outcome.error, Some(SqlgateError::Statement(_))));
    assert_eq!(state.closed(), 2);
}

#[tokio::test]
async fn test_scalar_releases_connection_and_keeps_error() {
    let (gateway, state) = mock_gateway();
    state.respond(
        "SELECT count(*) FROM people",
        vec![QueryResult::from_rows(["count"], vec![vec![Value::Int64(2)]])],
    );

    let outcome = gateway
        .execute_scalar("mock", CommandKind::Text, "SELECT count(*) FROM people", &[])
        .await;
    assert_eq!(outcome.value, Some(Value::Int64(2)));
    assert!(outcome.is_success());

    state.fail_on("count");
    let outcome = gateway
        .execute_scalar("mock", CommandKind::Text, "SELECT count(*) FROM people", &[])
        .await;
    assert_eq!(outcome.value, None);
    assert!(outcome.is_failure());
    assert_eq!((state.opened(), state.closed()), (2, 2));
}

#[tokio::test]
async fn test_scalar_without_rows_is_none_but_successful() {
    let (gateway, _state) = mock_gateway();

    let outcome = gateway
        .execute_scalar("mock", CommandKind::Text, "SELECT 1 WHERE false", &[])
        .await;
    assert_eq!(outcome.value, None);
    assert!(outcome.is_success());
}

#[tokio::test]
async fn test_refused_connection_degrades_dataset() {
    let (gateway, state) = mock_gateway();
    state.refuse_connections();

    let outcome = gateway
        .execute_dataset("mock", CommandKind::Text, "SELECT 1", &[])
        .await;
    assert!(matches!(outcome.error, Some(SqlgateError::Connection(_))));
    assert!(outcome.value.is_empty());

    let result = gateway.execute_non_query("mock", CommandKind::Text, "SELECT 1", &[]).await;
    assert!(matches!(result, Err(SqlgateError::Connection(_))));
}

// =============================================================================
// Tabular results
// =============================================================================

#[tokio::test]
async fn test_multiple_results_become_numbered_tables() {
    let (gateway, state) = mock_gateway();
    let sql = "SELECT 1; SELECT 2; SELECT 3";
    state.respond(sql, vec![people(), QueryResult::empty(), people()]);

    let outcome = gateway.execute_dataset("mock", CommandKind::Text, sql, &[]).await;
    assert_eq!(
        outcome.value.names().collect::<Vec<_>>(),
        vec!["Table", "Table1", "Table2"]
    );
}

#[tokio::test]
async fn test_parameters_are_sent_positionally() {
    let (gateway, state) = mock_gateway();
    let descriptors = [
        Parameter::input("name", ParamType::Varchar, "a"),
        Parameter::input_output("id", ParamType::Integer, None),
    ];

    gateway
        .execute_dataset("mock", CommandKind::Text, "SELECT $1, $2", &descriptors)
        .await;

    assert_eq!(
        state.statements(),
        vec![("SELECT $1, $2".to_string(), vec![Value::from("a"), Value::Null])]
    );
}

#[tokio::test]
async fn test_stored_procedure_kind_sends_call() {
    let (gateway, state) = mock_gateway();
    let descriptors = [Parameter::input("p_id", ParamType::Integer, Value::Int32(3))];

    gateway
        .execute_non_query("mock", CommandKind::StoredProcedure, "stock.touch", &descriptors)
        .await
        .unwrap();

    assert_eq!(state.sql(), vec!["CALL stock.touch(p_id => $1::int4)"]);
}

// =============================================================================
// External connections and transactions
// =============================================================================

#[tokio::test]
async fn test_external_connection_is_never_closed() {
    let (gateway, state) = mock_gateway();
    let connection = gateway.connection("mock");

    gateway
        .execute_non_query_on(&connection, CommandKind::Text, "UPDATE t SET a = 1", &[])
        .await
        .unwrap();
    gateway
        .execute_dataset_on(&connection, CommandKind::Text, "SELECT 1", &[])
        .await;
    state.fail_on("fails");
    gateway
        .execute_scalar_on(&connection, CommandKind::Text, "SELECT fails", &[])
        .await;

    assert!(connection.is_open());
    assert_eq!((state.opened(), state.closed()), (1, 0));
}

#[tokio::test]
async fn test_transaction_forms_share_the_transaction() {
    let (gateway, state) = mock_gateway();
    state.respond(
        "SELECT a FROM t",
        vec![QueryResult::from_rows(["a"], vec![vec![Value::Int32(1)]])],
    );
    let connection = gateway.connection("mock");
    let guard = gateway.guard_for("mock");
    connection.open(&guard).await.unwrap();
    let transaction = connection.begin_transaction(&guard).await.unwrap();

    gateway
        .execute_non_query_in(&transaction, CommandKind::Text, "UPDATE t SET a = 1", &[])
        .await
        .unwrap();
    let scalar = gateway
        .execute_scalar_in(&transaction, CommandKind::Text, "SELECT a FROM t", &[])
        .await;
    let dataset = gateway
        .execute_dataset_in(&transaction, CommandKind::Text, "SELECT a FROM t", &[])
        .await;
    let rows = gateway
        .execute_reader_in(&transaction, CommandKind::Text, "SELECT a FROM t", &[])
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    transaction.commit(&guard).await.unwrap();

    assert_eq!(scalar.value, Some(Value::Int32(1)));
    assert_eq!(dataset.value.len(), 1);
    assert_eq!(rows.len(), 1);
    assert_eq!(state.events(), vec!["BEGIN", "COMMIT"]);
    assert!(connection.is_open());
    assert_eq!(state.closed(), 0);
}

// =============================================================================
// Row readers
// =============================================================================

#[tokio::test]
async fn test_internal_reader_closes_connection_on_close() {
    let (gateway, state) = mock_gateway();
    state.respond("SELECT * FROM people", vec![people()]);

    let mut reader = gateway
        .execute_reader("mock", CommandKind::Text, "SELECT * FROM people", &[])
        .await
        .unwrap();
    assert_eq!(reader.ownership(), ConnectionOwnership::Internal);
    assert_eq!(state.closed(), 0);

    let first = reader.next().await.unwrap().unwrap();
    assert_eq!(first.get_by_name("name"), Some(&Value::from("a")));

    reader.close().await.unwrap();
    assert!(reader.is_closed());
    assert_eq!(state.closed(), 1);
    assert_eq!(reader.next().await.unwrap(), None);
}

#[tokio::test]
async fn test_internal_reader_closes_connection_when_exhausted() {
    let (gateway, state) = mock_gateway();
    state.respond("SELECT * FROM people", vec![people()]);

    let mut reader = gateway
        .execute_reader("mock", CommandKind::Text, "SELECT * FROM people", &[])
        .await
        .unwrap();
    while reader.next().await.unwrap().is_some() {}

    assert_eq!(reader.rows_read(), 2);
    assert_eq!(state.closed(), 1);
}

#[tokio::test]
async fn test_internal_reader_releases_connection_on_drop() {
    let (gateway, state) = mock_gateway();

    let reader = gateway
        .execute_reader("mock", CommandKind::Text, "SELECT 1", &[])
        .await
        .unwrap();
    assert_eq!(state.released(), 0);

    drop(reader);
    assert_eq!(state.released(), 1);
}

#[tokio::test]
async fn test_external_reader_leaves_connection_open() {
    let (gateway, state) = mock_gateway();
    state.respond("SELECT * FROM people", vec![people()]);
    let connection = gateway.connection("mock");

    let mut reader = gateway
        .execute_reader_on(&connection, CommandKind::Text, "SELECT * FROM people", &[])
        .await
        .unwrap();
    assert_eq!(reader.ownership(), ConnectionOwnership::External);
    reader.next().await.unwrap();
    reader.close().await.unwrap();

    assert!(connection.is_open());
    assert_eq!(state.closed(), 0);
}

#[tokio::test]
async fn test_reader_preparation_failure_closes_and_propagates() {
    let (gateway, state) = mock_gateway();
    state.fail_on("bad");

    let result = gateway
        .execute_reader("mock", CommandKind::Text, "SELECT bad", &[])
        .await;
    assert!(matches!(result, Err(SqlgateError::Statement(_))));
    assert_eq!((state.opened(), state.closed()), (1, 1));
}

// =============================================================================
// Deadlines
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_deadline_interrupts_and_still_releases() {
    let (gateway, state) = mock_gateway();
    let gateway = gateway.with_timeout(Duration::from_millis(50));
    state.delay_statements(Duration::from_secs(5));

    let result = gateway
        .execute_non_query("mock", CommandKind::Text, "SELECT pg_sleep(5)", &[])
        .await;

    assert!(matches!(result, Err(SqlgateError::Timeout(_))));
    assert_eq!(state.cancels(), 1);
    assert_eq!(state.closed(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connection_string_timeout_applies_without_explicit_one() {
    let (gateway, state) = mock_gateway();
    state.delay_statements(Duration::from_secs(5));

    let outcome = gateway
        .execute_dataset("timeout_ms=10", CommandKind::Text, "SELECT 1", &[])
        .await;

    assert!(matches!(outcome.error, Some(SqlgateError::Timeout(_))));
    assert_eq!(state.closed(), 1);
}
