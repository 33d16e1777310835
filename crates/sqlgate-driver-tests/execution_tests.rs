//! Execution primitive tests against PostgreSQL

use std::time::Duration;

use anyhow::Result;
use pretty_assertions::assert_eq;
use rstest::rstest;
use sqlgate::{CommandKind, ConnectionOwnership, ParamType, Parameter, Value};
use sqlgate_core::DatabaseDriver;
use sqlgate_driver_postgres::PostgresDriver;

use crate::fixtures::{CONNECTION_NAME, TestDatabase};

#[tokio::test]
#[ignore = "requires docker"]
async fn test_connect_string_lookup() -> Result<()> {
    let db = TestDatabase::start().await?;

    let by_default = db.gateway.connect_string("")?;
    let by_name = db.gateway.connect_string(CONNECTION_NAME)?;
    assert_eq!(by_default, by_name);
    assert_eq!(by_default, db.connection_string());
    Ok(())
}

#[rstest]
#[case::int(ParamType::Integer, Value::Int32(42), Value::Int32(42))]
#[case::text(ParamType::Varchar, Value::from("o'brien"), Value::from("o'brien"))]
#[case::null(ParamType::Varchar, Value::Null, Value::Null)]
#[case::numeric(ParamType::Numeric, Value::Decimal("1.5".into()), Value::Decimal("1.5".into()))]
#[case::double_from_text(ParamType::Double, Value::from("3.5"), Value::Float64(3.5))]
#[case::bigint_into_int(ParamType::Integer, Value::Int64(7), Value::Int32(7))]
#[tokio::test]
#[ignore = "requires docker"]
async fn test_scalar_round_trips_parameter(
    #[case] param_type: ParamType,
    #[case] input: Value,
    #[case] expected: Value,
) -> Result<()> {
    let db = TestDatabase::start().await?;
    let cast = param_type.pg_type_name().unwrap_or("text");

    let value = db
        .gateway
        .execute_scalar(
            db.connection_string(),
            CommandKind::Text,
            &format!("SELECT $1::{cast}"),
            &[Parameter::input("value", param_type, input)],
        )
        .await
        .into_result()?;

    assert_eq!(value, Some(expected));
    Ok(())
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_non_query_reports_affected_rows() -> Result<()> {
    let db = TestDatabase::start().await?;

    let affected = db
        .gateway
        .execute_non_query(
            db.connection_string(),
            CommandKind::Text,
            "UPDATE app_users SET password = $1 WHERE id > $2",
            &[
                Parameter::input("password", ParamType::Varchar, "changed"),
                Parameter::input("id", ParamType::Integer, 0),
            ],
        )
        .await?;

    assert_eq!(affected, 2);
    Ok(())
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_dataset_with_several_statements() -> Result<()> {
    let db = TestDatabase::start().await?;

    let data = db
        .gateway
        .execute_dataset(
            db.connection_string(),
            CommandKind::Text,
            "SELECT id FROM app_users ORDER BY id; SELECT 'x' AS label",
            &[],
        )
        .await
        .into_result()?;

    let names: Vec<&str> = data.names().collect();
    assert_eq!(names, vec!["Table", "Table1"]);
    assert_eq!(data.get("Table").map(|t| t.row_count()), Some(2));
    assert_eq!(
        data.get("Table1").and_then(|t| t.scalar()).and_then(Value::as_str),
        Some("x")
    );
    Ok(())
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_failed_dataset_degrades_to_empty() -> Result<()> {
    let db = TestDatabase::start().await?;

    let outcome = db
        .gateway
        .execute_dataset(
            db.connection_string(),
            CommandKind::Text,
            "SELECT * FROM missing_table",
            &[],
        )
        .await;

    assert!(outcome.is_failure());
    assert!(outcome.value.is_empty());
    Ok(())
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_reader_streams_and_releases() -> Result<()> {
    let db = TestDatabase::start().await?;

    let reader = db
        .gateway
        .execute_reader(
            db.connection_string(),
            CommandKind::Text,
            "SELECT id, name FROM app_users ORDER BY id",
            &[],
        )
        .await?;
    assert_eq!(reader.ownership(), ConnectionOwnership::Internal);

    let rows = reader.collect().await?;
    let names: Vec<Option<&str>> = rows
        .iter()
        .map(|row| row.get_by_name("name").and_then(Value::as_str))
        .collect();
    assert_eq!(names, vec![Some("a"), Some("b")]);
    Ok(())
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_transaction_forms_share_one_transaction() -> Result<()> {
    let db = TestDatabase::start().await?;
    let connection = db.gateway.connection(db.connection_string());
    let guard = db.gateway.guard_for(connection.connection_string());

    connection.open(&guard).await?;
    let transaction = connection.begin_transaction(&guard).await?;
    db.gateway
        .execute_non_query_in(
            &transaction,
            CommandKind::Text,
            "INSERT INTO app_users (id, name, password) VALUES (3, 'c', 'pw')",
            &[],
        )
        .await?;
    let inside = db
        .gateway
        .execute_scalar_in(&transaction, CommandKind::Text, "SELECT count(*) FROM app_users", &[])
        .await
        .into_result()?;
    transaction.rollback(&guard).await?;

    let after = db
        .gateway
        .execute_scalar_on(&connection, CommandKind::Text, "SELECT count(*) FROM app_users", &[])
        .await
        .into_result()?;

    assert_eq!(inside.and_then(|v| v.as_i64()), Some(3));
    assert_eq!(after.and_then(|v| v.as_i64()), Some(2));
    assert!(connection.is_open());
    connection.close().await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_out_of_range_integer_fails_the_call() -> Result<()> {
    let db = TestDatabase::start().await?;

    let outcome = db
        .gateway
        .execute_scalar(
            db.connection_string(),
            CommandKind::Text,
            "SELECT $1::int4",
            &[Parameter::input("value", ParamType::Integer, Value::Int64(5_000_000_000))],
        )
        .await;

    assert!(outcome.is_failure());
    let message = outcome.error().map(ToString::to_string).unwrap_or_default();
    assert!(message.contains("out of range"), "{message}");
    Ok(())
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_terminated_session_reports_closed() -> Result<()> {
    let db = TestDatabase::start().await?;
    let driver = PostgresDriver::new();
    let connection = driver.connect(db.connection_string()).await?;
    assert!(!connection.is_closed());

    // The backend ends the session in the middle of this statement
    let _ = connection.execute("SELECT pg_terminate_backend(pg_backend_pid())", &[]).await;

    let mut closed = connection.is_closed();
    for _ in 0..50 {
        if closed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        closed = connection.is_closed();
    }
    assert!(closed);
    Ok(())
}
