//! Shared setup for the integration tests

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlgate::{CommandKind, Gateway, GatewaySettings};
use sqlgate_driver_postgres::PostgresDriver;

use crate::test_containers::PostgresContainer;

/// Name the fixture registers the container's connection string under
pub const CONNECTION_NAME: &str = "ConnectionPg";

const SCHEMA: &[&str] = &[
    "CREATE TABLE app_users (id integer PRIMARY KEY, name varchar NOT NULL, password varchar NOT NULL)",
    "INSERT INTO app_users (id, name, password) VALUES (1, 'a', 'secret'), (2, 'b', 'hunter2')",
    r#"CREATE OR REPLACE PROCEDURE public.checklogin(inputjson varchar, INOUT outjson refcursor)
LANGUAGE plpgsql AS $$
BEGIN
    OPEN outjson FOR
        SELECT u.id, u.name FROM app_users u
        WHERE u.name = (inputjson::json)->>'username'
          AND u.password = (inputjson::json)->>'password';
END
$$"#,
    r#"CREATE OR REPLACE PROCEDURE public.user_report(inputjson varchar, INOUT users refcursor, INOUT totals refcursor)
LANGUAGE plpgsql AS $$
BEGIN
    OPEN users FOR SELECT id, name FROM app_users ORDER BY id;
    OPEN totals FOR SELECT count(*) AS total FROM app_users;
END
$$"#,
    r#"CREATE OR REPLACE PROCEDURE public.broken(inputjson varchar, INOUT outjson refcursor)
LANGUAGE plpgsql AS $$
BEGIN
    RAISE EXCEPTION 'broken procedure';
END
$$"#,
];

/// A gateway wired to a fresh container with the test schema loaded
pub struct TestDatabase {
    pub gateway: Gateway,
    container: PostgresContainer,
}

impl TestDatabase {
    pub async fn start() -> Result<Self> {
        let container = PostgresContainer::start().await?;

        let mut settings = GatewaySettings::default();
        settings
            .connection_strings
            .insert(CONNECTION_NAME.to_string(), container.connection_string().to_string());
        let gateway = Gateway::new(Arc::new(PostgresDriver::new())).with_settings(settings);

        let database = Self { gateway, container };
        database.load_schema().await?;
        Ok(database)
    }

    pub fn connection_string(&self) -> &str {
        self.container.connection_string()
    }

    async fn load_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            self.gateway
                .execute_non_query(self.connection_string(), CommandKind::Text, statement, &[])
                .await
                .with_context(|| {
                    format!("failed to run: {}", &statement[..statement.len().min(60)])
                })?;
        }
        Ok(())
    }
}
