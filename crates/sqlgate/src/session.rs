//! Session records and procedure-backed authentication

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::gateway::Gateway;

pub const DEFAULT_LOGIN_PROCEDURE: &str = "public.checklogin";
pub const DEFAULT_LOGIN_CURSOR: &str = "outjson";

/// Who a session belongs to and whether they proved it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub username: String,
    pub authenticated: bool,
    pub issued_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn anonymous() -> Self {
        Self {
            username: String::new(),
            authenticated: false,
            issued_at: Utc::now(),
        }
    }

    pub fn authenticated(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            authenticated: true,
            issued_at: Utc::now(),
        }
    }

    /// A failed attempt keeps the attempted name but is not authenticated
    pub fn rejected(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            authenticated: false,
            issued_at: Utc::now(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn sign_out(&mut self) {
        self.username.clear();
        self.authenticated = false;
        self.issued_at = Utc::now();
    }
}

impl Default for SessionRecord {
    fn default() -> Self {
        Self::anonymous()
    }
}

/// Checks credentials with a cursor-returning login procedure.
///
/// The procedure receives `{"username": .., "password": ..}` and opens one
/// cursor; the login succeeds when that cursor has at least one row.
#[derive(Debug, Clone)]
pub struct Authenticator {
    gateway: Gateway,
    connection_name: String,
    procedure: String,
    cursor: String,
}

impl Authenticator {
    pub fn new(gateway: Gateway) -> Self {
        Self {
            gateway,
            connection_name: String::new(),
            procedure: DEFAULT_LOGIN_PROCEDURE.to_string(),
            cursor: DEFAULT_LOGIN_CURSOR.to_string(),
        }
    }

    /// Named connection string to use; empty selects the default
    pub fn with_connection(mut self, name: impl Into<String>) -> Self {
        self.connection_name = name.into();
        self
    }

    pub fn with_procedure(
        mut self,
        procedure: impl Into<String>,
        cursor: impl Into<String>,
    ) -> Self {
        self.procedure = procedure.into();
        self.cursor = cursor.into();
        self
    }

    /// Bad credentials and database failures both yield an unauthenticated
    /// record; the failure is logged.
    pub async fn authenticate(&self, username: &str, password: &str) -> SessionRecord {
        let connection_string = match self.gateway.connect_string(&self.connection_name) {
            Ok(connection_string) => connection_string,
            Err(e) => {
                tracing::warn!(error = %e, username = %username, "login failed");
                return SessionRecord::rejected(username);
            }
        };

        let payload = serde_json::json!({ "username": username, "password": password }).to_string();
        let outcome = self
            .gateway
            .call_procedure(&connection_string, &payload, &self.procedure, &[self.cursor.as_str()])
            .await;

        if let Some(e) = &outcome.failure {
            tracing::warn!(error = %e, username = %username, "login failed");
            return SessionRecord::rejected(username);
        }

        if outcome.cursors.first().is_some_and(|table| table.has_rows()) {
            tracing::debug!(username = %username, "login succeeded");
            SessionRecord::authenticated(username)
        } else {
            tracing::warn!(username = %username, "login failed: credentials rejected");
            SessionRecord::rejected(username)
        }
    }
}
