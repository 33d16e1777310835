//! In-memory driver for gateway tests

use async_trait::async_trait;
use parking_lot::Mutex;
use sqlgate_core::{
    Connection, DatabaseDriver, QueryCancelHandle, QueryResult, Result, SqlgateError, Transaction,
    Value,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crate::Gateway;

/// Shared counters and scripted behaviour for the mock driver
#[derive(Default)]
pub(crate) struct MockState {
    opened: AtomicUsize,
    closed: AtomicUsize,
    released: AtomicUsize,
    cancels: AtomicUsize,
    fail_connect: AtomicBool,
    statements: Mutex<Vec<(String, Vec<Value>)>>,
    events: Mutex<Vec<String>>,
    results: Mutex<HashMap<String, Vec<QueryResult>>>,
    failures: Mutex<Vec<String>>,
    delay: Mutex<Option<Duration>>,
}

impl MockState {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Results returned for the exact statement text `sql`
    pub(crate) fn respond(&self, sql: &str, results: Vec<QueryResult>) {
        self.results.lock().insert(sql.to_string(), results);
    }

    /// Any statement containing `fragment` fails with a statement error
    pub(crate) fn fail_on(&self, fragment: &str) {
        self.failures.lock().push(fragment.to_string());
    }

    pub(crate) fn refuse_connections(&self) {
        self.fail_connect.store(true, Ordering::SeqCst);
    }

    pub(crate) fn delay_statements(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub(crate) fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub(crate) fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Sessions whose last handle has been dropped
    pub(crate) fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub(crate) fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    pub(crate) fn statements(&self) -> Vec<(String, Vec<Value>)> {
        self.statements.lock().clone()
    }

    pub(crate) fn sql(&self) -> Vec<String> {
        self.statements.lock().iter().map(|(sql, _)| sql.clone()).collect()
    }

    pub(crate) fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    fn check(&self, sql: &str) -> Result<()> {
        if self.failures.lock().iter().any(|fragment| sql.contains(fragment.as_str())) {
            return Err(SqlgateError::Statement(format!("mock failure for: {sql}")));
        }
        Ok(())
    }

    async fn run(&self, sql: &str, params: &[Value]) -> Result<Vec<QueryResult>> {
        self.statements.lock().push((sql.to_string(), params.to_vec()));
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check(sql)?;
        Ok(self
            .results
            .lock()
            .get(sql)
            .cloned()
            .unwrap_or_else(|| vec![QueryResult::empty()]))
    }

    async fn first(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        Ok(self.run(sql, params).await?.into_iter().next().unwrap_or_default())
    }

    fn event(&self, event: &str) -> Result<()> {
        self.events.lock().push(event.to_string());
        self.check(event)
    }
}

pub(crate) struct MockDriver {
    state: Arc<MockState>,
}

impl MockDriver {
    pub(crate) fn new(state: Arc<MockState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl DatabaseDriver for MockDriver {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn display_name(&self) -> &'static str {
        "Mock"
    }

    async fn connect(&self, connection_string: &str) -> Result<Arc<dyn Connection>> {
        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(SqlgateError::Connection(format!("refused: {connection_string}")));
        }
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockConnection {
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
        }))
    }

    fn command_timeout(&self, connection_string: &str) -> Option<Duration> {
        connection_string
            .strip_prefix("timeout_ms=")
            .and_then(|ms| ms.parse().ok())
            .map(Duration::from_millis)
    }
}

struct MockConnection {
    state: Arc<MockState>,
    closed: AtomicBool,
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.state.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn driver_name(&self) -> &str {
        "mock"
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.state.run(sql, params).await?;
        Ok(1)
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.state.first(sql, params).await
    }

    async fn query_batch(&self, sql: &str, params: &[Value]) -> Result<Vec<QueryResult>> {
        self.state.run(sql, params).await
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
        self.state.event("BEGIN")?;
        Ok(Box::new(MockTransaction {
            state: Arc::clone(&self.state),
        }))
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.state.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn cancel_handle(&self) -> Option<Arc<dyn QueryCancelHandle>> {
        Some(Arc::new(MockCancel {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockTransaction {
    state: Arc<MockState>,
}

#[async_trait]
impl Transaction for MockTransaction {
    async fn commit(self: Box<Self>) -> Result<()> {
        self.state.event("COMMIT")
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.state.event("ROLLBACK")
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.state.run(sql, params).await?;
        Ok(1)
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.state.first(sql, params).await
    }

    async fn query_batch(&self, sql: &str, params: &[Value]) -> Result<Vec<QueryResult>> {
        self.state.run(sql, params).await
    }
}

struct MockCancel {
    state: Arc<MockState>,
}

impl QueryCancelHandle for MockCancel {
    fn cancel(&self) {
        self.state.cancels.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) fn mock_gateway() -> (Gateway, Arc<MockState>) {
    let state = MockState::new();
    let gateway = Gateway::new(Arc::new(MockDriver::new(Arc::clone(&state))));
    (gateway, state)
}
