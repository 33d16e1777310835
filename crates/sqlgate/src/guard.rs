//! Deadline and cancellation for blocking steps

use sqlgate_core::{QueryCancelHandle, Result, SqlgateError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Bounds one step of a call (open, execute, fetch, commit, rollback).
///
/// When the deadline passes or the token is cancelled first, the step's
/// future is dropped, the driver's cancel handle is fired so the server stops
/// working on the statement, and `Timeout`/`Cancelled` is returned.
#[derive(Debug, Clone, Default)]
pub struct CallGuard {
    deadline: Option<Duration>,
    cancel: Option<CancellationToken>,
}

impl CallGuard {
    pub fn new(deadline: Option<Duration>, cancel: Option<CancellationToken>) -> Self {
        Self { deadline, cancel }
    }

    /// A guard that never interrupts
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    /// Run `step`, interrupting it on deadline or cancellation
    pub async fn run<T, F>(
        &self,
        what: &str,
        cancel_handle: Option<Arc<dyn QueryCancelHandle>>,
        step: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.is_cancelled() {
            return Err(SqlgateError::Cancelled);
        }

        let deadline = async {
            match self.deadline {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };
        let cancelled = async {
            match &self.cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };

        let interrupted = tokio::select! {
            result = step => return result,
            _ = deadline => SqlgateError::Timeout(format!(
                "{what} did not finish within {:?}",
                self.deadline.unwrap_or_default()
            )),
            _ = cancelled => SqlgateError::Cancelled,
        };

        tracing::warn!(step = %what, error = %interrupted, "call interrupted");
        if let Some(handle) = cancel_handle {
            handle.cancel();
        }
        Err(interrupted)
    }
}
