//! Degrade-to-empty results that keep their failure

use crate::{Result, SqlgateError};

/// The value of an operation whose contract allows an empty result on failure.
///
/// `value` is always usable: on failure it holds the empty fallback. `error`
/// carries the failure so callers can tell "no rows" apart from "the call
/// failed" without relying on emptiness.
#[derive(Debug)]
pub struct Outcome<T> {
    pub value: T,
    pub error: Option<SqlgateError>,
}

impl<T> Outcome<T> {
    pub fn success(value: T) -> Self {
        Self { value, error: None }
    }

    pub fn failure(value: T, error: SqlgateError) -> Self {
        Self {
            value,
            error: Some(error),
        }
    }

    /// Build an outcome from a result, substituting `fallback()` on error
    pub fn from_result(result: Result<T>, fallback: impl FnOnce() -> T) -> Self {
        match result {
            Ok(value) => Self::success(value),
            Err(error) => {
                tracing::warn!(error = %error, "operation failed, degrading to empty result");
                Self::failure(fallback(), error)
            }
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }

    pub fn error(&self) -> Option<&SqlgateError> {
        self.error.as_ref()
    }

    /// Discard the fallback and surface the failure as an error
    pub fn into_result(self) -> Result<T> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.value),
        }
    }

    /// Keep the value regardless of outcome, as the legacy helpers did
    pub fn into_value(self) -> T {
        self.value
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            value: f(self.value),
            error: self.error,
        }
    }
}

impl<T: Default> From<Result<T>> for Outcome<T> {
    fn from(result: Result<T>) -> Self {
        Self::from_result(result, T::default)
    }
}
