//! Integration tests for the gateway against a real PostgreSQL server.
//!
//! Every test starts its own `postgres` container through testcontainers, so
//! Docker must be available. The tests are ignored by default:
//!
//! ```bash
//! cargo test -p sqlgate-driver-tests -- --ignored
//! ```

#![warn(clippy::all)]

pub mod fixtures;
pub mod test_containers;

#[cfg(test)]
mod execution_tests;

#[cfg(test)]
mod procedure_tests;
