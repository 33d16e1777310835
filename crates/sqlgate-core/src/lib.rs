//! sqlgate Core - Core abstractions and traits for the execution gateway
//!
//! This crate provides the fundamental traits and types that the driver and
//! gateway crates depend on. It defines:
//!
//! - `DatabaseDriver` - Trait for opening connections from a connection string
//! - `Connection` / `Transaction` - Traits for executing statements
//! - `Parameter` - Typed, directional statement parameters
//! - `Outcome` - A result value that keeps its failure next to the fallback data
//! - Common types like `Value`, `Row`, `QueryResult` and `DataSet`

mod connection;
mod driver;
mod error;
mod outcome;
mod params;
mod types;

pub use connection::*;
pub use driver::*;
pub use error::*;
pub use outcome::*;
pub use params::*;
pub use types::*;
