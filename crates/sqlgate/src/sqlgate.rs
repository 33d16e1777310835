//! sqlgate: a database execution gateway
//!
//! Runs SQL text and stored procedures through a [`DatabaseDriver`], owning
//! connection and transaction lifecycle for calls made by connection string
//! and leaving it to the caller for calls made on a [`DbConnection`] or
//! [`DbTransaction`]. The cursor fan-out caller invokes a procedure that
//! opens N refcursors and materialises each into a named table.
//!
//! [`DatabaseDriver`]: sqlgate_core::DatabaseDriver

pub mod binder;
pub mod call_text;
mod command;
mod connection;
mod execute;
mod gateway;
mod guard;
mod procedure;
mod reader;
pub mod session;
pub mod settings;

#[cfg(test)]
mod test_support;

pub use call_text::PayloadBinding;
pub use command::{Command, CommandKind, prepare_command};
pub use connection::{ConnectionOwnership, ConnectionState, DbConnection, DbTransaction};
pub use gateway::Gateway;
pub use guard::CallGuard;
pub use procedure::ProcedureOutcome;
pub use reader::DataReader;
pub use session::{Authenticator, SessionRecord};
pub use settings::GatewaySettings;

pub use sqlgate_core::{
    CursorSet, DataSet, Outcome, ParamDirection, ParamType, Parameter, QueryResult, Result, Row,
    SqlgateError, Value,
};
