//! PostgreSQL driver implementation

mod connection;
mod connection_string;
mod driver;
mod tls;
mod value;

pub use connection::{PostgresCancelHandle, PostgresConnection, PostgresTransaction};
pub use connection_string::{PostgresConnectOptions, parse_connection_string};
pub use driver::PostgresDriver;
pub use tls::{PostgresTlsConnector, TlsConfig, TlsError, TlsMode, tls_mode_to_sslmode};
