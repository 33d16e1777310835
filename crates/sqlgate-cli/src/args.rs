//! Command line argument definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Run statements and cursor procedures through the sqlgate gateway
#[derive(Parser, Debug)]
#[command(name = "sqlgate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true, env = "SQLGATE_SETTINGS", value_name = "PATH")]
    pub settings: Option<PathBuf>,

    /// Named connection string; the configured default when omitted
    #[arg(short, long, global = true, default_value = "", hide_default_value = true)]
    pub connection: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a statement and print every result table
    Query {
        #[arg(value_name = "SQL")]
        sql: String,

        /// Print JSON instead of tables
        #[arg(long)]
        json: bool,
    },

    /// Run a statement and print the first column of the first row
    Scalar {
        #[arg(value_name = "SQL")]
        sql: String,
    },

    /// Call a cursor-returning procedure and print its cursors as JSON
    Call {
        #[arg(value_name = "PROCEDURE")]
        procedure: String,

        /// Text passed as the procedure's first argument
        #[arg(long, default_value = "{}")]
        payload: String,

        /// Cursor names, in the order the procedure declares them
        #[arg(long = "cursor", value_name = "NAME")]
        cursors: Vec<String>,
    },

    /// Check credentials with the login procedure
    Login {
        #[arg(value_name = "USERNAME")]
        username: String,

        #[arg(long, env = "SQLGATE_PASSWORD", hide_env_values = true)]
        password: String,
    },
}
