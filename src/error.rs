use rusqlite::Error as RusqliteError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigrateError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] RusqliteError),

    /// The database file could not be opened. No transaction was started.
    #[error("Cannot open database '{}': {source}", .path.display())]
    Connection {
        path: PathBuf,
        #[source]
        source: RusqliteError,
    },

    #[error("Table '{0}' does not exist")]
    TableNotFound(String),

    /// The request was rejected before anything was written.
    #[error("Invalid migration request: {0}")]
    Validation(String),

    /// A step inside the migration transaction failed and the transaction was rolled back.
    #[error("Migration failed while {step} (rolled back): {source}")]
    Transaction {
        step: &'static str,
        #[source]
        source: RusqliteError,
    },

    /// A consistency check inside the transaction failed and the transaction was rolled back.
    #[error("Integrity check failed (rolled back): {0}")]
    Integrity(String),

    #[error("Error: {0}")]
    Error(String),
}

impl MigrateError {
    /// Adapter for `map_err` that tags a rusqlite failure with the step it happened in.
    pub fn at_step(step: &'static str) -> impl FnOnce(RusqliteError) -> MigrateError {
        move |source| MigrateError::Transaction { step, source }
    }
}
