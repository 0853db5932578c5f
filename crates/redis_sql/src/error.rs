//! Error taxonomy for statement parsing, dispatch, decoding, and cursor access.

use thiserror::Error;

/// Errors surfaced to callers of the tabular facade.
///
/// `Parse` and `UnknownCommand` fail a statement before anything is sent.
/// `Execution` wraps every failure of a well-formed command in the store.
/// `Decode` and `Conversion` are deferred: they surface when the offending
/// cell is read, never when the statement executes.
#[derive(Debug, Error)]
pub enum Error {
    /// The effective command line had no tokens.
    #[error("parse error: {0}")]
    Parse(String),

    /// The command name is not part of the store's command set.
    #[error("unknown command `{0}`")]
    UnknownCommand(String),

    /// The store rejected or failed a well-formed command.
    #[error("command on db {db_index} `{statement}` cannot execute: {message}")]
    Execution {
        /// Original statement text as submitted.
        statement: String,
        /// Logical database index active when the command was sent.
        db_index: i64,
        /// Message of the underlying failure.
        message: String,
    },

    /// A reply element had a shape the decoder does not understand.
    #[error("cannot decode reply element: {0}")]
    Decode(String),

    /// A registered converter or typed getter failed on a specific cell.
    #[error("cannot convert `{cell}` to {target}: {message}")]
    Conversion {
        cell: String,
        target: &'static str,
        message: String,
    },

    /// The operation is outside the supported cursor/client surface.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// The cursor, statement, connection, or client was already closed.
    #[error("{0} is closed")]
    Closed(&'static str),

    /// A hash projection could not build equal-length key/value columns.
    #[error("invalid row set: {0}")]
    InvalidRowSet(String),

    /// A 1-based column index outside the cursor's columns.
    #[error("invalid column index {0}")]
    InvalidColumn(usize),

    /// A column label that the cursor does not expose.
    #[error("unknown column label `{0}`")]
    UnknownColumn(String),

    /// A getter was called while the cursor is before the first or after the last row.
    #[error("cursor is not positioned on a row (position {0})")]
    NoCurrentRow(i64),

    /// Establishing a client failed.
    #[error("connect failed: {0}")]
    Connect(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub(crate) fn conversion(cell: &str, target: &'static str, message: impl ToString) -> Self {
        Error::Conversion {
            cell: cell.to_string(),
            target,
            message: message.to_string(),
        }
    }
}
