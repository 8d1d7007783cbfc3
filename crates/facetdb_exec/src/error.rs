//! Error types for statement execution.

use thiserror::Error;

/// Result type for executor operations.
pub type ExecResult<T> = Result<T, ExecError>;

/// Errors that can occur while executing statements.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecError {
    /// The statement could not be parsed.
    #[error("syntax error: {message}")]
    Syntax {
        /// Description of the parse failure.
        message: String,
    },

    /// The bind value count does not match the statement's placeholders.
    #[error("bind count mismatch: statement has {expected} placeholders, got {actual} values")]
    BindCount {
        /// Placeholders in the statement.
        expected: usize,
        /// Bind values supplied.
        actual: usize,
    },

    /// No transaction is active on this connection.
    #[error("no transaction is active")]
    NoTransaction,

    /// A transaction is already active on this connection.
    #[error("a transaction is already active")]
    TransactionActive,

    /// A suspend token does not name a suspended transaction.
    #[error("unknown transaction token {0}")]
    UnknownToken(u64),

    /// A uniqueness constraint rejected the statement.
    #[error("duplicate key: {message}")]
    Duplicate {
        /// Description of the violated constraint.
        message: String,
    },

    /// Connection or transport failure.
    #[error("connection failure: {message}")]
    Connection {
        /// Description of the failure.
        message: String,
    },
}

impl ExecError {
    /// Creates a syntax error.
    pub fn syntax(message: impl Into<String>) -> Self {
        Self::Syntax {
            message: message.into(),
        }
    }

    /// Creates a duplicate key error.
    pub fn duplicate(message: impl Into<String>) -> Self {
        Self::Duplicate {
            message: message.into(),
        }
    }

    /// Creates a connection failure error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }
}
