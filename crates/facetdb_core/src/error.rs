//! Error types for the FacetDB engine.

use facetdb_exec::ExecError;
use facetdb_schema::SchemaError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur in engine operations.
///
/// The variants carry distinct retry semantics: `Validation` and
/// `NotImplemented` are fatal for the call and never retried;
/// `NotFound` is surfaced as-is; `Constraint` leaves the retry decision
/// to the caller, who must re-read before retrying; `DataSource` may be
/// retried wholesale; `Allocation` means the bounded retry budget is
/// already spent.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    /// A condition or instance references unknown fields or is malformed.
    #[error("validation failed: {message}")]
    Validation {
        /// Description of the problem.
        message: String,
    },

    /// A condition shape the compiler does not support.
    #[error("not implemented: {message}")]
    NotImplemented {
        /// Description of the unsupported shape.
        message: String,
    },

    /// An exact-identity lookup matched zero rows.
    #[error("no {entity} row matches primary key {key}")]
    NotFound {
        /// The entity that was looked up.
        entity: String,
        /// Rendered primary key values.
        key: String,
    },

    /// The version stamp did not match on an optimistically locked update.
    #[error("version conflict on {entity}: expected version {expected}")]
    Constraint {
        /// The entity being updated.
        entity: String,
        /// The version the caller held.
        expected: i64,
    },

    /// Connection or transport failure from the statement executor.
    #[error("data source error: {0}")]
    DataSource(#[from] ExecError),

    /// Schema metadata failure.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Sequence refill failed after exhausting its retry budget.
    #[error("sequence {name} allocation failed after {attempts} attempts")]
    Allocation {
        /// The sequence name.
        name: String,
        /// Refill attempts made.
        attempts: u32,
    },
}

impl EngineError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a not-implemented error.
    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::NotImplemented {
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    pub fn not_found(entity: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            key: key.into(),
        }
    }

    /// Creates a version conflict error.
    pub fn constraint(entity: impl Into<String>, expected: i64) -> Self {
        Self::Constraint {
            entity: entity.into(),
            expected,
        }
    }

    /// Creates an allocation error.
    pub fn allocation(name: impl Into<String>, attempts: u32) -> Self {
        Self::Allocation {
            name: name.into(),
            attempts,
        }
    }
}
