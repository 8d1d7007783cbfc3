//! Error types for schema metadata.

use thiserror::Error;

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors that can occur while building or using entity metadata.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    /// No descriptor is registered under the given entity name.
    #[error("unknown entity: {name}")]
    UnknownEntity {
        /// The entity name that was looked up.
        name: String,
    },

    /// A field name does not exist on the descriptor.
    #[error("unknown field {field} on entity {entity}")]
    UnknownField {
        /// The entity the field was looked up on.
        entity: String,
        /// The offending field name.
        field: String,
    },

    /// A descriptor definition is internally inconsistent.
    #[error("invalid descriptor for {entity}: {message}")]
    InvalidDescriptor {
        /// The entity being defined.
        entity: String,
        /// Description of the inconsistency.
        message: String,
    },

    /// A primary key field has no value on an instance.
    #[error("primary key field {field} is not set on {entity}")]
    MissingKeyField {
        /// The entity of the instance.
        entity: String,
        /// The unset primary key field.
        field: String,
    },

    /// A descriptor file could not be parsed.
    #[error("descriptor parse error: {message}")]
    Parse {
        /// Description of the parse failure.
        message: String,
    },
}

impl SchemaError {
    /// Creates an unknown entity error.
    pub fn unknown_entity(name: impl Into<String>) -> Self {
        Self::UnknownEntity { name: name.into() }
    }

    /// Creates an unknown field error.
    pub fn unknown_field(entity: impl Into<String>, field: impl Into<String>) -> Self {
        Self::UnknownField {
            entity: entity.into(),
            field: field.into(),
        }
    }

    /// Creates an invalid descriptor error.
    pub fn invalid_descriptor(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Creates a missing key field error.
    pub fn missing_key_field(entity: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingKeyField {
            entity: entity.into(),
            field: field.into(),
        }
    }

    /// Creates a descriptor parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }
}
