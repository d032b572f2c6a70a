//! Model-level validation errors.

use thiserror::Error;

/// Errors raised while constructing or validating model types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// A schema declared the same column name twice.
    #[error("duplicate column in schema: {name}")]
    DuplicateColumn {
        /// Name of the offending column.
        name: String,
    },

    /// A schema tried to declare the reserved feature id column.
    #[error("column name is reserved: {name}")]
    ReservedColumn {
        /// Name of the offending column.
        name: String,
    },

    /// A schema contained a column with an empty name.
    #[error("schema column names must not be empty")]
    EmptyColumnName,
}

impl ModelError {
    /// Builds a [`ModelError::DuplicateColumn`].
    pub fn duplicate_column(name: impl Into<String>) -> Self {
        Self::DuplicateColumn { name: name.into() }
    }

    /// Builds a [`ModelError::ReservedColumn`].
    pub fn reserved_column(name: impl Into<String>) -> Self {
        Self::ReservedColumn { name: name.into() }
    }
}

/// Convenience alias for model results.
pub type Result<T> = std::result::Result<T, ModelError>;
