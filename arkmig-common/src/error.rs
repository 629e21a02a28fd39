//! Common error types for arkmig

use thiserror::Error;

/// Common result type for arkmig operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the arkmig crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML document could not be parsed
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Regular expression failed to compile
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested table, field or key not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Metadata graph is inconsistent (e.g. key field owned by another table)
    #[error("Metadata error: {0}")]
    Metadata(String),

    /// Textual value could not be converted to the declared datatype
    #[error("Cannot convert '{value}' for field '{field}' to {datatype}: {reason}")]
    Conversion {
        field: String,
        value: String,
        datatype: String,
        reason: String,
    },

    /// Repository operation failed; carries table/operation context
    #[error("{context}: {source}")]
    Query {
        context: String,
        #[source]
        source: Box<Error>,
    },

    /// Invalid input or argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Wrap an error with repository context (table and operation name)
    pub fn query(table: &str, operation: &str, source: impl Into<Error>) -> Self {
        Error::Query {
            context: format!("{} failed for table '{}'", operation, table),
            source: Box::new(source.into()),
        }
    }
}
