//! Error types for treesql

use thiserror::Error;

/// Result type alias for treesql operations
pub type SqlResult<T> = Result<T, SqlError>;

/// Boxed backend error, kept exactly as the driver produced it.
pub type BackendError = Box<dyn std::error::Error + Send + Sync>;

/// Error types for compiling and executing request trees
#[derive(Debug, Error)]
pub enum SqlError {
    /// Malformed request tree (duplicate clause nodes, unknown fragments, bad identifiers).
    ///
    /// Raised while compiling, before anything reaches the backend.
    #[error("Syntax error: {0}")]
    Syntax(String),

    /// The backend rejected or failed to run the statement.
    #[error("Execution error: {0}")]
    Execution(#[source] BackendError),

    /// A suspending execution was cancelled at a suspension point.
    #[error("Execution cancelled")]
    Cancelled,

    /// Statement timeout error
    #[error("Statement timeout after {0:?}")]
    Timeout(std::time::Duration),

    /// A backend value could not be converted into a canonical scalar
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// No connection is registered under the requested scope name
    #[error("Connection error: {0}")]
    Connection(String),

    /// The engine does not serve this operation name
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),
}

impl SqlError {
    /// Create a syntax error
    pub fn syntax(message: impl Into<String>) -> Self {
        Self::Syntax(message.into())
    }

    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Wrap any backend error as an execution error.
    pub fn execution(err: impl Into<BackendError>) -> Self {
        Self::Execution(err.into())
    }

    /// Check if this is a syntax error
    pub fn is_syntax(&self) -> bool {
        matches!(self, Self::Syntax(_))
    }

    /// Check if this is a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if the backend refused or failed the statement (timeouts included)
    pub fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_) | Self::Timeout(_))
    }

    /// Returns the underlying driver error when the backend is PostgreSQL.
    pub fn as_db_error(&self) -> Option<&tokio_postgres::error::DbError> {
        match self {
            Self::Execution(err) => err
                .downcast_ref::<tokio_postgres::Error>()
                .and_then(tokio_postgres::Error::as_db_error),
            _ => None,
        }
    }
}

impl From<tokio_postgres::Error> for SqlError {
    fn from(err: tokio_postgres::Error) -> Self {
        Self::Execution(Box::new(err))
    }
}
