//! Error types for pgcompose

use crate::transaction::{TransactionAction, TransactionState};
use thiserror::Error;

/// Result type alias for pgcompose operations
pub type SqlResult<T> = Result<T, SqlError>;

/// Error types for statement building, execution and transaction control
#[derive(Debug, Error)]
pub enum SqlError {
    /// Programmer mistake detected before any I/O
    #[error("Usage error: {0}")]
    Usage(String),

    /// Transaction control operation attempted outside the `pending` state
    #[error("transaction may not be {action} after being {state}")]
    State {
        action: TransactionAction,
        state: TransactionState,
    },

    /// Driver error, passed through unchanged
    #[error("Query error: {0}")]
    Query(#[from] tokio_postgres::Error),

    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Pool error
    #[cfg(feature = "pool")]
    #[error("Pool error: {0}")]
    Pool(String),

    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Value could not be encoded as a parameter
    #[error("Encode error: {0}")]
    Encode(String),
}

impl SqlError {
    /// Create a usage error
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    pub(crate) fn state(action: TransactionAction, state: TransactionState) -> Self {
        Self::State { action, state }
    }

    /// Check if this is a usage error
    pub fn is_usage_error(&self) -> bool {
        matches!(self, Self::Usage(_))
    }

    /// Check if this is a transaction state error
    pub fn is_state_error(&self) -> bool {
        matches!(self, Self::State { .. })
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// SQLSTATE code reported by the server, if this is a database error.
    pub fn db_code(&self) -> Option<&str> {
        match self {
            Self::Query(err) => err.as_db_error().map(|db| db.code().code()),
            _ => None,
        }
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for SqlError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}

impl From<serde_json::Error> for SqlError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encode(err.to_string())
    }
}
