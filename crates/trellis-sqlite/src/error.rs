//! Error types for SQLite storage

use thiserror::Error;
use trellis_core::StoreError;

/// SQLite storage error type
#[derive(Error, Debug)]
pub enum SqliteError {
    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Schema/migration error
    #[error("Schema error: {0}")]
    Schema(String),

    /// A stored value that does not map back onto an entity row
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Underlying rusqlite error
    #[error("SQLite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
}

/// Result type for SQLite operations
pub type SqliteResult<T> = Result<T, SqliteError>;

impl From<SqliteError> for StoreError {
    fn from(err: SqliteError) -> Self {
        match err {
            SqliteError::Connection(msg) => Self::Connection(msg),
            SqliteError::Schema(msg) => Self::Schema(msg),
            SqliteError::Serialization(msg) => Self::Serialization(msg),
            SqliteError::Rusqlite(rusqlite::Error::FromSqlConversionFailure(_, _, e)) => {
                Self::Serialization(e.to_string())
            }
            SqliteError::Rusqlite(e) => Self::Query(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rusqlite_errors_become_query_errors() {
        let err: StoreError = SqliteError::from(rusqlite::Error::QueryReturnedNoRows).into();
        assert!(matches!(err, StoreError::Query(_)));
    }

    #[test]
    fn test_schema_errors_keep_their_kind() {
        let err: StoreError = SqliteError::Schema("v1 failed".into()).into();
        assert_eq!(err, StoreError::Schema("v1 failed".into()));
    }
}
