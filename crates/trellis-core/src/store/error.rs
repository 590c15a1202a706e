use thiserror::Error;

use crate::entities::EntityName;

/// Failures of the durable row store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Filter {filter} does not apply to {entity}")]
    UnsupportedFilter { entity: EntityName, filter: String },
}

pub type StoreResult<T> = Result<T, StoreError>;
