use thiserror::Error;

use crate::RecordId;

/// Errors returned by a resource gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No record with this id exists in the collection.
    #[error("Record {id} not found in collection '{collection}'")]
    NotFound { collection: String, id: RecordId },

    /// A record with the same natural key already exists.
    #[error("Record with key '{key}' already exists in collection '{collection}'")]
    Conflict { collection: String, key: String },

    /// The request was rejected by the store as malformed.
    #[error("Invalid record: {0}")]
    Invalid(String),

    /// The store could not be reached or refused service temporarily.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GatewayError {
    /// Returns true if the same call may succeed when retried later.
    ///
    /// Constraint violations, missing records and malformed input never
    /// become valid on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Unavailable(_) => true,
            GatewayError::Database(err) => matches!(
                err,
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            ),
            GatewayError::NotFound { .. }
            | GatewayError::Conflict { .. }
            | GatewayError::Invalid(_)
            | GatewayError::Migration(_)
            | GatewayError::Serialization(_) => false,
        }
    }
}

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
