// workflow-store-sqlite/src/error.rs
// ============================================================================
// Module: SQLite Store Errors
// Description: Internal error type mapped onto workflow-core's StoreError.
// Purpose: Keep rusqlite and serde_json error plumbing out of the
//          RunRepository trait boundary.
// Dependencies: thiserror, workflow-core::interfaces::StoreError
// ============================================================================

use thiserror::Error;
use workflow_core::interfaces::StoreError;

/// Internal failures of the `SQLite`-backed repository.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// The underlying database connection or statement failed.
    #[error("sqlite error: {0}")]
    Db(String),
    /// A stored row's JSON payload failed to deserialize.
    #[error("stored row is not valid json: {0}")]
    Serde(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(err: SqliteStoreError) -> Self {
        match err {
            SqliteStoreError::Db(message) => Self::Io(message),
            SqliteStoreError::Serde(message) => Self::Invalid(message),
        }
    }
}

impl From<rusqlite::Error> for SqliteStoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Db(err.to_string())
    }
}

impl From<serde_json::Error> for SqliteStoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde(err.to_string())
    }
}
