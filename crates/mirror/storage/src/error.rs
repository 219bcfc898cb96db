use thiserror::Error;
use zond_mirror_types::SyncStateError;

/// Errors that may occur while interacting with mirror storage.
///
/// This enum is used across all implementations of the storage traits.
#[derive(Debug, Error)]
pub enum StorageError {
    /// RocksDB error.
    #[cfg(feature = "rocksdb")]
    #[error("Database error")]
    Database(#[from] rocksdb::Error),

    /// A column family is missing from the opened database.
    #[error("Missing column family: {0}")]
    MissingColumnFamily(&'static str),

    /// A stored value could not be encoded or decoded.
    #[error("Serialization error")]
    Serialization(#[from] serde_json::Error),

    /// The persisted sync-state document is invalid.
    #[error("Invalid sync state")]
    SyncState(#[from] SyncStateError),

    /// The expected entry was not found in the database.
    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    /// Represents a conflict occurred while attempting to write to the database.
    #[error("Conflict error: {0}")]
    ConflictError(String),
}
