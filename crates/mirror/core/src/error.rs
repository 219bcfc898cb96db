//! Error types for the sync engine.

use thiserror::Error;
use zond_mirror_rpc::RpcError;
use zond_mirror_storage::StorageError;

/// Errors raised while fetching a block from the node.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The node request failed.
    #[error(transparent)]
    Rpc(#[from] RpcError),
    /// The node does not have the block.
    #[error("block {0} is not available from the node")]
    Missing(u64),
}

impl FetchError {
    /// Returns `true` if another attempt may succeed.
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Rpc(err) => err.is_retryable(),
            Self::Missing(_) => true,
        }
    }
}

/// Errors raised while persisting fetched blocks.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The store rejected the write.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors raised by a single enrichment step.
#[derive(Debug, Error)]
pub enum EnrichError {
    /// The node request failed.
    #[error(transparent)]
    Rpc(#[from] RpcError),
    /// The store rejected the write.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors raised by gap detection and backfill.
#[derive(Debug, Error)]
pub enum GapError {
    /// Reading the stored block numbers failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Persisting a backfilled block failed.
    #[error(transparent)]
    Ingest(#[from] IngestError),
}

/// Errors raised while handling a reorg.
#[derive(Debug, Error)]
pub enum ReorgError {
    /// A node request failed during the fork point search.
    #[error(transparent)]
    Rpc(#[from] RpcError),
    /// Refetching the candidate block failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// Reading or rewinding the store failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors raised by a sync pass.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A node request failed.
    #[error(transparent)]
    Rpc(#[from] RpcError),
    /// Fetching a block failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// A store operation failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Persisting blocks failed.
    #[error(transparent)]
    Ingest(#[from] IngestError),
    /// Reorg handling failed.
    #[error(transparent)]
    Reorg(#[from] ReorgError),
    /// Backfilling a missing block failed.
    #[error(transparent)]
    Gap(#[from] GapError),
}

/// Error returned by a periodic task tick.
#[derive(Debug, Error)]
pub enum TaskError {
    /// A sync pass failed.
    #[error(transparent)]
    Sync(#[from] SyncError),
    /// A gap scan failed.
    #[error(transparent)]
    Gap(#[from] GapError),
    /// A node or API request failed.
    #[error(transparent)]
    Rpc(#[from] RpcError),
    /// A store operation failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}
