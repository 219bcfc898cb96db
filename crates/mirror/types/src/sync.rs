//! Sync progress and per-block failure bookkeeping.

use crate::hex::{HexError, parse_quantity, to_quantity};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Fixed identifier of the singleton sync-state document.
pub const SYNC_STATE_ID: &str = "last_synced_block";

/// Highest block number the mirror has fully ingested.
///
/// Moves forward monotonically, except when a reorg rollback resets it to the fork point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, derive_more::Constructor)]
pub struct SyncState {
    /// Last synced block number.
    pub last_synced_block: u64,
}

/// Error converting a stored document into a [`SyncState`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncStateError {
    /// The document carries an unexpected identifier.
    #[error("unexpected sync state id: {0}")]
    UnexpectedId(String),
    /// The stored block number is not a valid hex quantity.
    #[error(transparent)]
    Hex(#[from] HexError),
}

/// On-disk form of [`SyncState`]: a single record with a fixed id and the block number as
/// a canonical hex string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStateDocument {
    /// Always [`SYNC_STATE_ID`].
    #[serde(rename = "_id")]
    pub id: String,
    /// Canonical hex quantity, `0x0` for genesis.
    pub block_number: String,
}

impl From<SyncState> for SyncStateDocument {
    fn from(state: SyncState) -> Self {
        Self { id: SYNC_STATE_ID.to_string(), block_number: to_quantity(state.last_synced_block) }
    }
}

impl TryFrom<SyncStateDocument> for SyncState {
    type Error = SyncStateError;

    fn try_from(doc: SyncStateDocument) -> Result<Self, Self::Error> {
        if doc.id != SYNC_STATE_ID {
            return Err(SyncStateError::UnexpectedId(doc.id));
        }
        Ok(Self::new(parse_quantity(&doc.block_number)?))
    }
}

/// Transient record of a block that could not be fetched or persisted.
///
/// Removed when the block is eventually ingested. Once `attempts` reaches the retry cap the
/// record is left in place and the block is no longer retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedBlockRecord {
    /// The failed block.
    pub block_number: u64,
    /// Number of failed attempts so far.
    pub attempts: u32,
    /// Error message of the most recent failure.
    pub last_error: String,
    /// When the most recent attempt failed.
    pub last_attempt: SystemTime,
}

impl FailedBlockRecord {
    /// Creates a record for a first failure.
    pub fn new(block_number: u64, error: impl ToString) -> Self {
        Self {
            block_number,
            attempts: 1,
            last_error: error.to_string(),
            last_attempt: SystemTime::now(),
        }
    }

    /// Records another failed attempt.
    pub fn record_failure(&mut self, error: impl ToString) {
        self.attempts = self.attempts.saturating_add(1);
        self.last_error = error.to_string();
        self.last_attempt = SystemTime::now();
    }

    /// Returns `true` once the retry cap has been reached.
    pub const fn is_exhausted(&self, max_attempts: u32) -> bool {
        self.attempts >= max_attempts
    }
}
