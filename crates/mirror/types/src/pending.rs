//! Mempool entries tracked between blocks.

use crate::Address;
use alloy_primitives::{B256, Bytes, U256};
use serde::{Deserialize, Serialize};

/// Lifecycle of a mempool entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingStatus {
    /// Seen in the mempool and not yet included.
    #[default]
    Pending,
    /// Included in a block.
    Mined,
    /// Evicted or expired without inclusion.
    Dropped,
}

/// A transaction observed in the node's mempool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTransaction {
    /// Transaction hash.
    pub hash: B256,
    /// Sender.
    pub from: Address,
    /// Recipient.
    #[serde(default)]
    pub to: Option<Address>,
    /// Sender nonce.
    pub nonce: u64,
    /// Transferred value.
    pub value: U256,
    /// Gas limit.
    pub gas: u64,
    /// Gas price or max fee.
    #[serde(default)]
    pub gas_price: Option<U256>,
    /// Call data.
    pub input: Bytes,
    /// Current status.
    pub status: PendingStatus,
    /// Unix time the entry was first seen.
    pub first_seen: u64,
    /// Unix time the entry was last seen in the mempool or last changed status.
    pub last_seen: u64,
    /// Including block once mined.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
}

impl PendingStatus {
    const fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Dropped => 1,
            Self::Mined => 2,
        }
    }

    /// Returns `true` if `self` is a later lifecycle stage than `other`.
    pub const fn supersedes(self, other: Self) -> bool {
        self.rank() > other.rank()
    }
}

impl PendingTransaction {
    /// Merges a fresh observation into the stored entry.
    ///
    /// `first_seen` is kept from the stored entry and the status never moves back to an
    /// earlier lifecycle stage.
    pub fn merge_into(mut self, existing: &Self) -> Self {
        self.first_seen = self.first_seen.min(existing.first_seen);
        self.last_seen = self.last_seen.max(existing.last_seen);
        if existing.status.supersedes(self.status) {
            self.status = existing.status;
            self.block_number = existing.block_number;
        }
        self
    }

    /// Marks the entry as included in `block_number`.
    pub const fn mark_mined(&mut self, block_number: u64, now: u64) {
        self.status = PendingStatus::Mined;
        self.block_number = Some(block_number);
        self.last_seen = now;
    }

    /// Marks the entry as dropped from the mempool.
    pub const fn mark_dropped(&mut self, now: u64) {
        self.status = PendingStatus::Dropped;
        self.last_seen = now;
    }

    /// Seconds since the entry was first seen.
    pub const fn age(&self, now: u64) -> u64 {
        now.saturating_sub(self.first_seen)
    }
}
