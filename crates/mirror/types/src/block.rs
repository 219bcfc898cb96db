//! Blocks as persisted in the mirror.

use crate::{Address, Transaction};
use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

/// A block and its full transaction list.
///
/// Persisted blocks form a chain: for every stored block `N > 0`,
/// `block(N).parent_hash == block(N - 1).hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Block height, the canonical ordering key.
    pub number: u64,
    /// Block hash.
    pub hash: B256,
    /// Hash of the parent block.
    pub parent_hash: B256,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
    /// Encoded size in bytes.
    pub size: u64,
    /// Gas used by all transactions.
    pub gas_used: u64,
    /// Block gas limit.
    pub gas_limit: u64,
    /// Base fee, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_fee_per_gas: Option<u64>,
    /// Fee recipient, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub miner: Option<Address>,
    /// Transactions in block order.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Returns the [`BlockRef`] identifying this block.
    pub const fn block_ref(&self) -> BlockRef {
        BlockRef {
            number: self.number,
            hash: self.hash,
            parent_hash: self.parent_hash,
            timestamp: self.timestamp,
        }
    }

    /// Returns `true` if `parent` is this block's direct ancestor.
    pub fn is_child_of(&self, parent: &BlockRef) -> bool {
        self.block_ref().is_child_of(parent)
    }
}

/// Header-level identity of a block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRef {
    /// Block height.
    pub number: u64,
    /// Block hash.
    pub hash: B256,
    /// Hash of the parent block.
    pub parent_hash: B256,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
}

impl BlockRef {
    /// Returns `true` if `parent` is the direct ancestor of this block.
    pub fn is_child_of(&self, parent: &Self) -> bool {
        self.number == parent.number.wrapping_add(1) && self.parent_hash == parent.hash
    }
}

impl core::fmt::Display for BlockRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{} ({})", self.number, self.hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_child_of() {
        let parent = BlockRef {
            number: 9,
            hash: B256::repeat_byte(0x11),
            parent_hash: B256::ZERO,
            timestamp: 0,
        };
        let child =
            BlockRef { number: 10, hash: B256::repeat_byte(2), parent_hash: parent.hash, timestamp: 1 };
        assert!(child.is_child_of(&parent));

        let orphan = BlockRef { parent_hash: B256::repeat_byte(9), ..child };
        assert!(!orphan.is_child_of(&parent));

        let skipped = BlockRef { number: 11, ..child };
        assert!(!skipped.is_child_of(&parent));
    }
}
