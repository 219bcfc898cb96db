//! Transactions and their receipt-derived fields.

use crate::Address;
use alloy_primitives::{B256, Bytes, U256};
use serde::{Deserialize, Serialize};

/// Execution outcome of a transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Executed successfully.
    Success,
    /// Reverted.
    Failed,
    /// No receipt was available when the block was ingested.
    #[default]
    Unknown,
}

impl TransactionStatus {
    /// Maps a receipt status quantity (`1` success, `0` failure).
    pub const fn from_receipt_status(status: u64) -> Self {
        match status {
            1 => Self::Success,
            _ => Self::Failed,
        }
    }
}

/// An event log emitted by a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    /// Emitting contract.
    pub address: Address,
    /// Indexed topics.
    pub topics: Vec<B256>,
    /// Unindexed data.
    pub data: Bytes,
    /// Position of the log within the block.
    pub log_index: u64,
}

/// A transaction belonging to exactly one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Transaction hash.
    pub hash: B256,
    /// Number of the containing block.
    pub block_number: u64,
    /// Position within the block.
    pub transaction_index: u64,
    /// Sender.
    pub from: Address,
    /// Recipient, `None` for contract creations.
    #[serde(default)]
    pub to: Option<Address>,
    /// Sender nonce.
    pub nonce: u64,
    /// Transferred value.
    pub value: U256,
    /// Gas limit.
    pub gas: u64,
    /// Gas price or max fee, when reported.
    #[serde(default)]
    pub gas_price: Option<U256>,
    /// Call data.
    pub input: Bytes,
    /// Hash-based signature. Its leading bytes carry the one-time key index.
    pub signature: Bytes,
    /// Sender public key.
    pub public_key: Bytes,
    /// Envelope type.
    #[serde(rename = "type")]
    pub tx_type: u8,
    /// Receipt status.
    #[serde(default)]
    pub status: TransactionStatus,
    /// Address of the created contract, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<Address>,
    /// Gas used according to the receipt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_used: Option<u64>,
    /// Receipt logs.
    #[serde(default)]
    pub logs: Vec<Log>,
}

impl Transaction {
    /// Returns `true` if this transaction deploys a contract.
    pub const fn is_contract_creation(&self) -> bool {
        self.to.is_none()
    }

    /// Addresses whose cached balance is affected by this transaction.
    pub fn touched_addresses(&self) -> impl Iterator<Item = Address> + '_ {
        core::iter::once(self.from).chain(self.to).chain(self.contract_address)
    }
}
