//! Auxiliary records derived from ingested transactions.

use crate::Address;
use alloy_primitives::{B256, Bytes, U256};
use serde::{Deserialize, Serialize};

/// A deployed contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractRecord {
    /// Contract address.
    pub address: Address,
    /// Deployer.
    pub creator: Address,
    /// Deployment transaction.
    pub creation_tx: B256,
    /// Block of deployment.
    pub block_number: u64,
    /// Size of the deployed runtime code in bytes.
    pub code_size: u64,
    /// Whether the deployment succeeded.
    pub success: bool,
}

/// A value-carrying or nested call observed while tracing a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalCall {
    /// Parent transaction.
    pub tx_hash: B256,
    /// Block of the parent transaction.
    pub block_number: u64,
    /// Call kind as reported by the tracer (`CALL`, `DELEGATECALL`, `CREATE`, ...).
    pub call_type: String,
    /// Caller.
    pub from: Address,
    /// Callee.
    #[serde(default)]
    pub to: Option<Address>,
    /// Transferred value.
    pub value: U256,
    /// Gas supplied.
    pub gas: u64,
    /// Gas consumed.
    pub gas_used: u64,
    /// Call data.
    pub input: Bytes,
    /// Return data.
    pub output: Bytes,
    /// Revert reason or tracer error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Position in the call tree, child indices from the root.
    pub trace_address: Vec<u32>,
    /// Block timestamp.
    pub timestamp: u64,
}

/// An ERC-20 style `Transfer` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTransfer {
    /// Token contract.
    pub contract: Address,
    /// Sender.
    pub from: Address,
    /// Recipient.
    pub to: Address,
    /// Raw token amount.
    pub amount: U256,
    /// Emitting transaction.
    pub tx_hash: B256,
    /// Block of the transaction.
    pub block_number: u64,
    /// Log position within the block.
    pub log_index: u64,
    /// Block timestamp.
    pub timestamp: u64,
}

/// A one-time-signature key index observed more than once for the same address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtsReuseEvent {
    /// Signing address.
    pub address: Address,
    /// Reused key index as a hex quantity.
    pub ots_index: String,
    /// Transaction that reused the index.
    pub tx_hash: B256,
    /// Block of the transaction.
    pub block_number: u64,
    /// Unix time of detection.
    pub detected_at: u64,
}

/// An ERC-20 token contract, detected from its first observed `Transfer` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenContract {
    /// Token contract.
    pub address: Address,
    /// Result of `name()`.
    pub name: String,
    /// Result of `symbol()`.
    pub symbol: String,
    /// Result of `decimals()`.
    pub decimals: u8,
    /// Result of `totalSupply()`, absent when the call failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_supply: Option<U256>,
    /// Block of the first transfer seen.
    pub first_seen_block: u64,
    /// Transaction of the first transfer seen.
    pub first_seen_tx: B256,
    /// Unix time of the last metadata read.
    pub updated_at: u64,
}

/// The balance of one holder in one token contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    /// Token contract.
    pub contract: Address,
    /// Holder.
    pub holder: Address,
    /// Raw token amount.
    pub balance: U256,
    /// Block of the transfer that triggered the update.
    pub block_number: u64,
    /// Unix time of the update.
    pub updated_at: u64,
}
