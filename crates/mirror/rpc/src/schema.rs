//! Wire schema of the node responses the mirror consumes.
//!
//! One struct per RPC payload. Quantities arrive as `0x`-prefixed hex and are decoded by
//! the alloy integer types, so a missing or unparseable required field fails at
//! deserialization time and surfaces as [`RpcError::Malformed`].

use crate::RpcError;
use alloy_primitives::{B256, Bytes, U64, U256, b256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use zond_mirror_types::{Address, Block, Log, Transaction, TransactionStatus};

/// `keccak256("Transfer(address,address,uint256)")`.
pub const TRANSFER_EVENT_TOPIC: B256 =
    b256!("ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef");

/// Response of `zond_getBlockByNumber` with full transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcBlock {
    /// Block height.
    pub number: U64,
    /// Block hash.
    pub hash: B256,
    /// Parent hash.
    pub parent_hash: B256,
    /// Timestamp.
    pub timestamp: U64,
    /// Encoded size.
    #[serde(default)]
    pub size: U64,
    /// Gas used.
    #[serde(default)]
    pub gas_used: U64,
    /// Gas limit.
    #[serde(default)]
    pub gas_limit: U64,
    /// Base fee.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_fee_per_gas: Option<U64>,
    /// Fee recipient.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub miner: Option<Address>,
    /// Full transaction objects.
    #[serde(default)]
    pub transactions: Vec<RpcTransaction>,
}

/// A transaction object as embedded in blocks and returned by the mempool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransaction {
    /// Transaction hash.
    pub hash: B256,
    /// Containing block, absent for pending transactions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<U64>,
    /// Index within the block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_index: Option<U64>,
    /// Sender.
    pub from: Address,
    /// Recipient.
    #[serde(default)]
    pub to: Option<Address>,
    /// Nonce.
    pub nonce: U64,
    /// Value.
    #[serde(default)]
    pub value: U256,
    /// Gas limit.
    #[serde(default)]
    pub gas: U64,
    /// Legacy gas price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<U256>,
    /// Dynamic-fee cap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<U256>,
    /// Call data.
    #[serde(default)]
    pub input: Bytes,
    /// Hash-based signature.
    #[serde(default)]
    pub signature: Bytes,
    /// Sender public key.
    #[serde(default)]
    pub public_key: Bytes,
    /// Envelope type.
    #[serde(rename = "type", default)]
    pub tx_type: U64,
}

/// Response of `zond_getTransactionReceipt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcReceipt {
    /// Transaction hash.
    pub transaction_hash: B256,
    /// Containing block.
    pub block_number: U64,
    /// `0x1` on success, `0x0` on revert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<U64>,
    /// Created contract.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<Address>,
    /// Gas used by this transaction.
    #[serde(default)]
    pub gas_used: U64,
    /// Emitted logs.
    #[serde(default)]
    pub logs: Vec<RpcLog>,
}

/// A log entry from a receipt or `zond_getLogs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLog {
    /// Emitting contract.
    pub address: Address,
    /// Topics.
    #[serde(default)]
    pub topics: Vec<B256>,
    /// Data.
    #[serde(default)]
    pub data: Bytes,
    /// Position in the block.
    #[serde(default)]
    pub log_index: U64,
    /// Emitting transaction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<B256>,
    /// Containing block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<U64>,
}

impl From<RpcLog> for Log {
    fn from(log: RpcLog) -> Self {
        Self {
            address: log.address,
            topics: log.topics,
            data: log.data,
            log_index: log.log_index.to::<u64>(),
        }
    }
}

/// Filter for `zond_getLogs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFilter {
    /// First block, inclusive.
    pub from_block: U64,
    /// Last block, inclusive.
    pub to_block: U64,
    /// Restrict to one emitting contract.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    /// Positional topic filters.
    #[serde(default)]
    pub topics: Vec<Option<B256>>,
}

impl LogFilter {
    /// Token `Transfer` events within a single block.
    pub fn transfers_in_block(number: u64) -> Self {
        Self {
            from_block: U64::from(number),
            to_block: U64::from(number),
            address: None,
            topics: vec![Some(TRANSFER_EVENT_TOPIC)],
        }
    }
}

/// Message of `zond_call`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRequest {
    /// Called contract.
    pub to: Address,
    /// ABI-encoded call data.
    pub data: Bytes,
}

/// Options for `debug_traceTransaction`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceOptions {
    /// Tracer name.
    pub tracer: String,
}

impl Default for TraceOptions {
    fn default() -> Self {
        Self { tracer: "callTracer".to_string() }
    }
}

/// A frame of the `callTracer` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFrame {
    /// Call kind.
    #[serde(rename = "type")]
    pub call_type: String,
    /// Caller.
    pub from: Address,
    /// Callee.
    #[serde(default)]
    pub to: Option<Address>,
    /// Value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
    /// Gas supplied.
    #[serde(default)]
    pub gas: U64,
    /// Gas used.
    #[serde(default)]
    pub gas_used: U64,
    /// Input.
    #[serde(default)]
    pub input: Bytes,
    /// Output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Bytes>,
    /// Error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Nested calls.
    #[serde(default)]
    pub calls: Vec<CallFrame>,
}

impl RpcBlock {
    /// Block height as a `u64`.
    pub fn number(&self) -> u64 {
        self.number.to::<u64>()
    }

    /// Converts the raw block into the canonical model, attaching receipt data.
    ///
    /// Transactions without a matching receipt keep [`TransactionStatus::Unknown`].
    /// Fails if a transaction claims a different block or if a hash appears twice.
    pub fn into_block(self, mut receipts: HashMap<B256, RpcReceipt>) -> Result<Block, RpcError> {
        let number = self.number();
        let mut transactions = Vec::with_capacity(self.transactions.len());
        for (position, tx) in self.transactions.into_iter().enumerate() {
            if let Some(claimed) = tx.block_number {
                if claimed.to::<u64>() != number {
                    return Err(RpcError::Malformed(format!(
                        "transaction {} claims block {claimed} inside block {number}",
                        tx.hash
                    )));
                }
            }
            if transactions.iter().any(|seen: &Transaction| seen.hash == tx.hash) {
                return Err(RpcError::Malformed(format!(
                    "duplicate transaction {} in block {number}",
                    tx.hash
                )));
            }
            let receipt = receipts.remove(&tx.hash);
            transactions.push(tx.into_transaction(number, position as u64, receipt));
        }

        Ok(Block {
            number,
            hash: self.hash,
            parent_hash: self.parent_hash,
            timestamp: self.timestamp.to::<u64>(),
            size: self.size.to::<u64>(),
            gas_used: self.gas_used.to::<u64>(),
            gas_limit: self.gas_limit.to::<u64>(),
            base_fee_per_gas: self.base_fee_per_gas.map(|fee| fee.to::<u64>()),
            miner: self.miner,
            transactions,
        })
    }
}

impl RpcTransaction {
    /// Converts into the canonical transaction, merging receipt fields when present.
    pub fn into_transaction(
        self,
        block_number: u64,
        position: u64,
        receipt: Option<RpcReceipt>,
    ) -> Transaction {
        let (status, contract_address, gas_used, logs) = match receipt {
            Some(receipt) => (
                receipt
                    .status
                    .map_or(TransactionStatus::Unknown, |s| {
                        TransactionStatus::from_receipt_status(s.to::<u64>())
                    }),
                receipt.contract_address,
                Some(receipt.gas_used.to::<u64>()),
                receipt.logs.into_iter().map(Log::from).collect(),
            ),
            None => (TransactionStatus::Unknown, None, None, Vec::new()),
        };

        Transaction {
            hash: self.hash,
            block_number,
            transaction_index: self.transaction_index.map_or(position, |i| i.to::<u64>()),
            from: self.from,
            to: self.to,
            nonce: self.nonce.to::<u64>(),
            value: self.value,
            gas: self.gas.to::<u64>(),
            gas_price: self.gas_price.or(self.max_fee_per_gas),
            input: self.input,
            signature: self.signature,
            public_key: self.public_key,
            tx_type: u8::try_from(self.tx_type.to::<u64>()).unwrap_or(u8::MAX),
            status,
            contract_address,
            gas_used,
            logs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK_JSON: &str = r#"{
        "number": "0x10",
        "hash": "0x1111111111111111111111111111111111111111111111111111111111111111",
        "parentHash": "0x2222222222222222222222222222222222222222222222222222222222222222",
        "timestamp": "0x6553f100",
        "size": "0x220",
        "gasUsed": "0x5208",
        "gasLimit": "0x1c9c380",
        "baseFeePerGas": "0x7",
        "miner": "Z2019ea08f4e24201b98f9154906da4b924a04892",
        "transactions": [{
            "hash": "0x3333333333333333333333333333333333333333333333333333333333333333",
            "blockNumber": "0x10",
            "transactionIndex": "0x0",
            "from": "Z20b82a3c2f3e5ba4d6e9a5e6de3d1ea4e3bd6f71",
            "to": "Z20fb08ff1f1376a14c055e9f56df80563e16722b",
            "nonce": "0x2",
            "value": "0xde0b6b3a7640000",
            "gas": "0x5208",
            "maxFeePerGas": "0x3b9aca00",
            "input": "0x",
            "signature": "0x0000000a0102",
            "publicKey": "0x0a0b",
            "type": "0x2"
        }]
    }"#;

    #[test]
    fn test_block_deserializes_and_converts() {
        let raw: RpcBlock = serde_json::from_str(BLOCK_JSON).unwrap();
        let tx_hash = raw.transactions[0].hash;
        let receipt = RpcReceipt {
            transaction_hash: tx_hash,
            block_number: U64::from(16),
            status: Some(U64::from(1)),
            contract_address: None,
            gas_used: U64::from(21_000),
            logs: vec![],
        };

        let block = raw.into_block(HashMap::from([(tx_hash, receipt)])).unwrap();
        assert_eq!(block.number, 16);
        assert_eq!(block.timestamp, 0x6553f100);
        assert_eq!(block.base_fee_per_gas, Some(7));
        assert_eq!(block.transactions.len(), 1);

        let tx = &block.transactions[0];
        assert_eq!(tx.nonce, 2);
        assert_eq!(tx.tx_type, 2);
        assert_eq!(tx.status, TransactionStatus::Success);
        assert_eq!(tx.gas_used, Some(21_000));
        assert_eq!(tx.gas_price, Some(U256::from(1_000_000_000u64)));
        assert!(!tx.is_contract_creation());
    }

    #[test]
    fn test_missing_receipt_leaves_status_unknown() {
        let raw: RpcBlock = serde_json::from_str(BLOCK_JSON).unwrap();
        let block = raw.into_block(HashMap::new()).unwrap();
        assert_eq!(block.transactions[0].status, TransactionStatus::Unknown);
    }

    #[test]
    fn test_rejects_transaction_from_other_block() {
        let mut raw: RpcBlock = serde_json::from_str(BLOCK_JSON).unwrap();
        raw.transactions[0].block_number = Some(U64::from(17));
        assert!(matches!(raw.into_block(HashMap::new()), Err(RpcError::Malformed(_))));
    }

    #[test]
    fn test_rejects_duplicate_transactions() {
        let mut raw: RpcBlock = serde_json::from_str(BLOCK_JSON).unwrap();
        let dup = raw.transactions[0].clone();
        raw.transactions.push(dup);
        assert!(matches!(raw.into_block(HashMap::new()), Err(RpcError::Malformed(_))));
    }

    #[test]
    fn test_missing_required_field_is_rejected() {
        let json = r#"{ "number": "0x1", "parentHash": "0x2222222222222222222222222222222222222222222222222222222222222222", "timestamp": "0x0" }"#;
        assert!(serde_json::from_str::<RpcBlock>(json).is_err());
    }

    #[test]
    fn test_call_frame_nested() {
        let json = r#"{
            "type": "CALL",
            "from": "Z20b82a3c2f3e5ba4d6e9a5e6de3d1ea4e3bd6f71",
            "to": "Z20fb08ff1f1376a14c055e9f56df80563e16722b",
            "value": "0x1",
            "gas": "0x100",
            "gasUsed": "0x80",
            "input": "0x",
            "calls": [{
                "type": "DELEGATECALL",
                "from": "Z20fb08ff1f1376a14c055e9f56df80563e16722b",
                "to": "Z2019ea08f4e24201b98f9154906da4b924a04892",
                "gas": "0x50",
                "gasUsed": "0x10",
                "input": "0x"
            }]
        }"#;
        let frame: CallFrame = serde_json::from_str(json).unwrap();
        assert_eq!(frame.calls.len(), 1);
        assert_eq!(frame.calls[0].call_type, "DELEGATECALL");
        assert_eq!(frame.calls[0].value, None);
    }
}
