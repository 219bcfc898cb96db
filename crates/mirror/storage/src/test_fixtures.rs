//! Block and record builders shared by the store tests.

use alloy_primitives::{B256, Bytes, U256};
use zond_mirror_types::{
    Address, Block, PendingStatus, PendingTransaction, TokenBalance, TokenContract,
    TokenTransfer, Transaction, TransactionStatus,
};

fn hash_of(tag: u8, n: u64, i: u64) -> B256 {
    let mut bytes = [0u8; 32];
    bytes[0] = tag;
    bytes[8..16].copy_from_slice(&n.to_be_bytes());
    bytes[16..24].copy_from_slice(&i.to_be_bytes());
    B256::from(bytes)
}

pub(crate) fn block(number: u64, parent_hash: B256, tx_count: u64) -> Block {
    let transactions = (0..tx_count)
        .map(|i| Transaction {
            hash: hash_of(0xee, number, i),
            block_number: number,
            transaction_index: i,
            from: Address::new([1; 20]),
            to: Some(Address::new([2; 20])),
            nonce: number,
            value: U256::from(1),
            gas: 21_000,
            gas_price: None,
            input: Bytes::new(),
            signature: Bytes::new(),
            public_key: Bytes::new(),
            tx_type: 2,
            status: TransactionStatus::Success,
            contract_address: None,
            gas_used: Some(21_000),
            logs: Vec::new(),
        })
        .collect();
    Block {
        number,
        hash: hash_of(0xbb, number, 0),
        parent_hash,
        timestamp: 1_700_000_000 + number * 60,
        size: 512,
        gas_used: 21_000 * tx_count,
        gas_limit: 30_000_000,
        base_fee_per_gas: None,
        miner: None,
        transactions,
    }
}

/// A linked chain of `count` blocks starting at `start`, one transaction each.
pub(crate) fn chain(start: u64, count: u64) -> Vec<Block> {
    let mut parent = B256::ZERO;
    (start..start + count)
        .map(|n| {
            let b = block(n, parent, 1);
            parent = b.hash;
            b
        })
        .collect()
}

pub(crate) fn transfer(block_number: u64, log_index: u64) -> TokenTransfer {
    TokenTransfer {
        contract: Address::new([9; 20]),
        from: Address::new([1; 20]),
        to: Address::new([2; 20]),
        amount: U256::from(10),
        tx_hash: hash_of(0xee, block_number, 0),
        block_number,
        log_index,
        timestamp: 0,
    }
}

pub(crate) fn pending(tag: u8, now: u64) -> PendingTransaction {
    PendingTransaction {
        hash: B256::repeat_byte(tag),
        from: Address::new([1; 20]),
        to: None,
        nonce: 0,
        value: U256::ZERO,
        gas: 21_000,
        gas_price: None,
        input: Bytes::new(),
        status: PendingStatus::Pending,
        first_seen: now,
        last_seen: now,
        block_number: None,
    }
}

pub(crate) fn token(address: Address, first_seen_block: u64) -> TokenContract {
    TokenContract {
        address,
        name: "Quanta Test".to_string(),
        symbol: "QT".to_string(),
        decimals: 18,
        total_supply: Some(U256::from(1_000_000)),
        first_seen_block,
        first_seen_tx: hash_of(0xee, first_seen_block, 0),
        updated_at: 0,
    }
}

pub(crate) fn holding(contract: Address, holder: Address, balance: u64, block_number: u64) -> TokenBalance {
    TokenBalance { contract, holder, balance: U256::from(balance), block_number, updated_at: 0 }
}
