//! In-memory [`MirrorStore`](crate::MirrorStore) implementation.

use crate::{
    AccountStorage, ActivityStorage, BlockReader, BlockWriter, PendingStorage, SnapshotStorage,
    StorageError, StorageRewinder, SyncStateStorage,
};
use alloy_primitives::{B256, U256};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use zond_mirror_types::{
    Address, AddressRecord, AddressTransaction, Block, BlockRef, ChainStats, ContractRecord,
    InternalCall, OtsReuseEvent, PendingStatus, PendingTransaction, SyncState, TokenBalance,
    TokenContract, TokenTransfer, ValidatorSnapshot,
};

/// Identity of an address index entry.
type AddressTxKey = (Address, B256, bool);

const fn address_tx_key(entry: &AddressTransaction) -> AddressTxKey {
    (entry.address, entry.tx_hash, entry.outgoing)
}

#[derive(Debug, Default)]
struct Collections {
    blocks: BTreeMap<u64, Block>,
    tx_index: HashMap<B256, u64>,
    sync_state: Option<SyncState>,
    addresses: HashMap<Address, AddressRecord>,
    address_txs: Vec<AddressTransaction>,
    address_tx_keys: HashSet<AddressTxKey>,
    ots_pages: HashMap<(Address, Vec<u8>), Vec<u8>>,
    ots_reuse: Vec<OtsReuseEvent>,
    contracts: HashMap<Address, ContractRecord>,
    internal_calls: BTreeMap<(u64, B256), Vec<InternalCall>>,
    token_transfers: BTreeMap<(u64, u64), TokenTransfer>,
    token_contracts: HashMap<Address, TokenContract>,
    token_balances: BTreeMap<(Address, Address), TokenBalance>,
    pending: HashMap<B256, PendingTransaction>,
    validators: Option<ValidatorSnapshot>,
    stats: Option<ChainStats>,
}

/// Store backed by in-process maps behind a single [`RwLock`].
///
/// Every operation takes the lock once, so a rewind is observed atomically by readers.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<Collections>,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every persisted block number, ascending.
    pub fn block_numbers(&self) -> Vec<u64> {
        self.inner.read().blocks.keys().copied().collect()
    }

    /// Returns the index entries recorded for `address`.
    pub fn address_transactions(&self, address: &Address) -> Vec<AddressTransaction> {
        self.inner.read().address_txs.iter().filter(|e| e.address == *address).cloned().collect()
    }
}

impl BlockReader for InMemoryStore {
    fn block_exists(&self, number: u64) -> Result<bool, StorageError> {
        Ok(self.inner.read().blocks.contains_key(&number))
    }

    fn block_ref(&self, number: u64) -> Result<Option<BlockRef>, StorageError> {
        Ok(self.inner.read().blocks.get(&number).map(Block::block_ref))
    }

    fn block(&self, number: u64) -> Result<Option<Block>, StorageError> {
        Ok(self.inner.read().blocks.get(&number).cloned())
    }

    fn latest_block(&self) -> Result<Option<BlockRef>, StorageError> {
        Ok(self.inner.read().blocks.values().next_back().map(Block::block_ref))
    }

    fn block_numbers_in_range(&self, from: u64, to: u64) -> Result<Vec<u64>, StorageError> {
        if from > to {
            return Ok(Vec::new());
        }
        Ok(self.inner.read().blocks.range(from..=to).map(|(n, _)| *n).collect())
    }

    fn block_count(&self) -> Result<u64, StorageError> {
        Ok(self.inner.read().blocks.len() as u64)
    }

    fn transaction_count(&self) -> Result<u64, StorageError> {
        Ok(self.inner.read().tx_index.len() as u64)
    }

    fn transaction_exists(&self, hash: B256) -> Result<bool, StorageError> {
        Ok(self.inner.read().tx_index.contains_key(&hash))
    }
}

impl BlockWriter for InMemoryStore {
    fn insert_blocks(&self, blocks: &[Block]) -> Result<Vec<u64>, StorageError> {
        let mut inner = self.inner.write();

        // Validate the whole batch before touching any collection.
        let mut batch_hashes = HashSet::new();
        for block in blocks.iter().filter(|b| !inner.blocks.contains_key(&b.number)) {
            for tx in &block.transactions {
                let owner = inner.tx_index.get(&tx.hash).copied();
                if owner.is_some_and(|n| n != block.number) || !batch_hashes.insert(tx.hash) {
                    return Err(StorageError::ConflictError(format!(
                        "transaction {} already stored in another block",
                        tx.hash
                    )));
                }
            }
        }

        let mut inserted = Vec::new();
        for block in blocks {
            if inner.blocks.contains_key(&block.number) {
                continue;
            }
            for tx in &block.transactions {
                inner.tx_index.insert(tx.hash, block.number);
            }
            inner.blocks.insert(block.number, block.clone());
            inserted.push(block.number);
        }
        Ok(inserted)
    }
}

impl SyncStateStorage for InMemoryStore {
    fn sync_state(&self) -> Result<Option<SyncState>, StorageError> {
        Ok(self.inner.read().sync_state)
    }

    fn save_sync_state(&self, state: SyncState) -> Result<(), StorageError> {
        self.inner.write().sync_state = Some(state);
        Ok(())
    }
}

impl StorageRewinder for InMemoryStore {
    fn rewind_to(&self, fork_point: u64) -> Result<u64, StorageError> {
        let mut inner = self.inner.write();
        let Some(start) = fork_point.checked_add(1) else {
            inner.sync_state = Some(SyncState::new(fork_point));
            return Ok(0);
        };

        let removed = inner.blocks.split_off(&start);
        let removed_hashes: HashSet<B256> =
            removed.values().flat_map(|b| b.transactions.iter().map(|tx| tx.hash)).collect();

        let Collections { address_txs, address_tx_keys, .. } = &mut *inner;
        address_txs.retain(|e| {
            let keep = e.block_number <= fork_point;
            if !keep {
                address_tx_keys.remove(&address_tx_key(e));
            }
            keep
        });
        inner.tx_index.retain(|hash, _| !removed_hashes.contains(hash));
        inner.contracts.retain(|_, c| c.block_number <= fork_point);
        inner.internal_calls.retain(|(n, _), _| *n <= fork_point);
        inner.token_transfers.retain(|(n, _), _| *n <= fork_point);
        inner.token_contracts.retain(|_, t| t.first_seen_block <= fork_point);
        inner.token_balances.retain(|_, b| b.block_number <= fork_point);
        inner.sync_state = Some(SyncState::new(fork_point));

        debug!(target: "mirror::storage", fork_point, removed = removed.len(), "Rewound store");
        Ok(removed.len() as u64)
    }
}

impl AccountStorage for InMemoryStore {
    fn address(&self, address: &Address) -> Result<Option<AddressRecord>, StorageError> {
        Ok(self.inner.read().addresses.get(address).cloned())
    }

    fn upsert_address(&self, record: AddressRecord) -> Result<(), StorageError> {
        self.inner.write().addresses.insert(record.id, record);
        Ok(())
    }

    fn address_count(&self) -> Result<u64, StorageError> {
        Ok(self.inner.read().addresses.len() as u64)
    }

    fn funded_address_count(&self) -> Result<u64, StorageError> {
        Ok(self.inner.read().addresses.values().filter(|a| a.balance > U256::ZERO).count() as u64)
    }

    fn circulating_supply(&self) -> Result<U256, StorageError> {
        Ok(self
            .inner
            .read()
            .addresses
            .values()
            .fold(U256::ZERO, |total, a| total.saturating_add(a.balance)))
    }

    fn insert_address_transactions(
        &self,
        entries: &[AddressTransaction],
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        for entry in entries {
            if inner.address_tx_keys.insert(address_tx_key(entry)) {
                inner.address_txs.push(entry.clone());
            }
        }
        Ok(())
    }

    fn ots_page(&self, address: &Address, page_key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.inner.read().ots_pages.get(&(*address, page_key.to_vec())).cloned())
    }

    fn save_ots_page(
        &self,
        address: &Address,
        page_key: &[u8],
        bits: &[u8],
    ) -> Result<(), StorageError> {
        self.inner.write().ots_pages.insert((*address, page_key.to_vec()), bits.to_vec());
        Ok(())
    }

    fn record_ots_reuse(&self, event: OtsReuseEvent) -> Result<(), StorageError> {
        self.inner.write().ots_reuse.push(event);
        Ok(())
    }

    fn ots_reuse_events(&self) -> Result<Vec<OtsReuseEvent>, StorageError> {
        Ok(self.inner.read().ots_reuse.clone())
    }
}

impl ActivityStorage for InMemoryStore {
    fn upsert_contract(&self, record: ContractRecord) -> Result<(), StorageError> {
        self.inner.write().contracts.insert(record.address, record);
        Ok(())
    }

    fn contract(&self, address: &Address) -> Result<Option<ContractRecord>, StorageError> {
        Ok(self.inner.read().contracts.get(address).cloned())
    }

    fn contract_count(&self) -> Result<u64, StorageError> {
        Ok(self.inner.read().contracts.len() as u64)
    }

    fn insert_internal_calls(&self, calls: &[InternalCall]) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        let mut grouped: BTreeMap<(u64, B256), Vec<InternalCall>> = BTreeMap::new();
        for call in calls {
            grouped.entry((call.block_number, call.tx_hash)).or_default().push(call.clone());
        }
        inner.internal_calls.extend(grouped);
        Ok(())
    }

    fn internal_calls(&self, tx_hash: B256) -> Result<Vec<InternalCall>, StorageError> {
        let inner = self.inner.read();
        Ok(inner
            .internal_calls
            .iter()
            .filter(|((_, hash), _)| *hash == tx_hash)
            .flat_map(|(_, calls)| calls.iter().cloned())
            .collect())
    }

    fn insert_token_transfers(&self, transfers: &[TokenTransfer]) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        for transfer in transfers {
            inner
                .token_transfers
                .entry((transfer.block_number, transfer.log_index))
                .or_insert_with(|| transfer.clone());
        }
        Ok(())
    }

    fn token_transfers(&self, block_number: u64) -> Result<Vec<TokenTransfer>, StorageError> {
        let inner = self.inner.read();
        Ok(inner
            .token_transfers
            .range((block_number, 0)..=(block_number, u64::MAX))
            .map(|(_, t)| t.clone())
            .collect())
    }

    fn upsert_token_contract(&self, token: TokenContract) -> Result<(), StorageError> {
        self.inner.write().token_contracts.insert(token.address, token);
        Ok(())
    }

    fn token_contract(&self, address: &Address) -> Result<Option<TokenContract>, StorageError> {
        Ok(self.inner.read().token_contracts.get(address).cloned())
    }

    fn token_count(&self) -> Result<u64, StorageError> {
        Ok(self.inner.read().token_contracts.len() as u64)
    }

    fn upsert_token_balance(&self, balance: TokenBalance) -> Result<(), StorageError> {
        self.inner.write().token_balances.insert((balance.contract, balance.holder), balance);
        Ok(())
    }

    fn token_balance(
        &self,
        contract: &Address,
        holder: &Address,
    ) -> Result<Option<TokenBalance>, StorageError> {
        Ok(self.inner.read().token_balances.get(&(*contract, *holder)).cloned())
    }

    fn token_holders(&self, contract: &Address) -> Result<Vec<TokenBalance>, StorageError> {
        let inner = self.inner.read();
        Ok(inner
            .token_balances
            .range((*contract, Address::ZERO)..)
            .take_while(|((c, _), _)| c == contract)
            .map(|(_, b)| b.clone())
            .collect())
    }
}

impl PendingStorage for InMemoryStore {
    fn upsert_pending(&self, tx: PendingTransaction) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        let merged = match inner.pending.get(&tx.hash) {
            Some(existing) => tx.merge_into(existing),
            None => tx,
        };
        inner.pending.insert(merged.hash, merged);
        Ok(())
    }

    fn pending(&self, hash: B256) -> Result<Option<PendingTransaction>, StorageError> {
        Ok(self.inner.read().pending.get(&hash).cloned())
    }

    fn pending_by_status(
        &self,
        status: PendingStatus,
    ) -> Result<Vec<PendingTransaction>, StorageError> {
        Ok(self.inner.read().pending.values().filter(|p| p.status == status).cloned().collect())
    }

    fn delete_pending(&self, hashes: &[B256]) -> Result<u64, StorageError> {
        let mut inner = self.inner.write();
        Ok(hashes.iter().filter(|hash| inner.pending.remove(*hash).is_some()).count() as u64)
    }
}

impl SnapshotStorage for InMemoryStore {
    fn save_validators(&self, snapshot: ValidatorSnapshot) -> Result<(), StorageError> {
        self.inner.write().validators = Some(snapshot);
        Ok(())
    }

    fn validators(&self) -> Result<Option<ValidatorSnapshot>, StorageError> {
        Ok(self.inner.read().validators.clone())
    }

    fn save_chain_stats(&self, stats: ChainStats) -> Result<(), StorageError> {
        self.inner.write().stats = Some(stats);
        Ok(())
    }

    fn chain_stats(&self) -> Result<Option<ChainStats>, StorageError> {
        Ok(self.inner.read().stats.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{block, chain, holding, token, transfer};
    use rstest::rstest;

    #[rstest]
    #[case::fresh(&[0..3], vec![0, 1, 2])]
    #[case::overlapping(&[0..3, 0..5], vec![3, 4])]
    #[case::repeated(&[0..5, 0..5], vec![])]
    fn test_insert_blocks_returns_new_numbers(
        #[case] batches: &[core::ops::Range<usize>],
        #[case] last: Vec<u64>,
    ) {
        let store = InMemoryStore::new();
        let blocks = chain(0, 5);
        let mut inserted = Vec::new();
        for range in batches {
            inserted = store.insert_blocks(&blocks[range.clone()]).unwrap();
        }
        assert_eq!(inserted, last);
        assert_eq!(store.block_count().unwrap(), batches.iter().map(|r| r.end).max().unwrap() as u64);
    }

    #[test]
    fn test_insert_rejects_transaction_in_two_blocks() {
        let store = InMemoryStore::new();
        let first = block(1, B256::ZERO, 1);
        let mut second = block(2, first.hash, 1);
        second.transactions = first.transactions.clone();
        second.transactions[0].block_number = 2;

        store.insert_blocks(&[first]).unwrap();
        assert!(matches!(store.insert_blocks(&[second]), Err(StorageError::ConflictError(_))));
        assert_eq!(store.block_count().unwrap(), 1);
    }

    #[rstest]
    #[case::full(1, 7, vec![1, 2, 4, 5, 7])]
    #[case::inner(3, 4, vec![4])]
    #[case::inverted(7, 1, vec![])]
    fn test_block_numbers_in_range(#[case] from: u64, #[case] to: u64, #[case] expected: Vec<u64>) {
        let store = InMemoryStore::new();
        let blocks: Vec<_> =
            [1, 2, 4, 5, 7].into_iter().map(|n| block(n, B256::ZERO, 0)).collect();
        store.insert_blocks(&blocks).unwrap();
        assert_eq!(store.block_numbers_in_range(from, to).unwrap(), expected);
        assert_eq!(store.latest_block().unwrap().map(|b| b.number), Some(7));
    }

    #[test]
    fn test_address_index_ignores_duplicates() {
        let store = InMemoryStore::new();
        let address = Address::new([3; 20]);
        let entry = |tx: u8, outgoing| AddressTransaction {
            address,
            tx_hash: B256::repeat_byte(tx),
            block_number: u64::from(tx),
            timestamp: 0,
            outgoing,
        };

        store.insert_address_transactions(&[entry(1, true), entry(1, false)]).unwrap();
        store.insert_address_transactions(&[entry(1, true), entry(2, true)]).unwrap();
        assert_eq!(store.address_transactions(&address).len(), 3);

        store.insert_blocks(&chain(0, 3)).unwrap();
        store.rewind_to(1).unwrap();
        assert_eq!(store.address_transactions(&address).len(), 2);
        store.insert_address_transactions(&[entry(2, true)]).unwrap();
        assert_eq!(store.address_transactions(&address).len(), 3);
    }

    #[test]
    fn test_rewind_removes_blocks_and_derived_records() {
        let store = InMemoryStore::new();
        let blocks = chain(0, 10);
        store.insert_blocks(&blocks).unwrap();
        store.insert_token_transfers(&[transfer(5, 0), transfer(9, 0)]).unwrap();
        store.save_sync_state(SyncState::new(9)).unwrap();

        assert_eq!(store.rewind_to(6).unwrap(), 3);
        assert_eq!(store.block_numbers(), (0..=6).collect::<Vec<_>>());
        assert_eq!(store.sync_state().unwrap(), Some(SyncState::new(6)));
        assert_eq!(store.transaction_count().unwrap(), 7);
        assert!(!store.transaction_exists(blocks[8].transactions[0].hash).unwrap());
        assert_eq!(store.token_transfers(5).unwrap().len(), 1);
        assert!(store.token_transfers(9).unwrap().is_empty());
    }

    #[test]
    fn test_token_records_follow_rewind() {
        let store = InMemoryStore::new();
        store.insert_blocks(&chain(0, 10)).unwrap();
        let (old, new) = (Address::new([0x10; 20]), Address::new([0x20; 20]));
        let (alice, bob) = (Address::new([0xa1; 20]), Address::new([0xb0; 20]));
        store.upsert_token_contract(token(old, 2)).unwrap();
        store.upsert_token_contract(token(new, 8)).unwrap();
        store.upsert_token_balance(holding(old, alice, 5, 3)).unwrap();
        store.upsert_token_balance(holding(old, bob, 7, 9)).unwrap();
        store.upsert_token_balance(holding(new, alice, 1, 8)).unwrap();
        assert_eq!(store.token_count().unwrap(), 2);
        assert_eq!(store.token_holders(&old).unwrap().len(), 2);

        store.rewind_to(6).unwrap();
        assert_eq!(store.token_count().unwrap(), 1);
        assert!(store.token_contract(&new).unwrap().is_none());
        assert_eq!(store.token_holders(&old).unwrap(), vec![holding(old, alice, 5, 3)]);
        assert!(store.token_balance(&new, &alice).unwrap().is_none());
    }

    #[test]
    fn test_circulating_supply_sums_balances() {
        let store = InMemoryStore::new();
        for (tag, balance) in [(1u8, 40u64), (2, 0), (3, 2)] {
            store
                .upsert_address(AddressRecord {
                    id: Address::new([tag; 20]),
                    balance: U256::from(balance),
                    nonce: 0,
                    is_contract: false,
                })
                .unwrap();
        }
        assert_eq!(store.circulating_supply().unwrap(), U256::from(42));
        assert_eq!(store.funded_address_count().unwrap(), 2);
    }

    #[test]
    fn test_pending_lifecycle() {
        let store = InMemoryStore::new();
        let mut tx = crate::test_fixtures::pending(1, 100);
        store.upsert_pending(tx.clone()).unwrap();

        tx.mark_mined(3, 120);
        store.upsert_pending(tx.clone()).unwrap();
        store.upsert_pending(crate::test_fixtures::pending(1, 130)).unwrap();

        let stored = store.pending(tx.hash).unwrap().unwrap();
        assert_eq!(stored.status, PendingStatus::Mined);
        assert_eq!(stored.first_seen, 100);
        assert!(store.pending_by_status(PendingStatus::Pending).unwrap().is_empty());
        assert_eq!(store.delete_pending(&[tx.hash, B256::ZERO]).unwrap(), 1);
    }
}
