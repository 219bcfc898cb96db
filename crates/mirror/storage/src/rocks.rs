//! RocksDB-backed [`MirrorStore`](crate::MirrorStore) implementation.

use crate::{
    AccountStorage, ActivityStorage, BlockReader, BlockWriter, PendingStorage, SnapshotStorage,
    StorageError, StorageRewinder, SyncStateStorage,
};
use alloy_primitives::{B256, U256};
use parking_lot::Mutex;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch};
use serde::{Serialize, de::DeserializeOwned};
use std::{collections::HashSet, fmt, path::Path};
use zond_mirror_types::{
    Address, AddressRecord, AddressTransaction, Block, BlockRef, ChainStats, ContractRecord,
    InternalCall, OtsReuseEvent, PendingStatus, PendingTransaction, SYNC_STATE_ID, SyncState,
    SyncStateDocument, TokenBalance, TokenContract, TokenTransfer, ValidatorSnapshot,
};

/// Full blocks keyed by big-endian number.
pub const CF_BLOCKS: &str = "blocks";
/// Transaction hash to big-endian block number.
pub const CF_TX_INDEX: &str = "tx_index";
/// The singleton sync-state document.
pub const CF_SYNC_STATE: &str = "sync_state";
/// Address cache.
pub const CF_ADDRESSES: &str = "addresses";
/// Address-to-transaction index, keyed by block, tx hash, address and direction.
pub const CF_ADDRESS_TXS: &str = "address_txs";
/// Contract records keyed by address.
pub const CF_CONTRACTS: &str = "contracts";
/// One-time-signature pages keyed by address and page key.
pub const CF_OTS_PAGES: &str = "ots_pages";
/// Detected one-time-signature reuse, keyed by block and tx hash.
pub const CF_OTS_REUSE: &str = "ots_reuse";
/// Internal calls keyed by block, tx hash and call position.
pub const CF_INTERNAL_CALLS: &str = "internal_calls";
/// Token transfers keyed by block and log index.
pub const CF_TOKEN_TRANSFERS: &str = "token_transfers";
/// Token metadata keyed by contract address.
pub const CF_TOKEN_CONTRACTS: &str = "token_contracts";
/// Holder balances keyed by contract and holder address.
pub const CF_TOKEN_BALANCES: &str = "token_balances";
/// Mempool entries keyed by hash.
pub const CF_PENDING: &str = "pending";
/// Validator and statistics snapshots.
pub const CF_SNAPSHOTS: &str = "snapshots";

const ALL_COLUMN_FAMILIES: [&str; 14] = [
    CF_BLOCKS,
    CF_TX_INDEX,
    CF_SYNC_STATE,
    CF_ADDRESSES,
    CF_ADDRESS_TXS,
    CF_CONTRACTS,
    CF_OTS_PAGES,
    CF_OTS_REUSE,
    CF_INTERNAL_CALLS,
    CF_TOKEN_TRANSFERS,
    CF_TOKEN_CONTRACTS,
    CF_TOKEN_BALANCES,
    CF_PENDING,
    CF_SNAPSHOTS,
];

/// Column families whose keys start with the big-endian block number.
const BLOCK_PREFIXED: [&str; 3] = [CF_ADDRESS_TXS, CF_INTERNAL_CALLS, CF_TOKEN_TRANSFERS];

const VALIDATORS_KEY: &[u8] = b"validators";
const CHAIN_STATS_KEY: &[u8] = b"chain_stats";

fn concat_key(parts: &[&[u8]]) -> Vec<u8> {
    parts.concat()
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    Ok(serde_json::to_vec(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Store backed by RocksDB.
///
/// Values are JSON encoded. Multi-key writes (batch inserts, rewinds) go through a single
/// [`WriteBatch`] while holding the write lock, so they apply atomically and never
/// interleave with each other.
pub struct RocksStore {
    db: DB,
    write_lock: Mutex<()>,
}

impl fmt::Debug for RocksStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RocksStore").field("path", &self.db.path()).finish()
    }
}

impl RocksStore {
    /// Opens or creates a store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        let descriptors = ALL_COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path.as_ref(), descriptors)?;
        info!(target: "mirror::storage", path = %path.as_ref().display(), "Opened RocksDB store");
        Ok(Self { db, write_lock: Mutex::new(()) })
    }

    fn cf(&self, name: &'static str) -> Result<&ColumnFamily, StorageError> {
        self.db.cf_handle(name).ok_or(StorageError::MissingColumnFamily(name))
    }

    fn get<T: DeserializeOwned>(&self, cf: &'static str, key: &[u8]) -> Result<Option<T>, StorageError> {
        self.db.get_cf(self.cf(cf)?, key)?.map(|bytes| decode(&bytes)).transpose()
    }

    fn put<T: Serialize>(&self, cf: &'static str, key: &[u8], value: &T) -> Result<(), StorageError> {
        Ok(self.db.put_cf(self.cf(cf)?, key, encode(value)?)?)
    }

    fn count(&self, cf: &'static str) -> Result<u64, StorageError> {
        let mut count = 0;
        for item in self.db.iterator_cf(self.cf(cf)?, IteratorMode::Start) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    /// Decodes every value in `cf`.
    fn values<T: DeserializeOwned>(&self, cf: &'static str) -> Result<Vec<T>, StorageError> {
        self.db
            .iterator_cf(self.cf(cf)?, IteratorMode::Start)
            .map(|item| decode(&item?.1))
            .collect()
    }

    /// Decodes every value whose key starts with `prefix`.
    fn values_with_prefix<T: DeserializeOwned>(
        &self,
        cf: &'static str,
        prefix: &[u8],
    ) -> Result<Vec<T>, StorageError> {
        let mut out = Vec::new();
        for item in self.db.iterator_cf(self.cf(cf)?, IteratorMode::From(prefix, Direction::Forward)) {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push(decode(&value)?);
        }
        Ok(out)
    }

    /// Adds a delete for every record in `cf` that `stale` selects.
    fn delete_where<T: DeserializeOwned>(
        &self,
        batch: &mut WriteBatch,
        cf: &'static str,
        stale: impl Fn(&T) -> bool,
    ) -> Result<(), StorageError> {
        let handle = self.cf(cf)?;
        for item in self.db.iterator_cf(handle, IteratorMode::Start) {
            let (key, value) = item?;
            if stale(&decode(&value)?) {
                batch.delete_cf(handle, key);
            }
        }
        Ok(())
    }

    /// Adds a delete for every key in `cf` at or after `start`.
    fn delete_from(&self, batch: &mut WriteBatch, cf: &'static str, start: &[u8]) -> Result<(), StorageError> {
        let handle = self.cf(cf)?;
        for item in self.db.iterator_cf(handle, IteratorMode::From(start, Direction::Forward)) {
            let (key, _) = item?;
            batch.delete_cf(handle, key);
        }
        Ok(())
    }
}

impl BlockReader for RocksStore {
    fn block_exists(&self, number: u64) -> Result<bool, StorageError> {
        Ok(self.db.get_pinned_cf(self.cf(CF_BLOCKS)?, number.to_be_bytes())?.is_some())
    }

    fn block_ref(&self, number: u64) -> Result<Option<BlockRef>, StorageError> {
        Ok(self.block(number)?.as_ref().map(Block::block_ref))
    }

    fn block(&self, number: u64) -> Result<Option<Block>, StorageError> {
        self.get(CF_BLOCKS, &number.to_be_bytes())
    }

    fn latest_block(&self) -> Result<Option<BlockRef>, StorageError> {
        match self.db.iterator_cf(self.cf(CF_BLOCKS)?, IteratorMode::End).next() {
            Some(item) => Ok(Some(decode::<Block>(&item?.1)?.block_ref())),
            None => Ok(None),
        }
    }

    fn block_numbers_in_range(&self, from: u64, to: u64) -> Result<Vec<u64>, StorageError> {
        let mut numbers = Vec::new();
        if from > to {
            return Ok(numbers);
        }
        let start = from.to_be_bytes();
        let iter = self.db.iterator_cf(self.cf(CF_BLOCKS)?, IteratorMode::From(&start, Direction::Forward));
        for item in iter {
            let (key, _) = item?;
            let Ok(bytes) = <[u8; 8]>::try_from(key.as_ref()) else { continue };
            let number = u64::from_be_bytes(bytes);
            if number > to {
                break;
            }
            numbers.push(number);
        }
        Ok(numbers)
    }

    fn block_count(&self) -> Result<u64, StorageError> {
        self.count(CF_BLOCKS)
    }

    fn transaction_count(&self) -> Result<u64, StorageError> {
        self.count(CF_TX_INDEX)
    }

    fn transaction_exists(&self, hash: B256) -> Result<bool, StorageError> {
        Ok(self.db.get_pinned_cf(self.cf(CF_TX_INDEX)?, hash)?.is_some())
    }
}

impl BlockWriter for RocksStore {
    fn insert_blocks(&self, blocks: &[Block]) -> Result<Vec<u64>, StorageError> {
        let _guard = self.write_lock.lock();
        let blocks_cf = self.cf(CF_BLOCKS)?;
        let tx_cf = self.cf(CF_TX_INDEX)?;

        let mut batch = WriteBatch::default();
        let mut seen_numbers = HashSet::new();
        let mut seen_hashes = HashSet::new();
        let mut inserted = Vec::new();
        for block in blocks {
            if !seen_numbers.insert(block.number) || self.block_exists(block.number)? {
                continue;
            }
            for tx in &block.transactions {
                if !seen_hashes.insert(tx.hash) || self.transaction_exists(tx.hash)? {
                    return Err(StorageError::ConflictError(format!(
                        "transaction {} already stored in another block",
                        tx.hash
                    )));
                }
                batch.put_cf(tx_cf, tx.hash, block.number.to_be_bytes());
            }
            batch.put_cf(blocks_cf, block.number.to_be_bytes(), encode(block)?);
            inserted.push(block.number);
        }

        self.db.write(batch)?;
        Ok(inserted)
    }

    fn flush(&self) -> Result<(), StorageError> {
        Ok(self.db.flush()?)
    }
}

impl SyncStateStorage for RocksStore {
    fn sync_state(&self) -> Result<Option<SyncState>, StorageError> {
        self.get::<SyncStateDocument>(CF_SYNC_STATE, SYNC_STATE_ID.as_bytes())?
            .map(|doc| SyncState::try_from(doc).map_err(StorageError::from))
            .transpose()
    }

    fn save_sync_state(&self, state: SyncState) -> Result<(), StorageError> {
        self.put(CF_SYNC_STATE, SYNC_STATE_ID.as_bytes(), &SyncStateDocument::from(state))
    }
}

impl StorageRewinder for RocksStore {
    fn rewind_to(&self, fork_point: u64) -> Result<u64, StorageError> {
        let _guard = self.write_lock.lock();
        let mut batch = WriteBatch::default();
        let mut removed = 0;

        if let Some(start) = fork_point.checked_add(1) {
            let start_key = start.to_be_bytes();
            let blocks_cf = self.cf(CF_BLOCKS)?;
            let tx_cf = self.cf(CF_TX_INDEX)?;
            for item in self.db.iterator_cf(blocks_cf, IteratorMode::From(&start_key, Direction::Forward)) {
                let (key, value) = item?;
                let block: Block = decode(&value)?;
                for tx in &block.transactions {
                    batch.delete_cf(tx_cf, tx.hash);
                }
                batch.delete_cf(blocks_cf, key);
                removed += 1;
            }

            for cf in BLOCK_PREFIXED {
                self.delete_from(&mut batch, cf, &start_key)?;
            }

            self.delete_where(&mut batch, CF_CONTRACTS, |c: &ContractRecord| {
                c.block_number > fork_point
            })?;
            self.delete_where(&mut batch, CF_TOKEN_CONTRACTS, |t: &TokenContract| {
                t.first_seen_block > fork_point
            })?;
            self.delete_where(&mut batch, CF_TOKEN_BALANCES, |b: &TokenBalance| {
                b.block_number > fork_point
            })?;
        }

        batch.put_cf(
            self.cf(CF_SYNC_STATE)?,
            SYNC_STATE_ID.as_bytes(),
            encode(&SyncStateDocument::from(SyncState::new(fork_point)))?,
        );
        self.db.write(batch)?;
        debug!(target: "mirror::storage", fork_point, removed, "Rewound store");
        Ok(removed)
    }
}

impl AccountStorage for RocksStore {
    fn address(&self, address: &Address) -> Result<Option<AddressRecord>, StorageError> {
        self.get(CF_ADDRESSES, address.0.as_slice())
    }

    fn upsert_address(&self, record: AddressRecord) -> Result<(), StorageError> {
        self.put(CF_ADDRESSES, record.id.0.as_slice(), &record)
    }

    fn address_count(&self) -> Result<u64, StorageError> {
        self.count(CF_ADDRESSES)
    }

    fn funded_address_count(&self) -> Result<u64, StorageError> {
        let records: Vec<AddressRecord> = self.values(CF_ADDRESSES)?;
        Ok(records.iter().filter(|r| r.balance > U256::ZERO).count() as u64)
    }

    fn circulating_supply(&self) -> Result<U256, StorageError> {
        let records: Vec<AddressRecord> = self.values(CF_ADDRESSES)?;
        Ok(records.iter().fold(U256::ZERO, |total, r| total.saturating_add(r.balance)))
    }

    fn insert_address_transactions(
        &self,
        entries: &[AddressTransaction],
    ) -> Result<(), StorageError> {
        let cf = self.cf(CF_ADDRESS_TXS)?;
        let mut batch = WriteBatch::default();
        for entry in entries {
            let key = concat_key(&[
                &entry.block_number.to_be_bytes(),
                entry.tx_hash.as_slice(),
                entry.address.0.as_slice(),
                &[u8::from(entry.outgoing)],
            ]);
            batch.put_cf(cf, key, encode(entry)?);
        }
        Ok(self.db.write(batch)?)
    }

    fn ots_page(&self, address: &Address, page_key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let key = concat_key(&[address.0.as_slice(), page_key]);
        Ok(self.db.get_cf(self.cf(CF_OTS_PAGES)?, key)?)
    }

    fn save_ots_page(
        &self,
        address: &Address,
        page_key: &[u8],
        bits: &[u8],
    ) -> Result<(), StorageError> {
        let key = concat_key(&[address.0.as_slice(), page_key]);
        Ok(self.db.put_cf(self.cf(CF_OTS_PAGES)?, key, bits)?)
    }

    fn record_ots_reuse(&self, event: OtsReuseEvent) -> Result<(), StorageError> {
        let key = concat_key(&[
            &event.block_number.to_be_bytes(),
            event.tx_hash.as_slice(),
            event.address.0.as_slice(),
        ]);
        self.put(CF_OTS_REUSE, &key, &event)
    }

    fn ots_reuse_events(&self) -> Result<Vec<OtsReuseEvent>, StorageError> {
        self.values(CF_OTS_REUSE)
    }
}

impl ActivityStorage for RocksStore {
    fn upsert_contract(&self, record: ContractRecord) -> Result<(), StorageError> {
        self.put(CF_CONTRACTS, record.address.0.as_slice(), &record)
    }

    fn contract(&self, address: &Address) -> Result<Option<ContractRecord>, StorageError> {
        self.get(CF_CONTRACTS, address.0.as_slice())
    }

    fn contract_count(&self) -> Result<u64, StorageError> {
        self.count(CF_CONTRACTS)
    }

    fn insert_internal_calls(&self, calls: &[InternalCall]) -> Result<(), StorageError> {
        let cf = self.cf(CF_INTERNAL_CALLS)?;
        let mut batch = WriteBatch::default();
        for (position, call) in calls.iter().enumerate() {
            let key = concat_key(&[
                &call.block_number.to_be_bytes(),
                call.tx_hash.as_slice(),
                &(position as u32).to_be_bytes(),
            ]);
            batch.put_cf(cf, key, encode(call)?);
        }
        Ok(self.db.write(batch)?)
    }

    fn internal_calls(&self, tx_hash: B256) -> Result<Vec<InternalCall>, StorageError> {
        let Some(number) = self.db.get_cf(self.cf(CF_TX_INDEX)?, tx_hash)? else {
            return Ok(Vec::new());
        };
        self.values_with_prefix(CF_INTERNAL_CALLS, &concat_key(&[number.as_slice(), tx_hash.as_slice()]))
    }

    fn insert_token_transfers(&self, transfers: &[TokenTransfer]) -> Result<(), StorageError> {
        let cf = self.cf(CF_TOKEN_TRANSFERS)?;
        let mut batch = WriteBatch::default();
        for transfer in transfers {
            let key =
                concat_key(&[&transfer.block_number.to_be_bytes(), &transfer.log_index.to_be_bytes()]);
            batch.put_cf(cf, key, encode(transfer)?);
        }
        Ok(self.db.write(batch)?)
    }

    fn token_transfers(&self, block_number: u64) -> Result<Vec<TokenTransfer>, StorageError> {
        self.values_with_prefix(CF_TOKEN_TRANSFERS, &block_number.to_be_bytes())
    }

    fn upsert_token_contract(&self, token: TokenContract) -> Result<(), StorageError> {
        self.put(CF_TOKEN_CONTRACTS, token.address.0.as_slice(), &token)
    }

    fn token_contract(&self, address: &Address) -> Result<Option<TokenContract>, StorageError> {
        self.get(CF_TOKEN_CONTRACTS, address.0.as_slice())
    }

    fn token_count(&self) -> Result<u64, StorageError> {
        self.count(CF_TOKEN_CONTRACTS)
    }

    fn upsert_token_balance(&self, balance: TokenBalance) -> Result<(), StorageError> {
        let key = concat_key(&[balance.contract.0.as_slice(), balance.holder.0.as_slice()]);
        self.put(CF_TOKEN_BALANCES, &key, &balance)
    }

    fn token_balance(
        &self,
        contract: &Address,
        holder: &Address,
    ) -> Result<Option<TokenBalance>, StorageError> {
        self.get(CF_TOKEN_BALANCES, &concat_key(&[contract.0.as_slice(), holder.0.as_slice()]))
    }

    fn token_holders(&self, contract: &Address) -> Result<Vec<TokenBalance>, StorageError> {
        self.values_with_prefix(CF_TOKEN_BALANCES, contract.0.as_slice())
    }
}

impl PendingStorage for RocksStore {
    fn upsert_pending(&self, tx: PendingTransaction) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock();
        let merged = match self.get::<PendingTransaction>(CF_PENDING, tx.hash.as_slice())? {
            Some(existing) => tx.merge_into(&existing),
            None => tx,
        };
        self.put(CF_PENDING, merged.hash.as_slice(), &merged)
    }

    fn pending(&self, hash: B256) -> Result<Option<PendingTransaction>, StorageError> {
        self.get(CF_PENDING, hash.as_slice())
    }

    fn pending_by_status(
        &self,
        status: PendingStatus,
    ) -> Result<Vec<PendingTransaction>, StorageError> {
        let all: Vec<PendingTransaction> = self.values(CF_PENDING)?;
        Ok(all.into_iter().filter(|p| p.status == status).collect())
    }

    fn delete_pending(&self, hashes: &[B256]) -> Result<u64, StorageError> {
        let _guard = self.write_lock.lock();
        let cf = self.cf(CF_PENDING)?;
        let mut batch = WriteBatch::default();
        let mut deleted = 0;
        for hash in hashes {
            if self.db.get_pinned_cf(cf, hash)?.is_some() {
                batch.delete_cf(cf, hash);
                deleted += 1;
            }
        }
        self.db.write(batch)?;
        Ok(deleted)
    }
}

impl SnapshotStorage for RocksStore {
    fn save_validators(&self, snapshot: ValidatorSnapshot) -> Result<(), StorageError> {
        self.put(CF_SNAPSHOTS, VALIDATORS_KEY, &snapshot)
    }

    fn validators(&self) -> Result<Option<ValidatorSnapshot>, StorageError> {
        self.get(CF_SNAPSHOTS, VALIDATORS_KEY)
    }

    fn save_chain_stats(&self, stats: ChainStats) -> Result<(), StorageError> {
        self.put(CF_SNAPSHOTS, CHAIN_STATS_KEY, &stats)
    }

    fn chain_stats(&self) -> Result<Option<ChainStats>, StorageError> {
        self.get(CF_SNAPSHOTS, CHAIN_STATS_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{chain, holding, token, transfer};
    use tempfile::TempDir;

    fn open() -> (TempDir, RocksStore) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_blocks_scan_in_numeric_order() {
        let (_dir, store) = open();
        let blocks = chain(250, 10);
        assert_eq!(store.insert_blocks(&blocks).unwrap(), (250..260).collect::<Vec<_>>());
        assert!(store.insert_blocks(&blocks).unwrap().is_empty());
        assert_eq!(store.block_numbers_in_range(255, 300).unwrap(), vec![255, 256, 257, 258, 259]);
        assert_eq!(store.latest_block().unwrap(), Some(blocks[9].block_ref()));
        assert_eq!(store.block(252).unwrap(), Some(blocks[2].clone()));
    }

    #[test]
    fn test_sync_state_document_persisted() {
        let (dir, store) = open();
        assert_eq!(store.sync_state().unwrap(), None);
        store.save_sync_state(SyncState::new(80)).unwrap();
        store.flush().unwrap();
        drop(store);

        let reopened = RocksStore::open(dir.path()).unwrap();
        assert_eq!(reopened.sync_state().unwrap(), Some(SyncState::new(80)));
        let raw = reopened
            .db
            .get_cf(reopened.cf(CF_SYNC_STATE).unwrap(), SYNC_STATE_ID.as_bytes())
            .unwrap()
            .unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(doc, serde_json::json!({ "_id": "last_synced_block", "block_number": "0x50" }));
    }

    #[test]
    fn test_rewind_is_applied_as_one_batch() {
        let (_dir, store) = open();
        let blocks = chain(0, 10);
        store.insert_blocks(&blocks).unwrap();
        store.insert_token_transfers(&[transfer(3, 1), transfer(8, 0)]).unwrap();
        let contract = Address::new([0x10; 20]);
        let holder = Address::new([0xa1; 20]);
        store.upsert_token_contract(token(contract, 8)).unwrap();
        store.upsert_token_balance(holding(contract, holder, 3, 8)).unwrap();
        store.save_sync_state(SyncState::new(9)).unwrap();

        assert_eq!(store.rewind_to(7).unwrap(), 2);
        assert_eq!(store.token_count().unwrap(), 0);
        assert!(store.token_holders(&contract).unwrap().is_empty());
        assert_eq!(store.block_count().unwrap(), 8);
        assert_eq!(store.transaction_count().unwrap(), 8);
        assert_eq!(store.sync_state().unwrap(), Some(SyncState::new(7)));
        assert_eq!(store.token_transfers(3).unwrap().len(), 1);
        assert!(store.token_transfers(8).unwrap().is_empty());
    }

    #[test]
    fn test_ots_pages() {
        let (_dir, store) = open();
        let addr = Address::new([4; 20]);
        assert_eq!(store.ots_page(&addr, &[1, 0]).unwrap(), None);
        store.save_ots_page(&addr, &[1, 0], &[0b1000_0001]).unwrap();
        assert_eq!(store.ots_page(&addr, &[1, 0]).unwrap(), Some(vec![0b1000_0001]));
        assert_eq!(store.ots_page(&addr, &[1, 1]).unwrap(), None);
    }

    #[test]
    fn test_token_holders_are_grouped_by_contract() {
        let (_dir, store) = open();
        let (first, second) = (Address::new([0x10; 20]), Address::new([0x11; 20]));
        let (alice, bob) = (Address::new([0xa1; 20]), Address::new([0xb0; 20]));
        store.upsert_token_balance(holding(first, alice, 5, 1)).unwrap();
        store.upsert_token_balance(holding(first, bob, 7, 1)).unwrap();
        store.upsert_token_balance(holding(second, alice, 9, 1)).unwrap();
        store.upsert_token_balance(holding(first, alice, 6, 2)).unwrap();

        let holders = store.token_holders(&first).unwrap();
        assert_eq!(holders, vec![holding(first, alice, 6, 2), holding(first, bob, 7, 1)]);
        assert_eq!(store.token_balance(&second, &alice).unwrap(), Some(holding(second, alice, 9, 1)));
    }
}
