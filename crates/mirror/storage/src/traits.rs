use crate::StorageError;
use alloy_primitives::{B256, U256};
use core::fmt::Debug;
use zond_mirror_types::{
    Address, AddressRecord, AddressTransaction, Block, BlockRef, ChainStats, ContractRecord,
    InternalCall, OtsReuseEvent, PendingStatus, PendingTransaction, SyncState, TokenBalance,
    TokenContract, TokenTransfer, ValidatorSnapshot,
};

/// Read access to persisted blocks.
///
/// Implementations are expected to provide thread-safe access to block data.
pub trait BlockReader {
    /// Returns `true` if a block with the given number is persisted.
    fn block_exists(&self, number: u64) -> Result<bool, StorageError>;

    /// Gets the [`BlockRef`] of the persisted block at `number`.
    ///
    /// # Returns
    /// * `Ok(Some(BlockRef))` if the block is stored.
    /// * `Ok(None)` if there is no block at that height.
    /// * `Err(StorageError)` if the lookup failed.
    fn block_ref(&self, number: u64) -> Result<Option<BlockRef>, StorageError>;

    /// Gets the full persisted block at `number`.
    fn block(&self, number: u64) -> Result<Option<Block>, StorageError>;

    /// Gets the [`BlockRef`] of the highest persisted block.
    fn latest_block(&self) -> Result<Option<BlockRef>, StorageError>;

    /// Returns the persisted block numbers in the inclusive range `[from, to]`, ascending.
    fn block_numbers_in_range(&self, from: u64, to: u64) -> Result<Vec<u64>, StorageError>;

    /// Returns the number of persisted blocks.
    fn block_count(&self) -> Result<u64, StorageError>;

    /// Returns the number of persisted transactions.
    fn transaction_count(&self) -> Result<u64, StorageError>;

    /// Returns `true` if a transaction with this hash is persisted.
    fn transaction_exists(&self, hash: B256) -> Result<bool, StorageError>;
}

/// Write access to persisted blocks.
pub trait BlockWriter {
    /// Persists a batch of blocks together with their transactions.
    ///
    /// Blocks are unique by number and transactions by hash. Blocks already present are
    /// skipped rather than overwritten, so re-inserting is a no-op.
    ///
    /// # Arguments
    /// * `blocks` - The blocks to persist.
    ///
    /// # Returns
    /// * `Ok(Vec<u64>)` the numbers of the blocks newly written, in batch order.
    /// * `Err(StorageError)` if the batch could not be written. Nothing from the batch is
    ///   persisted in that case.
    fn insert_blocks(&self, blocks: &[Block]) -> Result<Vec<u64>, StorageError>;

    /// Flushes buffered writes to durable storage.
    fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Access to the singleton sync-state document.
pub trait SyncStateStorage {
    /// Gets the persisted [`SyncState`], `None` on a fresh store.
    fn sync_state(&self) -> Result<Option<SyncState>, StorageError>;

    /// Upserts the sync-state document.
    fn save_sync_state(&self, state: SyncState) -> Result<(), StorageError>;
}

/// Rollback support for reorg recovery.
pub trait StorageRewinder {
    /// Deletes every block strictly after `fork_point`, along with the transactions and
    /// derived records that belong to them, and resets the sync state to `fork_point`.
    ///
    /// Token contracts first seen and holder balances last updated after `fork_point` are
    /// removed too. One-time-signature pages and reuse events are kept.
    ///
    /// The whole operation is applied atomically.
    ///
    /// # Returns
    /// * `Ok(u64)` the number of blocks removed.
    /// * `Err(StorageError)` if the rewind failed. The store is unchanged in that case.
    fn rewind_to(&self, fork_point: u64) -> Result<u64, StorageError>;
}

/// Cached per-address state and one-time-signature pages.
pub trait AccountStorage {
    /// Gets the cached record for `address`.
    fn address(&self, address: &Address) -> Result<Option<AddressRecord>, StorageError>;

    /// Upserts an address record.
    fn upsert_address(&self, record: AddressRecord) -> Result<(), StorageError>;

    /// Returns the number of cached addresses.
    fn address_count(&self) -> Result<u64, StorageError>;

    /// Returns the number of cached addresses with a non-zero balance.
    fn funded_address_count(&self) -> Result<u64, StorageError>;

    /// Returns the sum of every cached native balance.
    fn circulating_supply(&self) -> Result<U256, StorageError>;

    /// Persists address-to-transaction index entries.
    fn insert_address_transactions(
        &self,
        entries: &[AddressTransaction],
    ) -> Result<(), StorageError>;

    /// Gets a persisted one-time-signature bitfield page.
    fn ots_page(&self, address: &Address, page_key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// Upserts a one-time-signature bitfield page.
    fn save_ots_page(
        &self,
        address: &Address,
        page_key: &[u8],
        bits: &[u8],
    ) -> Result<(), StorageError>;

    /// Records a detected one-time-signature key reuse.
    fn record_ots_reuse(&self, event: OtsReuseEvent) -> Result<(), StorageError>;

    /// Returns the recorded reuse events, oldest first.
    fn ots_reuse_events(&self) -> Result<Vec<OtsReuseEvent>, StorageError>;
}

/// Records derived from executing transactions.
pub trait ActivityStorage {
    /// Upserts a contract record.
    fn upsert_contract(&self, record: ContractRecord) -> Result<(), StorageError>;

    /// Gets the contract record for `address`.
    fn contract(&self, address: &Address) -> Result<Option<ContractRecord>, StorageError>;

    /// Returns the number of known contracts.
    fn contract_count(&self) -> Result<u64, StorageError>;

    /// Persists internal calls.
    fn insert_internal_calls(&self, calls: &[InternalCall]) -> Result<(), StorageError>;

    /// Returns the internal calls recorded for a transaction.
    fn internal_calls(&self, tx_hash: B256) -> Result<Vec<InternalCall>, StorageError>;

    /// Persists token transfers. Duplicates by block and log index are ignored.
    fn insert_token_transfers(&self, transfers: &[TokenTransfer]) -> Result<(), StorageError>;

    /// Returns the token transfers recorded in a block.
    fn token_transfers(&self, block_number: u64) -> Result<Vec<TokenTransfer>, StorageError>;

    /// Upserts the metadata of a token contract.
    fn upsert_token_contract(&self, token: TokenContract) -> Result<(), StorageError>;

    /// Gets the token metadata stored for `address`.
    fn token_contract(&self, address: &Address) -> Result<Option<TokenContract>, StorageError>;

    /// Returns the number of known token contracts.
    fn token_count(&self) -> Result<u64, StorageError>;

    /// Upserts a holder balance, keyed by contract and holder.
    fn upsert_token_balance(&self, balance: TokenBalance) -> Result<(), StorageError>;

    /// Gets the stored balance of `holder` in `contract`.
    fn token_balance(
        &self,
        contract: &Address,
        holder: &Address,
    ) -> Result<Option<TokenBalance>, StorageError>;

    /// Returns every stored holder balance of `contract`.
    fn token_holders(&self, contract: &Address) -> Result<Vec<TokenBalance>, StorageError>;
}

/// Mempool entries.
pub trait PendingStorage {
    /// Upserts a pending transaction.
    ///
    /// An existing entry keeps its `first_seen` time and, unless the incoming status is
    /// more final, its status.
    fn upsert_pending(&self, tx: PendingTransaction) -> Result<(), StorageError>;

    /// Gets the pending entry for `hash`.
    fn pending(&self, hash: B256) -> Result<Option<PendingTransaction>, StorageError>;

    /// Returns all entries in the given status.
    fn pending_by_status(
        &self,
        status: PendingStatus,
    ) -> Result<Vec<PendingTransaction>, StorageError>;

    /// Deletes the given entries, returning how many existed.
    fn delete_pending(&self, hashes: &[B256]) -> Result<u64, StorageError>;
}

/// Periodically refreshed snapshots.
pub trait SnapshotStorage {
    /// Replaces the stored validator snapshot.
    fn save_validators(&self, snapshot: ValidatorSnapshot) -> Result<(), StorageError>;

    /// Gets the stored validator snapshot.
    fn validators(&self) -> Result<Option<ValidatorSnapshot>, StorageError>;

    /// Replaces the stored chain statistics.
    fn save_chain_stats(&self, stats: ChainStats) -> Result<(), StorageError>;

    /// Gets the stored chain statistics.
    fn chain_stats(&self) -> Result<Option<ChainStats>, StorageError>;
}

/// Every storage concern the mirror needs, behind one object-safe trait.
pub trait MirrorStore:
    BlockReader
    + BlockWriter
    + SyncStateStorage
    + StorageRewinder
    + AccountStorage
    + ActivityStorage
    + PendingStorage
    + SnapshotStorage
    + Debug
    + Send
    + Sync
{
}

impl<T> MirrorStore for T where
    T: BlockReader
        + BlockWriter
        + SyncStateStorage
        + StorageRewinder
        + AccountStorage
        + ActivityStorage
        + PendingStorage
        + SnapshotStorage
        + Debug
        + Send
        + Sync
{
}
