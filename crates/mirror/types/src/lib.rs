#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod hex;
pub use hex::HexError;

mod address;
pub use address::{Address, AddressParseError, AddressRecord, AddressTransaction};

mod block;
pub use block::{Block, BlockRef};

mod transaction;
pub use transaction::{Log, Transaction, TransactionStatus};

mod sync;
pub use sync::{FailedBlockRecord, SYNC_STATE_ID, SyncState, SyncStateDocument, SyncStateError};

mod records;
pub use records::{
    ContractRecord, InternalCall, OtsReuseEvent, TokenBalance, TokenContract, TokenTransfer,
};

mod pending;
pub use pending::{PendingStatus, PendingTransaction};

mod validator;
pub use validator::{SlotCommittee, Validator, ValidatorSnapshot};

mod stats;
pub use stats::{ChainStats, MarketData};

/// Returns the current unix time in seconds.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
