#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

#[macro_use]
extern crate tracing;

mod error;
pub use error::StorageError;

mod traits;
pub use traits::{
    AccountStorage, ActivityStorage, BlockReader, BlockWriter, MirrorStore, PendingStorage,
    SnapshotStorage, StorageRewinder, SyncStateStorage,
};

mod memory;
pub use memory::InMemoryStore;

#[cfg(feature = "rocksdb")]
mod rocks;
#[cfg(feature = "rocksdb")]
pub use rocks::RocksStore;

#[cfg(test)]
mod test_fixtures;
