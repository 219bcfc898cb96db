#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

#[macro_use]
extern crate tracing;

mod config;
pub use config::{
    FetchConfig, GapConfig, MirrorConfig, PendingConfig, ReorgConfig, Schedule, SupervisorConfig,
    SyncConfig,
};

mod error;
pub use error::{EnrichError, FetchError, GapError, IngestError, ReorgError, SyncError, TaskError};

mod metrics;
pub(crate) use metrics::Metrics;

pub mod ots;
pub use ots::{BitStatus, OtsBitfield, OtsPage, PageKey, ots_key_index};

mod fetcher;
pub use fetcher::{BlockBatch, BlockFetcher, FailedBlocks, FetchMode};

mod tokens;
pub use tokens::{TokenMetadata, apply_transfers, balance_of};

mod enrich;
pub use enrich::{EnrichReport, Enricher};

mod ingest;
pub use ingest::{HighWaterMark, IngestReport, Ingestor, SyncLock};

mod gaps;
pub use gaps::{GapDetector, GapReport, missing_numbers};

mod reorg;
pub use reorg::{ReorgHandler, ReorgOutcome};

mod orchestrator;
pub use orchestrator::{SyncMode, SyncOrchestrator, SyncPassReport, SyncPlan, partition};

pub mod tasks;
pub use tasks::{PeriodicTask, TaskSchedule, TaskSupervisor};

mod service;
pub use service::MirrorService;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
