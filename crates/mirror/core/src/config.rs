//! Tunables for the sync engine and its periodic loops.
//!
//! A [`MirrorConfig`] is built once at startup and handed to every component.

use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default)]
pub struct MirrorConfig {
    /// Producer settings.
    pub fetch: FetchConfig,
    /// Orchestrator settings.
    pub sync: SyncConfig,
    /// Reorg handling settings.
    pub reorg: ReorgConfig,
    /// Gap detection settings.
    pub gaps: GapConfig,
    /// Mempool tracking settings.
    pub pending: PendingConfig,
    /// Loop intervals.
    pub schedule: Schedule,
    /// Fault boundary settings for periodic loops.
    pub supervisor: SupervisorConfig,
}

/// Settings for the block producer.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Maximum number of producers running at once.
    pub max_concurrency: usize,
    /// Attempts per block before it is recorded as failed.
    pub max_attempts: u32,
    /// Delay before the first retry. Later retries double it.
    pub retry_backoff: Duration,
    /// Pause between block requests during batch catch-up.
    pub bulk_delay: Duration,
    /// Pause between block requests during steady-state polling.
    pub steady_delay: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            max_attempts: 3,
            retry_backoff: Duration::from_millis(100),
            bulk_delay: Duration::from_millis(5),
            steady_delay: Duration::from_millis(50),
        }
    }
}

/// Settings for the sync orchestrator.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Lag above which batch catch-up is used instead of incremental sync.
    pub batch_threshold: u64,
    /// Blocks per producer during batch catch-up.
    pub batch_size: u64,
    /// Blocks per producer when the lag exceeds `large_sync_threshold`.
    pub large_batch_size: u64,
    /// Lag above which `large_batch_size` is used.
    pub large_sync_threshold: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { batch_threshold: 64, batch_size: 64, large_batch_size: 128, large_sync_threshold: 1000 }
    }
}

/// Settings for reorg detection and rollback.
#[derive(Debug, Clone)]
pub struct ReorgConfig {
    /// Times a mismatching candidate is refetched before a reorg is assumed.
    pub candidate_retries: u32,
    /// Pause between candidate refetches.
    pub candidate_retry_delay: Duration,
    /// How far below the tip the fork point search goes.
    pub max_depth: u64,
    /// Pause after a reorg deeper than `max_depth` before rolling back.
    pub deep_reorg_pause: Duration,
}

impl Default for ReorgConfig {
    fn default() -> Self {
        Self {
            candidate_retries: 3,
            candidate_retry_delay: Duration::from_millis(500),
            max_depth: 50,
            deep_reorg_pause: Duration::from_secs(60),
        }
    }
}

/// Settings for gap detection and backfill.
#[derive(Debug, Clone)]
pub struct GapConfig {
    /// Number of most recent blocks scanned for gaps.
    pub window: u64,
    /// Failed attempts after which a block is no longer backfilled automatically.
    pub max_attempts: u32,
}

impl Default for GapConfig {
    fn default() -> Self {
        Self { window: 1000, max_attempts: 3 }
    }
}

/// Settings for mempool tracking.
#[derive(Debug, Clone)]
pub struct PendingConfig {
    /// Age after which a pending entry is considered dropped, and after which settled
    /// entries are deleted.
    pub max_age: Duration,
}

impl Default for PendingConfig {
    fn default() -> Self {
        Self { max_age: Duration::from_secs(24 * 60 * 60) }
    }
}

/// Intervals of the periodic loops.
#[derive(Debug, Clone)]
pub struct Schedule {
    /// Block sync.
    pub block_sync: Duration,
    /// Gap detection.
    pub gap_detection: Duration,
    /// Delay before the first gap detection run.
    pub gap_detection_initial_delay: Duration,
    /// Validator snapshot refresh.
    pub validators: Duration,
    /// Chain statistics and market data refresh.
    pub stats: Duration,
    /// Mempool refresh.
    pub mempool: Duration,
    /// Expiry of stale mempool entries.
    pub pending_cleanup: Duration,
    /// Receipt checks for pending entries.
    pub pending_verification: Duration,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            block_sync: Duration::from_secs(30),
            gap_detection: Duration::from_secs(5 * 60),
            gap_detection_initial_delay: Duration::from_secs(60),
            validators: Duration::from_secs(6 * 60 * 60),
            stats: Duration::from_secs(30 * 60),
            mempool: Duration::from_secs(5),
            pending_cleanup: Duration::from_secs(60 * 60),
            pending_verification: Duration::from_secs(5 * 60),
        }
    }
}

/// Fault boundary settings for periodic loops.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Attempts per tick when the task returns an error.
    pub max_attempts: u32,
    /// Delay before the first in-tick retry. Later retries double it.
    pub retry_backoff: Duration,
    /// Restarts after a panic before the loop is abandoned.
    pub max_restarts: u32,
    /// Delay before the first restart. Later restarts double it.
    pub restart_backoff: Duration,
    /// Upper bound for the restart delay.
    pub max_restart_backoff: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_backoff: Duration::from_secs(1),
            max_restarts: 10,
            restart_backoff: Duration::from_secs(5),
            max_restart_backoff: Duration::from_secs(5 * 60),
        }
    }
}
