//! Metrics for the sync engine.

/// Container for metrics.
#[derive(Debug, Clone)]
pub(crate) struct Metrics;

impl Metrics {
    /// Identifier for the gauge that tracks the node's chain tip.
    pub(crate) const CHAIN_TIP: &'static str = "zond_mirror_chain_tip";
    /// Identifier for the gauge that tracks the last synced block.
    pub(crate) const LAST_SYNCED_BLOCK: &'static str = "zond_mirror_last_synced_block";
    /// Identifier for the counter of persisted blocks.
    pub(crate) const BLOCKS_INGESTED: &'static str = "zond_mirror_blocks_ingested_total";
    /// Identifier for the counter of blocks that exhausted their fetch attempts.
    pub(crate) const BLOCK_FETCH_FAILURES: &'static str = "zond_mirror_block_fetch_failures_total";
    /// Identifier for the counter of failed enrichment steps, labelled by step.
    pub(crate) const ENRICHMENT_ERRORS: &'static str = "zond_mirror_enrichment_errors_total";
    /// Identifier for the counter of filled gaps.
    pub(crate) const GAPS_FILLED: &'static str = "zond_mirror_gaps_filled_total";
    /// Identifier for the gauge of gaps found by the last scan.
    pub(crate) const GAPS_DETECTED: &'static str = "zond_mirror_gaps_detected";
    /// Identifier for the counter of handled reorgs.
    pub(crate) const REORGS: &'static str = "zond_mirror_reorgs_total";
    /// Identifier for the histogram of reorg depths.
    pub(crate) const REORG_DEPTH: &'static str = "zond_mirror_reorg_depth";
    /// Identifier for the counter of detected token contracts.
    pub(crate) const TOKENS_DETECTED: &'static str = "zond_mirror_tokens_detected_total";
    /// Identifier for the counter of one-time-signature key reuses.
    pub(crate) const OTS_REUSE: &'static str = "zond_mirror_ots_reuse_total";
    /// Identifier for the gauge of tracked mempool entries.
    pub(crate) const PENDING_TRANSACTIONS: &'static str = "zond_mirror_pending_transactions";
    /// Identifier for the counter of periodic task failures, labelled by task.
    pub(crate) const TASK_FAILURES: &'static str = "zond_mirror_task_failures_total";
    /// Identifier for the counter of periodic task restarts, labelled by task.
    pub(crate) const TASK_RESTARTS: &'static str = "zond_mirror_task_restarts_total";

    /// Initializes metrics for the sync engine.
    ///
    /// This does two things:
    /// * Describes various metrics.
    /// * Initializes metrics to 0 so they can be queried immediately.
    pub(crate) fn init() {
        Self::describe();
        Self::zero();
    }

    /// Describes metrics used in the sync engine.
    fn describe() {
        metrics::describe_gauge!(Self::CHAIN_TIP, "Latest block number reported by the node");
        metrics::describe_gauge!(Self::LAST_SYNCED_BLOCK, "Highest block recorded as synced");
        metrics::describe_counter!(
            Self::BLOCKS_INGESTED,
            metrics::Unit::Count,
            "Blocks persisted by the mirror"
        );
        metrics::describe_counter!(
            Self::BLOCK_FETCH_FAILURES,
            metrics::Unit::Count,
            "Blocks that could not be fetched after all attempts"
        );
        metrics::describe_counter!(
            Self::ENRICHMENT_ERRORS,
            metrics::Unit::Count,
            "Failed enrichment steps by step"
        );
        metrics::describe_counter!(Self::GAPS_FILLED, metrics::Unit::Count, "Backfilled blocks");
        metrics::describe_gauge!(Self::GAPS_DETECTED, "Missing blocks found by the last scan");
        metrics::describe_counter!(Self::REORGS, metrics::Unit::Count, "Handled chain reorgs");
        metrics::describe_histogram!(
            Self::REORG_DEPTH,
            metrics::Unit::Count,
            "Blocks removed per reorg"
        );
        metrics::describe_counter!(
            Self::TOKENS_DETECTED,
            metrics::Unit::Count,
            "Contracts detected as ERC-20 tokens"
        );
        metrics::describe_counter!(
            Self::OTS_REUSE,
            metrics::Unit::Count,
            "Observed one-time-signature key reuses"
        );
        metrics::describe_gauge!(Self::PENDING_TRANSACTIONS, "Tracked mempool transactions");
        metrics::describe_counter!(
            Self::TASK_FAILURES,
            metrics::Unit::Count,
            "Periodic task ticks that exhausted their retries"
        );
        metrics::describe_counter!(
            Self::TASK_RESTARTS,
            metrics::Unit::Count,
            "Periodic task restarts after a panic"
        );
    }

    /// Initializes metrics to `0` so they can be queried immediately by consumers of prometheus
    /// metrics.
    fn zero() {
        metrics::gauge!(Self::CHAIN_TIP).set(0);
        metrics::gauge!(Self::LAST_SYNCED_BLOCK).set(0);
        metrics::counter!(Self::BLOCKS_INGESTED).increment(0);
        metrics::counter!(Self::BLOCK_FETCH_FAILURES).increment(0);
        metrics::counter!(Self::GAPS_FILLED).increment(0);
        metrics::gauge!(Self::GAPS_DETECTED).set(0);
        metrics::counter!(Self::REORGS).increment(0);
        metrics::counter!(Self::TOKENS_DETECTED).increment(0);
        metrics::counter!(Self::OTS_REUSE).increment(0);
        metrics::gauge!(Self::PENDING_TRANSACTIONS).set(0);
    }
}
