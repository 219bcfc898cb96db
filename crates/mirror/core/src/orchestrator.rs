//! The sync state machine.

use crate::{
    BlockBatch, BlockFetcher, FetchMode, GapDetector, GapReport, Ingestor, Metrics,
    ReorgHandler, ReorgOutcome, SyncConfig, SyncError,
};
use parking_lot::Mutex;
use std::{ops::Range, sync::Arc};
use zond_mirror_rpc::NodeClient;
use zond_mirror_storage::MirrorStore;

/// Mode the orchestrator is in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, derive_more::Display)]
pub enum SyncMode {
    /// Nothing persisted yet.
    #[default]
    Uninitialized,
    /// Far behind the node, fetching ranges concurrently.
    BatchCatchup,
    /// Close to the node, accepting blocks one at a time.
    Incremental,
    /// Caught up, waiting for the next tick.
    Idle,
}

/// Work selected for one sync pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncPlan {
    /// Nothing to do.
    Idle,
    /// Accept blocks `from..=to` one at a time.
    Incremental {
        /// First block to accept.
        from: u64,
        /// Last block to accept.
        to: u64,
    },
    /// Fetch the given half-open ranges concurrently.
    BatchCatchup {
        /// Disjoint, ascending ranges.
        ranges: Vec<Range<u64>>,
    },
}

/// Splits `[from, to]` into ascending half-open ranges of at most `size` blocks.
pub fn partition(from: u64, to: u64, size: u64) -> Vec<Range<u64>> {
    let size = size.max(1);
    let end = to.saturating_add(1);
    let mut ranges = Vec::new();
    let mut start = from;
    while start < end {
        let stop = start.saturating_add(size).min(end);
        ranges.push(start..stop);
        start = stop;
    }
    ranges
}

/// Outcome of one sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPassReport {
    /// Mode used for this pass.
    pub mode: SyncMode,
    /// Chain tip reported by the node.
    pub tip: u64,
    /// Last synced block after the pass.
    pub synced: u64,
    /// Blocks persisted or confirmed present.
    pub ingested: u64,
    /// Reorg handled during the pass.
    pub reorg: Option<ReorgOutcome>,
    /// Gap scan run after the pass.
    pub gaps: Option<GapReport>,
}

enum Step {
    Accepted,
    Skipped,
    RolledBack(ReorgOutcome),
}

/// Drives the mirror towards the node's chain tip.
#[derive(Debug)]
pub struct SyncOrchestrator<C, S> {
    client: Arc<C>,
    store: Arc<S>,
    fetcher: BlockFetcher<C, S>,
    ingestor: Ingestor<C, S>,
    gaps: Arc<GapDetector<C, S>>,
    reorg: ReorgHandler<C, S>,
    config: SyncConfig,
    mode: Mutex<SyncMode>,
}

impl<C, S> SyncOrchestrator<C, S>
where
    C: NodeClient + 'static,
    S: MirrorStore + 'static,
{
    /// Creates a new [`SyncOrchestrator`].
    pub fn new(
        client: Arc<C>,
        store: Arc<S>,
        fetcher: BlockFetcher<C, S>,
        ingestor: Ingestor<C, S>,
        gaps: Arc<GapDetector<C, S>>,
        reorg: ReorgHandler<C, S>,
        config: SyncConfig,
    ) -> Self {
        Self {
            client,
            store,
            fetcher,
            ingestor,
            gaps,
            reorg,
            config,
            mode: Mutex::new(SyncMode::Uninitialized),
        }
    }

    /// The current mode.
    pub fn mode(&self) -> SyncMode {
        *self.mode.lock()
    }

    fn set_mode(&self, mode: SyncMode) {
        let mut current = self.mode.lock();
        if *current != mode {
            debug!(target: "mirror::sync", from = %*current, to = %mode, "Sync mode changed");
            *current = mode;
        }
    }

    /// Chooses the work for a pass given the last synced block and the node's tip.
    pub fn plan(&self, last_synced: u64, tip: u64) -> SyncPlan {
        let lag = tip.saturating_sub(last_synced);
        if lag == 0 {
            return SyncPlan::Idle;
        }
        if lag <= self.config.batch_threshold {
            return SyncPlan::Incremental { from: last_synced + 1, to: tip };
        }

        let size = if lag > self.config.large_sync_threshold {
            self.config.large_batch_size
        } else {
            self.config.batch_size
        };
        SyncPlan::BatchCatchup { ranges: partition(last_synced + 1, tip, size) }
    }

    /// Persists genesis and an initial validator snapshot into an empty store.
    ///
    /// A store that has blocks but no sync state resumes from its highest block instead.
    pub async fn initialize(&self) -> Result<u64, SyncError> {
        self.set_mode(SyncMode::Uninitialized);
        if let Some(latest) = self.store.latest_block()? {
            info!(target: "mirror::sync", latest = latest.number, "Resuming from highest stored block");
            return Ok(self.ingestor.commit_sync_state(latest.number).await?);
        }

        info!(target: "mirror::sync", "Empty store, starting from genesis");
        let genesis = self.fetcher.fetch_block(0).await?;
        self.ingestor.ingest_batch(&BlockBatch::single(genesis)).await?;

        match self.client.validators().await {
            Ok(snapshot) => {
                if let Err(err) = self.store.save_validators(snapshot) {
                    warn!(target: "mirror::sync", %err, "Failed to persist initial validator snapshot");
                }
            }
            Err(err) => warn!(target: "mirror::sync", %err, "Failed to fetch initial validator snapshot"),
        }

        let synced = self.ingestor.commit_sync_state(0).await?;
        self.set_mode(SyncMode::Incremental);
        Ok(synced)
    }

    /// Runs one sync pass followed by a gap scan.
    pub async fn sync_once(&self) -> Result<SyncPassReport, SyncError> {
        let last_synced = match self.store.sync_state()? {
            Some(state) => state.last_synced_block,
            None => self.initialize().await?,
        };

        let tip = self.client.block_number().await?;
        metrics::gauge!(Metrics::CHAIN_TIP).set(tip as f64);

        let mut report = SyncPassReport { tip, ..Default::default() };
        match self.plan(last_synced, tip) {
            SyncPlan::Idle => {
                self.set_mode(SyncMode::Idle);
                report.mode = SyncMode::Idle;
                trace!(target: "mirror::sync", tip, "Mirror is at the chain tip");
            }
            SyncPlan::BatchCatchup { ranges } => {
                self.set_mode(SyncMode::BatchCatchup);
                report.mode = SyncMode::BatchCatchup;
                info!(
                    target: "mirror::sync",
                    from = last_synced + 1,
                    to = tip,
                    batches = ranges.len(),
                    "Starting batch catch-up"
                );
                let receivers = ranges
                    .into_iter()
                    .map(|range| self.fetcher.spawn_range(range, FetchMode::Bulk))
                    .collect();
                let ingest = self.ingestor.drain(receivers, last_synced + 1..=tip).await?;
                report.ingested = ingest.processed;
                self.set_mode(SyncMode::Incremental);
            }
            SyncPlan::Incremental { from, to } => {
                self.set_mode(SyncMode::Incremental);
                report.mode = SyncMode::Incremental;
                let mut skipped = Vec::new();
                for number in from..=to {
                    match self.advance(number).await? {
                        Step::Accepted => report.ingested += 1,
                        Step::Skipped => skipped.push(number),
                        Step::RolledBack(outcome) => {
                            report.reorg = Some(outcome);
                            break;
                        }
                    }
                }
                if !skipped.is_empty() {
                    match self.gaps.fill_gaps(&skipped).await {
                        Ok(filled) => report.ingested += filled,
                        Err(err) => warn!(target: "mirror::sync", %err, "Retrying skipped blocks failed"),
                    }
                }
            }
        }

        match self.gaps.run_once().await {
            Ok(gaps) => report.gaps = Some(gaps),
            Err(err) => warn!(target: "mirror::sync", %err, "Gap scan after sync pass failed"),
        }

        report.synced = self.store.sync_state()?.map_or(0, |state| state.last_synced_block);
        debug!(
            target: "mirror::sync",
            mode = %report.mode,
            tip,
            synced = report.synced,
            ingested = report.ingested,
            "Sync pass finished"
        );
        Ok(report)
    }

    /// Fetches block `number`, checks it extends the stored chain and persists it.
    ///
    /// A block that cannot be fetched is recorded as failed and skipped, and the sync state
    /// moves past it. Gap detection keeps retrying it until its attempts run out.
    async fn advance(&self, number: u64) -> Result<Step, SyncError> {
        if self.store.block_exists(number)? {
            trace!(target: "mirror::sync", block_number = number, "Block already stored");
            self.ingestor.commit_sync_state(number).await?;
            return Ok(Step::Accepted);
        }

        tokio::time::sleep(self.fetcher.delay(FetchMode::Steady)).await;
        let candidate = match self.fetcher.fetch_block(number).await {
            Ok(candidate) => candidate,
            Err(err) => {
                let attempts = self.fetcher.failed().record(number, &err);
                warn!(target: "mirror::sync", block_number = number, attempts, %err, "Skipping block that could not be fetched");
                self.ingestor.commit_sync_state(number).await?;
                return Ok(Step::Skipped);
            }
        };

        let parent_number = number.saturating_sub(1);
        let parent = match self.store.block_ref(parent_number)? {
            Some(parent) => Some(parent),
            None => {
                warn!(target: "mirror::sync", block_number = number, parent_number, "Parent block missing, backfilling");
                self.gaps.fill_gaps(&[parent_number]).await?;
                self.store.block_ref(parent_number)?
            }
        };

        let block = match parent {
            Some(parent) if candidate.parent_hash != parent.hash => {
                match self.reorg.handle_mismatch(number, &parent).await? {
                    ReorgOutcome::Transient(block) => block,
                    outcome => return Ok(Step::RolledBack(outcome)),
                }
            }
            Some(_) => candidate,
            None => {
                warn!(target: "mirror::sync", block_number = number, "Parent still missing, accepting block unchecked");
                candidate
            }
        };

        self.ingestor.ingest_batch(&BlockBatch::single(block)).await?;
        self.ingestor.commit_sync_state(number).await?;
        Ok(Step::Accepted)
    }
}
