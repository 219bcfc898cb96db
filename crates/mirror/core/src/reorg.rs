//! Chain reorganization handling.

use crate::{BlockFetcher, Metrics, ReorgConfig, ReorgError, SyncLock};
use std::sync::Arc;
use zond_mirror_rpc::NodeClient;
use zond_mirror_storage::MirrorStore;
use zond_mirror_types::{Block, BlockRef};

/// How a parent hash mismatch was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReorgOutcome {
    /// A refetch returned a candidate that extends the stored tip after all.
    Transient(Block),
    /// The store was rolled back to the fork point.
    Rewound {
        /// Last block shared by the stored and canonical chains.
        fork_point: u64,
        /// Blocks removed.
        removed: u64,
    },
    /// No fork point was found within the search depth. The store was rolled back to a
    /// conservative point instead.
    DeepReorg {
        /// Block the store was rolled back to.
        resume_point: u64,
        /// Blocks removed.
        removed: u64,
    },
}

impl ReorgOutcome {
    /// Number the next sync pass resumes at, if the store was rolled back.
    pub const fn resume_from(&self) -> Option<u64> {
        match self {
            Self::Transient(_) => None,
            Self::Rewound { fork_point, .. } => Some(*fork_point + 1),
            Self::DeepReorg { resume_point, .. } => Some(*resume_point + 1),
        }
    }
}

/// Keeps the stored chain linked by parent hash when the node switches branches.
#[derive(Debug)]
pub struct ReorgHandler<C, S> {
    client: Arc<C>,
    store: Arc<S>,
    fetcher: BlockFetcher<C, S>,
    sync_lock: SyncLock,
    config: ReorgConfig,
}

impl<C, S> ReorgHandler<C, S>
where
    C: NodeClient + 'static,
    S: MirrorStore + 'static,
{
    /// Creates a new [`ReorgHandler`].
    pub const fn new(
        client: Arc<C>,
        store: Arc<S>,
        fetcher: BlockFetcher<C, S>,
        sync_lock: SyncLock,
        config: ReorgConfig,
    ) -> Self {
        Self { client, store, fetcher, sync_lock, config }
    }

    /// Handles a candidate block at `candidate_number` whose parent hash does not match the
    /// stored `tip`.
    ///
    /// The candidate is refetched a few times first, so an inconsistent node response is not
    /// mistaken for a reorg.
    pub async fn handle_mismatch(
        &self,
        candidate_number: u64,
        tip: &BlockRef,
    ) -> Result<ReorgOutcome, ReorgError> {
        for attempt in 1..=self.config.candidate_retries {
            tokio::time::sleep(self.config.candidate_retry_delay).await;
            let candidate = self.fetcher.fetch_block(candidate_number).await?;
            if candidate.parent_hash == tip.hash {
                debug!(
                    target: "mirror::reorg",
                    block_number = candidate_number,
                    attempt,
                    "Parent hash mismatch resolved on refetch"
                );
                return Ok(ReorgOutcome::Transient(candidate));
            }
        }

        warn!(
            target: "mirror::reorg",
            block_number = candidate_number,
            %tip,
            "Reorg detected, searching for fork point"
        );

        {
            let _guard = self.sync_lock.lock().await;
            if let Some(fork_point) = self.find_fork_point(tip.number).await? {
                let removed = self.store.rewind_to(fork_point)?;
                metrics::counter!(Metrics::REORGS, "kind" => "shallow").increment(1);
                metrics::histogram!(Metrics::REORG_DEPTH).record(removed as f64);
                metrics::gauge!(Metrics::LAST_SYNCED_BLOCK).set(fork_point as f64);
                info!(target: "mirror::reorg", fork_point, removed, "Rolled back to fork point");
                return Ok(ReorgOutcome::Rewound { fork_point, removed });
            }
        }

        error!(
            target: "mirror::reorg",
            %tip,
            max_depth = self.config.max_depth,
            pause = ?self.config.deep_reorg_pause,
            "No fork point within search depth, waiting for the network to settle"
        );
        tokio::time::sleep(self.config.deep_reorg_pause).await;

        let _guard = self.sync_lock.lock().await;
        let resume_point = tip.number.saturating_sub(self.config.max_depth);
        let removed = self.store.rewind_to(resume_point)?;
        metrics::counter!(Metrics::REORGS, "kind" => "deep").increment(1);
        metrics::histogram!(Metrics::REORG_DEPTH).record(removed as f64);
        metrics::gauge!(Metrics::LAST_SYNCED_BLOCK).set(resume_point as f64);
        warn!(target: "mirror::reorg", resume_point, removed, "Rolled back after deep reorg");
        Ok(ReorgOutcome::DeepReorg { resume_point, removed })
    }

    /// Walks back from `tip - 1` and returns the first stored block the node still agrees
    /// with.
    pub async fn find_fork_point(&self, tip: u64) -> Result<Option<u64>, ReorgError> {
        let floor = tip.saturating_sub(self.config.max_depth);
        for number in (floor..tip).rev() {
            let Some(stored) = self.store.block_ref(number)? else {
                trace!(target: "mirror::reorg", block_number = number, "Ancestor not stored, skipping");
                continue;
            };
            if self.is_block_canonical(number, &stored).await? {
                return Ok(Some(number));
            }
        }
        Ok(None)
    }

    /// Returns `true` if the node's block at `number` has the stored hash.
    async fn is_block_canonical(&self, number: u64, stored: &BlockRef) -> Result<bool, ReorgError> {
        let canonical = self.client.block_by_number(number).await?;
        Ok(canonical.is_some_and(|block| block.hash == stored.hash))
    }
}
