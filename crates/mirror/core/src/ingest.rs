//! The block consumer.

use crate::{BlockBatch, Enricher, FailedBlocks, IngestError, Metrics};
use std::{
    ops::RangeInclusive,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinSet,
};
use zond_mirror_rpc::NodeClient;
use zond_mirror_storage::MirrorStore;
use zond_mirror_types::SyncState;

/// Lock serializing sync-state writes with rollbacks.
///
/// Held while reading the stored tip and writing a new one, and for the whole of a rewind.
pub type SyncLock = Arc<Mutex<()>>;

/// Highest block number observed across batches that complete in any order.
#[derive(Debug, Default)]
pub struct HighWaterMark(AtomicU64);

impl HighWaterMark {
    /// Raises the mark to `number` unless it is already higher.
    ///
    /// Returns `true` if the mark moved.
    pub fn observe(&self, number: u64) -> bool {
        // Stored as `number + 1` so that zero means nothing was observed.
        let candidate = number.saturating_add(1);
        let mut current = self.0.load(Ordering::Acquire);
        while candidate > current {
            match self.0.compare_exchange_weak(
                current,
                candidate,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
        false
    }

    /// The highest observed number.
    pub fn get(&self) -> Option<u64> {
        self.0.load(Ordering::Acquire).checked_sub(1)
    }
}

/// Outcome of draining a set of producers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Highest block number covered by any batch.
    pub highest: Option<u64>,
    /// Block numbers in the span.
    pub expected: u64,
    /// Block numbers persisted or found already present.
    pub processed: u64,
}

impl IngestReport {
    /// Returns `true` if every number in the span was covered.
    pub const fn is_complete(&self) -> bool {
        self.expected == self.processed
    }
}

/// Persists fetched batches, enriches them and advances the sync state.
#[derive(Debug)]
pub struct Ingestor<C, S> {
    store: Arc<S>,
    enricher: Enricher<C, S>,
    failed: FailedBlocks,
    sync_lock: SyncLock,
}

impl<C, S> Clone for Ingestor<C, S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            enricher: self.enricher.clone(),
            failed: self.failed.clone(),
            sync_lock: Arc::clone(&self.sync_lock),
        }
    }
}

impl<C, S> Ingestor<C, S>
where
    C: NodeClient + 'static,
    S: MirrorStore + 'static,
{
    /// Creates a new [`Ingestor`].
    pub const fn new(
        store: Arc<S>,
        enricher: Enricher<C, S>,
        failed: FailedBlocks,
        sync_lock: SyncLock,
    ) -> Self {
        Self { store, enricher, failed, sync_lock }
    }

    /// Persists the blocks of `batch` in one write and enriches the ones newly written.
    ///
    /// Blocks already in the store are neither rewritten nor enriched again. Returns the
    /// number of blocks newly written. On a failed write every block of the batch is
    /// recorded as failed so gap detection picks it up.
    pub async fn ingest_batch(&self, batch: &BlockBatch) -> Result<usize, IngestError> {
        if batch.blocks.is_empty() {
            return Ok(0);
        }

        let inserted = match self.store.insert_blocks(&batch.blocks) {
            Ok(inserted) => inserted,
            Err(err) => {
                for number in &batch.numbers {
                    self.failed.record(*number, &err);
                }
                return Err(err.into());
            }
        };
        metrics::counter!(Metrics::BLOCKS_INGESTED).increment(inserted.len() as u64);

        for block in &batch.blocks {
            self.failed.clear(block.number);
            if !inserted.contains(&block.number) {
                trace!(target: "mirror::ingest", block_number = block.number, "Block already stored, skipping enrichment");
                continue;
            }
            let report = self.enricher.enrich_block(block).await;
            if report.failed_steps > 0 {
                debug!(target: "mirror::ingest", block_number = block.number, failed_steps = report.failed_steps, "Block enriched with failures");
            }
        }

        trace!(target: "mirror::ingest", inserted = inserted.len(), "Persisted batch");
        Ok(inserted.len())
    }

    /// The lock shared with the sync-state writer and the reorg handler.
    pub(crate) const fn sync_lock(&self) -> &SyncLock {
        &self.sync_lock
    }

    /// Moves the sync state forward to `highest`.
    ///
    /// The state never moves backwards here; only a rewind lowers it. Returns the stored
    /// value after the call.
    pub async fn commit_sync_state(&self, highest: u64) -> Result<u64, IngestError> {
        let _guard = self.sync_lock.lock().await;
        let current = self.store.sync_state()?.map(|state| state.last_synced_block);
        if let Some(current) = current.filter(|current| *current >= highest) {
            return Ok(current);
        }
        self.store.save_sync_state(SyncState::new(highest))?;
        metrics::gauge!(Metrics::LAST_SYNCED_BLOCK).set(highest as f64);
        Ok(highest)
    }

    /// Drains every producer channel concurrently, then commits the highest block seen.
    ///
    /// `span` is the full range the producers were assigned; it is only used for the
    /// coverage check.
    pub async fn drain(
        &self,
        receivers: Vec<mpsc::Receiver<BlockBatch>>,
        span: RangeInclusive<u64>,
    ) -> Result<IngestReport, IngestError> {
        let high_water = Arc::new(HighWaterMark::default());
        let processed = Arc::new(AtomicU64::new(0));

        let mut consumers = JoinSet::new();
        for mut receiver in receivers {
            let ingestor = self.clone();
            let high_water = Arc::clone(&high_water);
            let processed = Arc::clone(&processed);
            consumers.spawn(async move {
                while let Some(batch) = receiver.recv().await {
                    let covered = match ingestor.ingest_batch(&batch).await {
                        Ok(_) => batch.covered(),
                        Err(err) => {
                            error!(target: "mirror::ingest", blocks = batch.numbers.len(), %err, "Failed to persist batch");
                            batch.already_present.len() as u64
                        }
                    };
                    processed.fetch_add(covered, Ordering::AcqRel);
                    if let Some(highest) = batch.highest() {
                        high_water.observe(highest);
                    }
                }
            });
        }

        while let Some(result) = consumers.join_next().await {
            if let Err(err) = result {
                error!(target: "mirror::ingest", %err, "Consumer task failed");
            }
        }

        let highest = high_water.get();
        if let Some(highest) = highest {
            let committed = self.commit_sync_state(highest).await?;
            info!(target: "mirror::ingest", committed, "Advanced sync state");
        }

        let report = IngestReport {
            highest,
            expected: span.end().saturating_sub(*span.start()).saturating_add(1),
            processed: processed.load(Ordering::Acquire),
        };
        if !report.is_complete() {
            warn!(
                target: "mirror::ingest",
                from = span.start(),
                to = span.end(),
                expected = report.expected,
                processed = report.processed,
                "Batch sync left blocks behind, gap detection will retry them"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        BlockFetcher, FetchConfig, FetchMode,
        test_utils::{MockNode, rpc_transaction},
    };
    use alloy_primitives::Bytes;
    use std::time::Duration;
    use zond_mirror_storage::{AccountStorage, BlockReader, InMemoryStore, SyncStateStorage};
    use zond_mirror_types::Address;

    struct Harness {
        fetcher: BlockFetcher<MockNode, InMemoryStore>,
        ingestor: Ingestor<MockNode, InMemoryStore>,
        store: Arc<InMemoryStore>,
    }

    fn harness(tip: u64) -> Harness {
        harness_with(MockNode::with_chain(tip))
    }

    fn harness_with(node: MockNode) -> Harness {
        let node = Arc::new(node);
        let store = Arc::new(InMemoryStore::new());
        let failed = FailedBlocks::default();
        let config = FetchConfig {
            retry_backoff: Duration::from_millis(1),
            bulk_delay: Duration::ZERO,
            ..Default::default()
        };
        let fetcher =
            BlockFetcher::new(Arc::clone(&node), Arc::clone(&store), failed.clone(), config);
        let enricher = Enricher::new(node, Arc::clone(&store));
        let ingestor = Ingestor::new(Arc::clone(&store), enricher, failed, SyncLock::default());
        Harness { fetcher, ingestor, store }
    }

    #[test]
    fn test_high_water_mark_only_moves_up() {
        let mark = HighWaterMark::default();
        assert_eq!(mark.get(), None);
        assert!(mark.observe(0));
        assert_eq!(mark.get(), Some(0));
        assert!(mark.observe(29));
        assert!(!mark.observe(19));
        assert_eq!(mark.get(), Some(29));
    }

    #[tokio::test]
    async fn test_out_of_order_batches_keep_highest_state() {
        let h = harness(40);
        let low = h.fetcher.produce(10..20, FetchMode::Bulk).await;
        let high = h.fetcher.produce(20..30, FetchMode::Bulk).await;

        let (low_tx, low_rx) = mpsc::channel(1);
        let (high_tx, high_rx) = mpsc::channel(1);
        let ingestor = h.ingestor.clone();
        let drain = tokio::spawn(async move { ingestor.drain(vec![low_rx, high_rx], 10..=29).await });

        high_tx.send(high).await.unwrap();
        drop(high_tx);
        tokio::task::yield_now().await;
        low_tx.send(low).await.unwrap();
        drop(low_tx);

        let report = drain.await.unwrap().unwrap();
        assert_eq!(report.highest, Some(29));
        assert!(report.is_complete());
        assert_eq!(h.store.sync_state().unwrap(), Some(SyncState::new(29)));
        assert_eq!(h.store.block_count().unwrap(), 20);
    }

    #[tokio::test]
    async fn test_sync_state_never_regresses() {
        let h = harness(5);
        assert_eq!(h.ingestor.commit_sync_state(29).await.unwrap(), 29);
        assert_eq!(h.ingestor.commit_sync_state(19).await.unwrap(), 29);
        assert_eq!(h.store.sync_state().unwrap(), Some(SyncState::new(29)));
    }

    #[tokio::test]
    async fn test_coverage_counts_failed_blocks() {
        let h = harness(10);
        let mut batch = h.fetcher.produce(1..6, FetchMode::Bulk).await;
        batch.blocks.retain(|block| block.number != 3);
        batch.numbers.retain(|number| *number != 3);

        let (tx, rx) = mpsc::channel(1);
        tx.send(batch).await.unwrap();
        drop(tx);

        let report = h.ingestor.drain(vec![rx], 1..=5).await.unwrap();
        assert_eq!(report.expected, 5);
        assert_eq!(report.processed, 4);
        assert!(!report.is_complete());
        assert_eq!(h.store.sync_state().unwrap(), Some(SyncState::new(5)));
    }

    #[tokio::test]
    async fn test_reingested_block_is_not_enriched_again() {
        let node = MockNode::with_chain(3);
        let mut tx = rpc_transaction(0x01, Address::new([9; 20]), Some(Address::new([8; 20])));
        tx.signature = Bytes::from(vec![0, 0, 0, 9, 0xaa]);
        node.add_transaction(2, tx);
        let h = harness_with(node);

        let batch = h.fetcher.produce(2..3, FetchMode::Bulk).await;
        assert_eq!(h.ingestor.ingest_batch(&batch).await.unwrap(), 1);
        assert_eq!(h.ingestor.ingest_batch(&batch).await.unwrap(), 0);

        assert!(h.store.ots_reuse_events().unwrap().is_empty());
        assert_eq!(h.store.block_count().unwrap(), 1);
    }
}
