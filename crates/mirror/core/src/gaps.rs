//! Gap detection and backfill.

use crate::{BlockBatch, BlockFetcher, GapConfig, GapError, Ingestor, Metrics};
use std::sync::Arc;
use zond_mirror_rpc::NodeClient;
use zond_mirror_storage::MirrorStore;

/// Returns the numbers in `[from, to]` that are missing from `present`.
///
/// `present` must be sorted ascending.
pub fn missing_numbers(present: &[u64], from: u64, to: u64) -> Vec<u64> {
    let mut present = present.iter().copied().peekable();
    let mut missing = Vec::new();
    for number in from..=to {
        while present.next_if(|stored| *stored < number).is_some() {}
        if present.next_if_eq(&number).is_none() {
            missing.push(number);
        }
    }
    missing
}

/// Outcome of one gap scan and backfill pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GapReport {
    /// Missing blocks found.
    pub detected: u64,
    /// Missing blocks persisted by this pass.
    pub filled: u64,
    /// Missing blocks skipped because they exhausted their attempts.
    pub abandoned: u64,
}

/// Finds holes in the recent block history and fetches them again.
#[derive(Debug)]
pub struct GapDetector<C, S> {
    store: Arc<S>,
    fetcher: BlockFetcher<C, S>,
    ingestor: Ingestor<C, S>,
    config: GapConfig,
}

impl<C, S> GapDetector<C, S>
where
    C: NodeClient + 'static,
    S: MirrorStore + 'static,
{
    /// Creates a new [`GapDetector`].
    pub const fn new(
        store: Arc<S>,
        fetcher: BlockFetcher<C, S>,
        ingestor: Ingestor<C, S>,
        config: GapConfig,
    ) -> Self {
        Self { store, fetcher, ingestor, config }
    }

    /// Returns the missing block numbers in `[from, to]`.
    ///
    /// The scan is clamped to the most recent `window` numbers ending at `to`.
    pub fn detect_gaps(&self, from: u64, to: u64) -> Result<Vec<u64>, GapError> {
        let from = from.max(to.saturating_sub(self.config.window.saturating_sub(1)));
        if from > to {
            return Ok(Vec::new());
        }
        let present = self.store.block_numbers_in_range(from, to)?;
        Ok(missing_numbers(&present, from, to))
    }

    /// Backfills the given block numbers.
    ///
    /// Numbers already present are skipped silently, and so are numbers whose failure
    /// record reached the attempt cap. The write happens under the sync lock, and numbers
    /// above the stored sync state are dropped there, so a block removed by a concurrent
    /// rewind is never written back. Returns how many blocks were persisted.
    pub async fn fill_gaps(&self, gaps: &[u64]) -> Result<u64, GapError> {
        let mut filled = 0;
        for &number in gaps {
            if self.store.block_exists(number)? {
                continue;
            }
            if self.fetcher.failed().is_exhausted(number, self.config.max_attempts) {
                trace!(target: "mirror::gaps", block_number = number, "Skipping abandoned block");
                continue;
            }

            let block = match self.fetcher.fetch_block(number).await {
                Ok(block) => block,
                Err(err) => {
                    let attempts = self.fetcher.failed().record(number, &err);
                    warn!(target: "mirror::gaps", block_number = number, attempts, %err, "Failed to backfill block");
                    continue;
                }
            };

            let _guard = self.ingestor.sync_lock().lock().await;
            let synced = self.store.sync_state()?.map(|state| state.last_synced_block);
            if synced.is_none_or(|synced| number > synced) {
                trace!(target: "mirror::gaps", block_number = number, ?synced, "Dropping block above the sync state");
                continue;
            }
            if self.store.block_exists(number)? {
                continue;
            }
            filled += self.ingestor.ingest_batch(&BlockBatch::single(block)).await? as u64;
        }

        if filled > 0 {
            metrics::counter!(Metrics::GAPS_FILLED).increment(filled);
        }
        Ok(filled)
    }

    /// Scans the window ending at the last synced block and backfills what is missing.
    ///
    /// The scan starts at the lowest persisted block inside the window, so history the
    /// mirror never started from is not treated as missing.
    pub async fn run_once(&self) -> Result<GapReport, GapError> {
        let Some(state) = self.store.sync_state()? else {
            return Ok(GapReport::default());
        };
        let to = state.last_synced_block;
        let from = to.saturating_sub(self.config.window.saturating_sub(1));
        let present = self.store.block_numbers_in_range(from, to)?;
        let Some(&first) = present.first() else {
            return Ok(GapReport::default());
        };
        let gaps = missing_numbers(&present, first, to);
        metrics::gauge!(Metrics::GAPS_DETECTED).set(gaps.len() as f64);
        if gaps.is_empty() {
            return Ok(GapReport::default());
        }

        let abandoned = gaps
            .iter()
            .filter(|number| self.fetcher.failed().is_exhausted(**number, self.config.max_attempts))
            .count() as u64;
        info!(target: "mirror::gaps", detected = gaps.len(), abandoned, "Found missing blocks");

        let filled = self.fill_gaps(&gaps).await?;
        Ok(GapReport { detected: gaps.len() as u64, filled, abandoned })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Enricher, FailedBlocks, FetchConfig, SyncLock, test_utils::MockNode};
    use rstest::rstest;
    use std::time::Duration;
    use zond_mirror_storage::{
        BlockReader, BlockWriter, InMemoryStore, StorageRewinder, SyncStateStorage,
    };
    use zond_mirror_types::SyncState;

    fn detector(node: MockNode, window: u64) -> (GapDetector<MockNode, InMemoryStore>, Arc<InMemoryStore>) {
        let node = Arc::new(node);
        let store = Arc::new(InMemoryStore::new());
        let failed = FailedBlocks::default();
        let config = FetchConfig {
            retry_backoff: Duration::from_millis(1),
            steady_delay: Duration::ZERO,
            ..Default::default()
        };
        let fetcher = BlockFetcher::new(Arc::clone(&node), Arc::clone(&store), failed.clone(), config);
        let enricher = Enricher::new(node, Arc::clone(&store));
        let ingestor = Ingestor::new(Arc::clone(&store), enricher, failed, SyncLock::default());
        let gaps = GapDetector::new(
            Arc::clone(&store),
            fetcher,
            ingestor,
            GapConfig { window, ..Default::default() },
        );
        (gaps, store)
    }

    async fn seed(gaps: &GapDetector<MockNode, InMemoryStore>, store: &InMemoryStore, numbers: &[u64]) {
        for number in numbers {
            let block = gaps.fetcher.fetch_block(*number).await.unwrap();
            store.insert_blocks(&[block]).unwrap();
        }
    }

    #[rstest]
    #[case::holes(&[1, 2, 4, 5, 7], 1, 7, vec![3, 6])]
    #[case::complete(&[1, 2, 3], 1, 3, vec![])]
    #[case::empty(&[], 4, 6, vec![4, 5, 6])]
    #[case::outside_range(&[0, 9], 2, 4, vec![2, 3, 4])]
    fn test_missing_numbers(
        #[case] present: &[u64],
        #[case] from: u64,
        #[case] to: u64,
        #[case] expected: Vec<u64>,
    ) {
        assert_eq!(missing_numbers(present, from, to), expected);
    }

    #[tokio::test]
    async fn test_detect_gaps() {
        let (gaps, store) = detector(MockNode::with_chain(10), 1000);
        seed(&gaps, &store, &[1, 2, 4, 5, 7]).await;
        assert_eq!(gaps.detect_gaps(1, 7).unwrap(), vec![3, 6]);
    }

    #[tokio::test]
    async fn test_detect_gaps_is_bounded_by_window() {
        let (gaps, store) = detector(MockNode::with_chain(10), 3);
        seed(&gaps, &store, &[7]).await;
        assert_eq!(gaps.detect_gaps(0, 8).unwrap(), vec![6, 8]);
    }

    #[tokio::test]
    async fn test_fill_gaps_on_present_blocks_is_noop() {
        let (gaps, store) = detector(MockNode::with_chain(10), 1000);
        seed(&gaps, &store, &[3, 6]).await;

        assert_eq!(gaps.fill_gaps(&[3, 6]).await.unwrap(), 0);
        assert_eq!(store.block_numbers(), vec![3, 6]);
    }

    #[tokio::test]
    async fn test_fill_gaps_persists_missing_blocks() {
        let (gaps, store) = detector(MockNode::with_chain(10), 1000);
        seed(&gaps, &store, &[1, 2, 4, 5, 7]).await;
        store.save_sync_state(SyncState::new(7)).unwrap();

        assert_eq!(gaps.fill_gaps(&[3, 6]).await.unwrap(), 2);
        assert!(gaps.detect_gaps(1, 7).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fill_gaps_skips_blocks_removed_by_rewind() {
        let (gaps, store) = detector(MockNode::with_chain(12), 1000);
        seed(&gaps, &store, &[6, 7, 8]).await;
        store.save_sync_state(SyncState::new(10)).unwrap();
        let detected = gaps.detect_gaps(6, 10).unwrap();
        assert_eq!(detected, vec![9, 10]);

        store.rewind_to(8).unwrap();
        assert_eq!(gaps.fill_gaps(&detected).await.unwrap(), 0);
        assert!(!store.block_exists(9).unwrap());
        assert!(!store.block_exists(10).unwrap());
    }

    #[tokio::test]
    async fn test_fill_gaps_waits_for_sync_lock() {
        let (gaps, store) = detector(MockNode::with_chain(10), 1000);
        seed(&gaps, &store, &[1, 2, 4]).await;
        store.save_sync_state(SyncState::new(4)).unwrap();

        let guard = gaps.ingestor.sync_lock().clone().lock_owned().await;
        let fill = gaps.fill_gaps(&[3]);
        tokio::pin!(fill);
        assert!(tokio::time::timeout(Duration::from_millis(20), &mut fill).await.is_err());
        assert!(!store.block_exists(3).unwrap());

        drop(guard);
        assert_eq!(fill.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_block_is_abandoned() {
        let node = MockNode::with_chain(10);
        node.fail_block(3, u32::MAX);
        let (gaps, store) = detector(node, 1000);
        seed(&gaps, &store, &[1, 2, 4]).await;
        store.save_sync_state(SyncState::new(5)).unwrap();

        let first = gaps.run_once().await.unwrap();
        assert_eq!(first, GapReport { detected: 2, filled: 1, abandoned: 0 });
        assert!(store.block_exists(5).unwrap());
        assert!(!store.block_exists(0).unwrap());

        for _ in 0..2 {
            gaps.run_once().await.unwrap();
        }
        assert!(gaps.fetcher.failed().is_exhausted(3, 3));

        let report = gaps.run_once().await.unwrap();
        assert_eq!(report, GapReport { detected: 1, filled: 0, abandoned: 1 });
        assert!(!store.block_exists(3).unwrap());
    }
}
