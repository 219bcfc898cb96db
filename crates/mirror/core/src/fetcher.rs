//! The block producer.

use crate::{FetchConfig, FetchError, Metrics};
use alloy_primitives::B256;
use backon::{ExponentialBuilder, Retryable};
use futures::future::try_join_all;
use parking_lot::Mutex;
use std::{collections::HashMap, ops::Range, sync::Arc, time::Duration};
use tokio::sync::{Semaphore, mpsc};
use zond_mirror_rpc::NodeClient;
use zond_mirror_storage::MirrorStore;
use zond_mirror_types::{Block, FailedBlockRecord};

/// Blocks fetched by one producer, ascending by number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockBatch {
    /// Fetched blocks.
    pub blocks: Vec<Block>,
    /// Numbers of the fetched blocks.
    pub numbers: Vec<u64>,
    /// Numbers in the range that were already persisted and therefore skipped.
    pub already_present: Vec<u64>,
}

impl BlockBatch {
    /// A batch holding a single fetched block.
    pub fn single(block: Block) -> Self {
        Self { numbers: vec![block.number], blocks: vec![block], already_present: Vec::new() }
    }

    /// Highest block number covered by the batch, fetched or skipped.
    pub fn highest(&self) -> Option<u64> {
        self.numbers.iter().chain(&self.already_present).copied().max()
    }

    /// Number of block numbers covered by the batch.
    pub fn covered(&self) -> u64 {
        (self.numbers.len() + self.already_present.len()) as u64
    }
}

/// Blocks that could not be fetched, keyed by number.
#[derive(Debug, Clone, Default)]
pub struct FailedBlocks {
    inner: Arc<Mutex<HashMap<u64, FailedBlockRecord>>>,
}

impl FailedBlocks {
    /// Records a failed attempt for `number`.
    pub fn record(&self, number: u64, error: impl ToString) -> u32 {
        let mut inner = self.inner.lock();
        let record = inner
            .entry(number)
            .and_modify(|record| record.record_failure(error.to_string()))
            .or_insert_with(|| FailedBlockRecord::new(number, error.to_string()));
        record.attempts
    }

    /// Forgets `number` after it was persisted.
    pub fn clear(&self, number: u64) {
        self.inner.lock().remove(&number);
    }

    /// Gets the record for `number`.
    pub fn get(&self, number: u64) -> Option<FailedBlockRecord> {
        self.inner.lock().get(&number).cloned()
    }

    /// Returns `true` if `number` has failed at least `max_attempts` times.
    pub fn is_exhausted(&self, number: u64, max_attempts: u32) -> bool {
        self.inner.lock().get(&number).is_some_and(|record| record.is_exhausted(max_attempts))
    }

    /// Number of tracked blocks.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Returns `true` if no block is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Pacing of node requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Batch catch-up, short pauses.
    Bulk,
    /// Steady-state polling, longer pauses.
    Steady,
}

/// Fetches blocks from the node and converts them into the canonical model.
///
/// Producers started with [`BlockFetcher::spawn_range`] share one semaphore, which caps how
/// many of them query the node at once.
#[derive(Debug)]
pub struct BlockFetcher<C, S> {
    client: Arc<C>,
    store: Arc<S>,
    permits: Arc<Semaphore>,
    failed: FailedBlocks,
    config: FetchConfig,
}

impl<C, S> Clone for BlockFetcher<C, S> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            store: Arc::clone(&self.store),
            permits: Arc::clone(&self.permits),
            failed: self.failed.clone(),
            config: self.config.clone(),
        }
    }
}

impl<C, S> BlockFetcher<C, S>
where
    C: NodeClient + 'static,
    S: MirrorStore + 'static,
{
    /// Creates a new [`BlockFetcher`].
    pub fn new(client: Arc<C>, store: Arc<S>, failed: FailedBlocks, config: FetchConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        Self { client, store, permits, failed, config }
    }

    /// The failed-block registry shared with this fetcher.
    pub const fn failed(&self) -> &FailedBlocks {
        &self.failed
    }

    /// Pause between node requests in `mode`.
    pub const fn delay(&self, mode: FetchMode) -> Duration {
        match mode {
            FetchMode::Bulk => self.config.bulk_delay,
            FetchMode::Steady => self.config.steady_delay,
        }
    }

    /// Fetches block `number` with its receipts, retrying transient failures.
    pub async fn fetch_block(&self, number: u64) -> Result<Block, FetchError> {
        let policy = ExponentialBuilder::default()
            .with_min_delay(self.config.retry_backoff)
            .with_max_times(self.config.max_attempts.saturating_sub(1) as usize);

        (|| self.fetch_block_once(number))
            .retry(policy)
            .when(FetchError::is_retryable)
            .notify(|err, delay| {
                debug!(
                    target: "mirror::fetcher",
                    block_number = number,
                    ?delay,
                    %err,
                    "Retrying block fetch"
                );
            })
            .await
    }

    async fn fetch_block_once(&self, number: u64) -> Result<Block, FetchError> {
        let raw = self.client.block_by_number(number).await?.ok_or(FetchError::Missing(number))?;
        let hashes: Vec<B256> = raw.transactions.iter().map(|tx| tx.hash).collect();
        let receipts = try_join_all(hashes.iter().map(|hash| self.client.transaction_receipt(*hash)))
            .await?
            .into_iter()
            .flatten()
            .map(|receipt| (receipt.transaction_hash, receipt))
            .collect::<HashMap<_, _>>();
        Ok(raw.into_block(receipts)?)
    }

    /// Fetches every block in `range` that is not yet persisted.
    ///
    /// Waits for a producer slot first. Blocks that fail every attempt are recorded in the
    /// failed-block registry and skipped.
    pub async fn produce(&self, range: Range<u64>, mode: FetchMode) -> BlockBatch {
        let Ok(_permit) = Arc::clone(&self.permits).acquire_owned().await else {
            warn!(target: "mirror::fetcher", ?range, "Producer slots closed, skipping range");
            return BlockBatch::default();
        };

        let mut batch = BlockBatch::default();
        for number in range.clone() {
            match self.store.block_exists(number) {
                Ok(true) => {
                    batch.already_present.push(number);
                    continue;
                }
                Ok(false) => {}
                Err(err) => {
                    warn!(target: "mirror::fetcher", block_number = number, %err, "Existence check failed, fetching anyway");
                }
            }

            tokio::time::sleep(self.delay(mode)).await;
            match self.fetch_block(number).await {
                Ok(block) => {
                    batch.numbers.push(number);
                    batch.blocks.push(block);
                }
                Err(err) => {
                    let attempts = self.failed.record(number, &err);
                    metrics::counter!(Metrics::BLOCK_FETCH_FAILURES).increment(1);
                    warn!(target: "mirror::fetcher", block_number = number, attempts, %err, "Failed to fetch block");
                }
            }
        }

        debug!(
            target: "mirror::fetcher",
            ?range,
            fetched = batch.numbers.len(),
            skipped = batch.already_present.len(),
            "Producer finished"
        );
        batch
    }

    /// Starts a producer for `range` on its own task.
    ///
    /// The returned channel yields exactly one batch and then closes.
    pub fn spawn_range(&self, range: Range<u64>, mode: FetchMode) -> mpsc::Receiver<BlockBatch> {
        let (tx, rx) = mpsc::channel(1);
        let fetcher = self.clone();
        tokio::spawn(async move {
            let batch = fetcher.produce(range, mode).await;
            if tx.send(batch).await.is_err() {
                debug!(target: "mirror::fetcher", "Batch receiver dropped");
            }
        });
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockNode;
    use zond_mirror_storage::{BlockWriter, InMemoryStore};

    fn fetcher(node: MockNode, store: InMemoryStore) -> BlockFetcher<MockNode, InMemoryStore> {
        let config = FetchConfig {
            retry_backoff: Duration::from_millis(1),
            bulk_delay: Duration::ZERO,
            steady_delay: Duration::ZERO,
            ..Default::default()
        };
        BlockFetcher::new(Arc::new(node), Arc::new(store), FailedBlocks::default(), config)
    }

    #[tokio::test]
    async fn test_produce_emits_ascending_batch() {
        let node = MockNode::with_chain(20);
        let fetcher = fetcher(node, InMemoryStore::new());

        let batch = fetcher.spawn_range(5..10, FetchMode::Bulk).recv().await.unwrap();
        assert_eq!(batch.numbers, vec![5, 6, 7, 8, 9]);
        assert!(batch.blocks.windows(2).all(|pair| pair[1].is_child_of(&pair[0].block_ref())));
        assert_eq!(batch.highest(), Some(9));
    }

    #[tokio::test]
    async fn test_produce_skips_persisted_blocks() {
        let node = MockNode::with_chain(10);
        let store = InMemoryStore::new();
        let fetcher = fetcher(node, store);
        let existing = fetcher.fetch_block(3).await.unwrap();
        fetcher.store.insert_blocks(&[existing]).unwrap();

        let batch = fetcher.produce(1..5, FetchMode::Bulk).await;
        assert_eq!(batch.numbers, vec![1, 2, 4]);
        assert_eq!(batch.already_present, vec![3]);
        assert_eq!(batch.covered(), 4);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let node = MockNode::with_chain(10);
        node.fail_block(4, 2);
        let fetcher = fetcher(node, InMemoryStore::new());

        let block = fetcher.fetch_block(4).await.unwrap();
        assert_eq!(block.number, 4);
        assert!(fetcher.failed().is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_block_is_recorded_and_skipped() {
        let node = MockNode::with_chain(10);
        node.fail_block(2, u32::MAX);
        let fetcher = fetcher(node, InMemoryStore::new());

        let batch = fetcher.produce(1..4, FetchMode::Steady).await;
        assert_eq!(batch.numbers, vec![1, 3]);
        let record = fetcher.failed().get(2).unwrap();
        assert_eq!(record.attempts, 1);
        assert_eq!(fetcher.client.fetch_count(2), 3);
    }
}
