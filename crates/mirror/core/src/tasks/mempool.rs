//! Mempool tracking.

use super::PeriodicTask;
use crate::{Metrics, PendingConfig, TaskError};
use async_trait::async_trait;
use std::sync::Arc;
use zond_mirror_rpc::{NodeClient, RpcTransaction};
use zond_mirror_storage::MirrorStore;
use zond_mirror_types::{PendingStatus, PendingTransaction, unix_now};

/// Result of an expiry pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpiryReport {
    /// Pending entries marked as dropped.
    pub dropped: u64,
    /// Settled entries deleted.
    pub deleted: u64,
}

/// Mirrors the node's mempool into the pending collection.
#[derive(Debug)]
pub struct MempoolTracker<C, S> {
    client: Arc<C>,
    store: Arc<S>,
    config: PendingConfig,
}

impl<C, S> MempoolTracker<C, S>
where
    C: NodeClient + 'static,
    S: MirrorStore + 'static,
{
    /// Creates a new [`MempoolTracker`].
    pub const fn new(client: Arc<C>, store: Arc<S>, config: PendingConfig) -> Self {
        Self { client, store, config }
    }

    /// Upserts every transaction currently in the mempool.
    pub async fn refresh(&self) -> Result<usize, TaskError> {
        let now = unix_now();
        let transactions = self.client.pending_transactions().await?;
        let seen = transactions.len();
        for tx in transactions {
            self.store.upsert_pending(pending_from_rpc(tx, now))?;
        }

        let pending = self.store.pending_by_status(PendingStatus::Pending)?.len();
        metrics::gauge!(Metrics::PENDING_TRANSACTIONS).set(pending as f64);
        trace!(target: "mirror::mempool", seen, pending, "Refreshed mempool");
        Ok(seen)
    }

    /// Marks stale pending entries as dropped and deletes old settled entries.
    pub fn expire(&self, now: u64) -> Result<ExpiryReport, TaskError> {
        let max_age = self.config.max_age.as_secs();
        let mut report = ExpiryReport::default();

        for mut tx in self.store.pending_by_status(PendingStatus::Pending)? {
            if tx.age(now) > max_age {
                tx.mark_dropped(now);
                self.store.upsert_pending(tx)?;
                report.dropped += 1;
            }
        }

        let mut settled = self.store.pending_by_status(PendingStatus::Mined)?;
        settled.extend(self.store.pending_by_status(PendingStatus::Dropped)?);
        let stale: Vec<_> = settled
            .iter()
            .filter(|tx| now.saturating_sub(tx.last_seen) > max_age)
            .map(|tx| tx.hash)
            .collect();
        if !stale.is_empty() {
            report.deleted = self.store.delete_pending(&stale)?;
        }

        if report != ExpiryReport::default() {
            info!(target: "mirror::mempool", dropped = report.dropped, deleted = report.deleted, "Expired mempool entries");
        }
        Ok(report)
    }

    /// Checks pending entries for receipts and marks the included ones as mined.
    pub async fn verify(&self) -> Result<usize, TaskError> {
        let mut mined = 0;
        for mut tx in self.store.pending_by_status(PendingStatus::Pending)? {
            match self.client.transaction_receipt(tx.hash).await {
                Ok(Some(receipt)) => {
                    tx.mark_mined(receipt.block_number.to::<u64>(), unix_now());
                    self.store.upsert_pending(tx)?;
                    mined += 1;
                }
                Ok(None) => {}
                Err(err) => {
                    debug!(target: "mirror::mempool", tx_hash = %tx.hash, %err, "Receipt lookup failed");
                }
            }
        }
        Ok(mined)
    }
}

fn pending_from_rpc(tx: RpcTransaction, now: u64) -> PendingTransaction {
    PendingTransaction {
        hash: tx.hash,
        from: tx.from,
        to: tx.to,
        nonce: tx.nonce.to::<u64>(),
        value: tx.value,
        gas: tx.gas.to::<u64>(),
        gas_price: tx.gas_price.or(tx.max_fee_per_gas),
        input: tx.input,
        status: PendingStatus::Pending,
        first_seen: now,
        last_seen: now,
        block_number: None,
    }
}

/// Which mempool job a [`MempoolTask`] runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MempoolJob {
    /// [`MempoolTracker::refresh`].
    Refresh,
    /// [`MempoolTracker::expire`].
    Cleanup,
    /// [`MempoolTracker::verify`].
    Verify,
}

/// A [`PeriodicTask`] running one mempool job.
#[derive(Debug)]
pub struct MempoolTask<C, S> {
    tracker: Arc<MempoolTracker<C, S>>,
    job: MempoolJob,
}

impl<C, S> MempoolTask<C, S> {
    /// Creates a new [`MempoolTask`].
    pub const fn new(tracker: Arc<MempoolTracker<C, S>>, job: MempoolJob) -> Self {
        Self { tracker, job }
    }
}

#[async_trait]
impl<C, S> PeriodicTask for MempoolTask<C, S>
where
    C: NodeClient + 'static,
    S: MirrorStore + 'static,
{
    fn name(&self) -> &'static str {
        match self.job {
            MempoolJob::Refresh => "mempool_refresh",
            MempoolJob::Cleanup => "pending_cleanup",
            MempoolJob::Verify => "pending_verification",
        }
    }

    async fn run(&self) -> Result<(), TaskError> {
        match self.job {
            MempoolJob::Refresh => {
                self.tracker.refresh().await?;
            }
            MempoolJob::Cleanup => {
                self.tracker.expire(unix_now())?;
            }
            MempoolJob::Verify => {
                self.tracker.verify().await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockNode, rpc_transaction};
    use std::time::Duration;
    use zond_mirror_storage::{InMemoryStore, PendingStorage};
    use zond_mirror_types::Address;

    fn tracker(node: MockNode) -> (MempoolTracker<MockNode, InMemoryStore>, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let config = PendingConfig { max_age: Duration::from_secs(100) };
        (MempoolTracker::new(Arc::new(node), Arc::clone(&store), config), store)
    }

    #[tokio::test]
    async fn test_refresh_keeps_first_seen() {
        let node = MockNode::with_chain(1);
        let tx = rpc_transaction(0x01, Address::new([1; 20]), None);
        let hash = tx.hash;
        node.set_pending(vec![tx]);
        let (tracker, store) = tracker(node);

        assert_eq!(tracker.refresh().await.unwrap(), 1);
        let first = store.pending(hash).unwrap().unwrap();
        tracker.refresh().await.unwrap();
        let second = store.pending(hash).unwrap().unwrap();

        assert_eq!(second.status, PendingStatus::Pending);
        assert_eq!(second.first_seen, first.first_seen);
    }

    #[tokio::test]
    async fn test_expire_drops_then_deletes() {
        let node = MockNode::with_chain(1);
        let tx = rpc_transaction(0x02, Address::new([2; 20]), None);
        let hash = tx.hash;
        let (tracker, store) = tracker(node);
        store.upsert_pending(pending_from_rpc(tx, 1_000)).unwrap();

        assert_eq!(tracker.expire(1_050).unwrap(), ExpiryReport::default());
        assert_eq!(tracker.expire(1_101).unwrap(), ExpiryReport { dropped: 1, deleted: 0 });
        assert_eq!(store.pending(hash).unwrap().unwrap().status, PendingStatus::Dropped);
        assert_eq!(tracker.expire(1_202).unwrap(), ExpiryReport { dropped: 0, deleted: 1 });
        assert!(store.pending(hash).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_verify_marks_included_transactions() {
        let node = MockNode::with_chain(3);
        let included = rpc_transaction(0x03, Address::new([3; 20]), None);
        let waiting = rpc_transaction(0x04, Address::new([4; 20]), None);
        node.add_transaction(2, included.clone());
        node.set_pending(vec![included.clone(), waiting.clone()]);
        let (tracker, store) = tracker(node);
        tracker.refresh().await.unwrap();

        assert_eq!(tracker.verify().await.unwrap(), 1);
        let mined = store.pending(included.hash).unwrap().unwrap();
        assert_eq!(mined.status, PendingStatus::Mined);
        assert_eq!(mined.block_number, Some(2));
        assert_eq!(store.pending(waiting.hash).unwrap().unwrap().status, PendingStatus::Pending);
    }
}
