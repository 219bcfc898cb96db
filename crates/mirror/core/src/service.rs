//! Wiring of the sync engine and its periodic loops.

use crate::{
    BlockFetcher, Enricher, FailedBlocks, GapDetector, Ingestor, Metrics, MirrorConfig,
    ReorgHandler, SyncLock, SyncOrchestrator,
    tasks::{
        MempoolJob, MempoolTask, MempoolTracker, StatsRefresher, TaskSchedule, TaskSupervisor,
        ValidatorRefresher,
    },
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use zond_mirror_rpc::{MarketClient, NodeClient};
use zond_mirror_storage::{MirrorStore, StorageError};

/// The mirror process: one sync engine plus its periodic loops.
///
/// Every component is built once here from a single [`MirrorConfig`] and shares the same
/// node client, store, failed-block registry and sync lock.
#[derive(Debug)]
pub struct MirrorService<C, S> {
    config: MirrorConfig,
    store: Arc<S>,
    orchestrator: Arc<SyncOrchestrator<C, S>>,
    gaps: Arc<GapDetector<C, S>>,
    validators: Arc<ValidatorRefresher<C, S>>,
    stats: Arc<StatsRefresher<S>>,
    mempool: Arc<MempoolTracker<C, S>>,
}

impl<C, S> MirrorService<C, S>
where
    C: NodeClient + 'static,
    S: MirrorStore + 'static,
{
    /// Builds every component.
    pub fn new(
        config: MirrorConfig,
        client: Arc<C>,
        store: Arc<S>,
        market: Option<MarketClient>,
    ) -> Self {
        let failed = FailedBlocks::default();
        let sync_lock = SyncLock::default();

        let fetcher = BlockFetcher::new(
            Arc::clone(&client),
            Arc::clone(&store),
            failed.clone(),
            config.fetch.clone(),
        );
        let enricher = Enricher::new(Arc::clone(&client), Arc::clone(&store));
        let ingestor = Ingestor::new(Arc::clone(&store), enricher, failed, sync_lock.clone());
        let gaps = Arc::new(GapDetector::new(
            Arc::clone(&store),
            fetcher.clone(),
            ingestor.clone(),
            config.gaps.clone(),
        ));
        let reorg = ReorgHandler::new(
            Arc::clone(&client),
            Arc::clone(&store),
            fetcher.clone(),
            sync_lock,
            config.reorg.clone(),
        );
        let orchestrator = Arc::new(SyncOrchestrator::new(
            Arc::clone(&client),
            Arc::clone(&store),
            fetcher,
            ingestor,
            Arc::clone(&gaps),
            reorg,
            config.sync.clone(),
        ));

        let validators = Arc::new(ValidatorRefresher::new(Arc::clone(&client), Arc::clone(&store)));
        let stats = Arc::new(StatsRefresher::new(Arc::clone(&store), market));
        let mempool =
            Arc::new(MempoolTracker::new(client, Arc::clone(&store), config.pending.clone()));

        Self { config, store, orchestrator, gaps, validators, stats, mempool }
    }

    /// The sync orchestrator.
    pub fn orchestrator(&self) -> Arc<SyncOrchestrator<C, S>> {
        Arc::clone(&self.orchestrator)
    }

    /// The gap detector.
    pub fn gap_detector(&self) -> Arc<GapDetector<C, S>> {
        Arc::clone(&self.gaps)
    }

    /// Starts every periodic loop under a [`TaskSupervisor`].
    pub fn spawn_tasks(&self, cancellation: CancellationToken) -> TaskSupervisor {
        let schedule = &self.config.schedule;
        let mut supervisor = TaskSupervisor::new(self.config.supervisor.clone(), cancellation);

        supervisor.spawn(self.orchestrator(), TaskSchedule::every(schedule.block_sync));
        supervisor.spawn(
            self.gap_detector(),
            TaskSchedule::every(schedule.gap_detection).after(schedule.gap_detection_initial_delay),
        );
        supervisor.spawn(self.validators.clone(), TaskSchedule::every(schedule.validators));
        supervisor.spawn(self.stats.clone(), TaskSchedule::every(schedule.stats));

        let jobs = [
            (MempoolJob::Refresh, schedule.mempool),
            (MempoolJob::Cleanup, schedule.pending_cleanup),
            (MempoolJob::Verify, schedule.pending_verification),
        ];
        for (job, interval) in jobs {
            let task = MempoolTask::new(Arc::clone(&self.mempool), job);
            supervisor.spawn(Arc::new(task), TaskSchedule::every(interval));
        }

        supervisor
    }

    /// Runs until `cancellation` fires, then flushes the store.
    ///
    /// Loops finish the tick they are in before stopping.
    pub async fn run(self, cancellation: CancellationToken) -> Result<(), StorageError> {
        Metrics::init();
        let supervisor = self.spawn_tasks(cancellation);
        info!(target: "mirror::service", loops = supervisor.len(), "Mirror started");

        supervisor.join().await;
        info!(target: "mirror::service", "Loops stopped, flushing store");
        self.store.flush()?;
        Ok(())
    }
}
