//! Periodic loops and the fault boundary that keeps them running.
//!
//! Each loop runs its task immediately, then once per interval. A failed tick is retried
//! with exponential backoff; a panic restarts the loop after a growing delay, up to a
//! bounded number of restarts. Loops stop between ticks once the cancellation token fires.

use crate::{GapDetector, Metrics, SupervisorConfig, SyncOrchestrator, TaskError};
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use futures::FutureExt;
use std::{any::Any, fmt::Debug, panic::AssertUnwindSafe, sync::Arc, time::Duration};
use tokio::{task::JoinSet, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use zond_mirror_rpc::NodeClient;
use zond_mirror_storage::MirrorStore;

mod mempool;
pub use mempool::{ExpiryReport, MempoolJob, MempoolTask, MempoolTracker};

mod snapshots;
pub use snapshots::{StatsRefresher, ValidatorRefresher};

/// A unit of work run on a fixed interval.
#[async_trait]
pub trait PeriodicTask: Debug + Send + Sync + 'static {
    /// Name used in logs and metric labels.
    fn name(&self) -> &'static str;

    /// Runs one tick.
    async fn run(&self) -> Result<(), TaskError>;
}

/// When a periodic task runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSchedule {
    /// Time between ticks.
    pub interval: Duration,
    /// Delay before the first tick.
    pub initial_delay: Duration,
}

impl TaskSchedule {
    /// Runs immediately, then every `interval`.
    pub const fn every(interval: Duration) -> Self {
        Self { interval, initial_delay: Duration::ZERO }
    }

    /// Delays the first tick by `delay`.
    pub const fn after(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }
}

/// Owns the periodic loops of the process.
#[derive(Debug)]
pub struct TaskSupervisor {
    config: SupervisorConfig,
    cancellation: CancellationToken,
    loops: JoinSet<()>,
}

impl TaskSupervisor {
    /// Creates a new [`TaskSupervisor`] whose loops stop when `cancellation` fires.
    pub fn new(config: SupervisorConfig, cancellation: CancellationToken) -> Self {
        Self { config, cancellation, loops: JoinSet::new() }
    }

    /// Starts a supervised loop for `task`.
    pub fn spawn(&mut self, task: Arc<dyn PeriodicTask>, schedule: TaskSchedule) {
        info!(target: "mirror::tasks", task = task.name(), interval = ?schedule.interval, "Starting periodic task");
        self.loops.spawn(supervise(task, schedule, self.config.clone(), self.cancellation.clone()));
    }

    /// Number of loops started.
    pub fn len(&self) -> usize {
        self.loops.len()
    }

    /// Returns `true` if no loop was started.
    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    /// Waits for every loop to stop.
    pub async fn join(mut self) {
        while let Some(result) = self.loops.join_next().await {
            if let Err(err) = result {
                error!(target: "mirror::tasks", %err, "Supervised loop aborted");
            }
        }
    }
}

/// Runs `task` until cancellation, restarting it after panics.
async fn supervise(
    task: Arc<dyn PeriodicTask>,
    schedule: TaskSchedule,
    config: SupervisorConfig,
    cancellation: CancellationToken,
) {
    let mut initial_delay = schedule.initial_delay;
    let mut restarts = 0u32;
    loop {
        let run = AssertUnwindSafe(run_periodic(
            task.as_ref(),
            initial_delay,
            schedule.interval,
            &config,
            &cancellation,
        ))
        .catch_unwind()
        .await;
        let Err(panic) = run else {
            return;
        };

        restarts += 1;
        metrics::counter!(Metrics::TASK_RESTARTS, "task" => task.name()).increment(1);
        if restarts > config.max_restarts {
            error!(
                target: "mirror::tasks",
                task = task.name(),
                restarts,
                reason = panic_message(panic.as_ref()),
                "Periodic task keeps panicking, giving up"
            );
            return;
        }

        let backoff = restart_backoff(&config, restarts);
        error!(
            target: "mirror::tasks",
            task = task.name(),
            restarts,
            ?backoff,
            reason = panic_message(panic.as_ref()),
            "Periodic task panicked, restarting"
        );
        tokio::select! {
            _ = cancellation.cancelled() => return,
            _ = tokio::time::sleep(backoff) => {}
        }
        initial_delay = Duration::ZERO;
    }
}

async fn run_periodic(
    task: &dyn PeriodicTask,
    initial_delay: Duration,
    interval: Duration,
    config: &SupervisorConfig,
    cancellation: &CancellationToken,
) {
    if !initial_delay.is_zero() {
        tokio::select! {
            _ = cancellation.cancelled() => return,
            _ = tokio::time::sleep(initial_delay) => {}
        }
    }

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = cancellation.cancelled() => {
                info!(target: "mirror::tasks", task = task.name(), "Cancellation requested, stopping...");
                return;
            }
            _ = ticker.tick() => {
                run_with_retry(task, config).await;
            }
        }
    }
}

/// Runs one tick of `task`, retrying failures with exponential backoff.
///
/// Returns `true` if an attempt succeeded.
pub async fn run_with_retry(task: &dyn PeriodicTask, config: &SupervisorConfig) -> bool {
    let policy = ExponentialBuilder::default()
        .with_min_delay(config.retry_backoff)
        .with_max_delay(config.max_restart_backoff)
        .with_max_times(config.max_attempts.saturating_sub(1) as usize);

    let result = (|| task.run())
        .retry(policy)
        .notify(|err, delay| {
            warn!(target: "mirror::tasks", task = task.name(), %err, ?delay, "Periodic task failed, retrying");
        })
        .await;

    match result {
        Ok(()) => true,
        Err(err) => {
            metrics::counter!(Metrics::TASK_FAILURES, "task" => task.name()).increment(1);
            error!(
                target: "mirror::tasks",
                task = task.name(),
                attempts = config.max_attempts,
                %err,
                "Periodic task failed, waiting for the next tick"
            );
            false
        }
    }
}

fn restart_backoff(config: &SupervisorConfig, restarts: u32) -> Duration {
    let factor = 1u32 << restarts.saturating_sub(1).min(16);
    config.restart_backoff.saturating_mul(factor).min(config.max_restart_backoff)
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[async_trait]
impl<C, S> PeriodicTask for SyncOrchestrator<C, S>
where
    C: NodeClient + 'static,
    S: MirrorStore + 'static,
{
    fn name(&self) -> &'static str {
        "block_sync"
    }

    async fn run(&self) -> Result<(), TaskError> {
        self.sync_once().await?;
        Ok(())
    }
}

#[async_trait]
impl<C, S> PeriodicTask for GapDetector<C, S>
where
    C: NodeClient + 'static,
    S: MirrorStore + 'static,
{
    fn name(&self) -> &'static str {
        "gap_detection"
    }

    async fn run(&self) -> Result<(), TaskError> {
        self.run_once().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use zond_mirror_rpc::RpcError;

    /// Panics on the first `panics` calls, then fails `failures` calls, then succeeds.
    #[derive(Debug, Default)]
    struct Scripted {
        panics: u32,
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl PeriodicTask for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn run(&self) -> Result<(), TaskError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.panics {
                panic!("scripted panic");
            }
            if call < self.panics + self.failures {
                return Err(RpcError::Timeout.into());
            }
            Ok(())
        }
    }

    fn config() -> SupervisorConfig {
        SupervisorConfig {
            max_attempts: 3,
            retry_backoff: Duration::from_millis(10),
            max_restarts: 2,
            restart_backoff: Duration::from_millis(100),
            max_restart_backoff: Duration::from_secs(1),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_retries_until_success() {
        let task = Scripted { failures: 2, ..Default::default() };
        assert!(run_with_retry(&task, &config()).await);
        assert_eq!(task.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_gives_up_after_max_attempts() {
        let task = Scripted { failures: 10, ..Default::default() };
        assert!(!run_with_retry(&task, &config()).await);
        assert_eq!(task.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_loop_is_restarted() {
        let task = Arc::new(Scripted { panics: 1, ..Default::default() });
        let cancellation = CancellationToken::new();
        let mut supervisor = TaskSupervisor::new(config(), cancellation.clone());
        supervisor.spawn(task.clone(), TaskSchedule::every(Duration::from_secs(1)));

        tokio::time::sleep(Duration::from_millis(3500)).await;
        cancellation.cancel();
        supervisor.join().await;

        assert!(task.calls.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restarts_are_bounded() {
        let task = Arc::new(Scripted { panics: u32::MAX, ..Default::default() });
        let mut supervisor = TaskSupervisor::new(config(), CancellationToken::new());
        supervisor.spawn(task.clone(), TaskSchedule::every(Duration::from_secs(1)));

        supervisor.join().await;
        assert_eq!(task.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_delay_is_respected() {
        let task = Arc::new(Scripted::default());
        let cancellation = CancellationToken::new();
        let mut supervisor = TaskSupervisor::new(config(), cancellation.clone());
        supervisor.spawn(
            task.clone(),
            TaskSchedule::every(Duration::from_secs(10)).after(Duration::from_secs(5)),
        );

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(task.calls.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(task.calls.load(Ordering::SeqCst), 1);

        cancellation.cancel();
        supervisor.join().await;
    }

    #[test]
    fn test_restart_backoff_is_capped() {
        let config = config();
        assert_eq!(restart_backoff(&config, 1), Duration::from_millis(100));
        assert_eq!(restart_backoff(&config, 3), Duration::from_millis(400));
        assert_eq!(restart_backoff(&config, 20), Duration::from_secs(1));
    }
}
