//! The reconciliation worker pool.
//!
//! A fixed set of symmetric workers share one [`TaskQueue`] and one
//! [`Updater`]. Each worker pops a task, queries the accrual authority,
//! persists forward status transitions and either drops the task (terminal
//! status) or schedules it again.
//!
//! Failed queries back off exponentially and are given up after
//! `max_attempts`. Refusals by the authority (`429`, `5xx`) back off the same
//! way but keep the task; a `Retry-After` additionally pauses every worker,
//! for at most `backoff_max`.
//!
//! Requeues never block a worker: they are timers tracked by the pool that
//! push the task back once their delay has elapsed, so a full queue cannot
//! stall the consumers that are supposed to drain it.

use std::{num::NonZeroUsize, sync::Arc, time::Duration};

use rand::Rng;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{
    Observation, OrderIntake, OrderLedger, OrderStatus, ResultEngine, Task, TaskQueue, Updater,
};

/// Tuning knobs of the pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    /// Delay before polling a non-terminal order again.
    pub poll_interval: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// Consecutive failures after which a task is dropped.
    pub max_attempts: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            queue_capacity: 20,
            poll_interval: Duration::from_secs(1),
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(60),
            max_attempts: 10,
        }
    }
}

impl PoolConfig {
    /// Exponential delay before retry number `attempts` (1-based), capped at
    /// `backoff_max`, jitter not included.
    pub fn backoff(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(20);
        self.backoff_base
            .saturating_mul(1u32 << exponent)
            .min(self.backoff_max)
    }
}

/// Adds up to 50% uniform jitter.
fn with_jitter(delay: Duration) -> Duration {
    let half = u64::try_from(delay.as_millis() / 2).unwrap_or(u64::MAX);
    if half == 0 {
        return delay;
    }
    delay + Duration::from_millis(rand::thread_rng().gen_range(0..=half))
}

struct Shared {
    ledger: Arc<dyn OrderLedger>,
    updater: Updater,
    config: PoolConfig,
    queue: TaskQueue,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

pub struct WorkerPool {
    ledger: Arc<dyn OrderLedger>,
    updater: Updater,
    config: PoolConfig,
}

impl WorkerPool {
    pub fn new(ledger: Arc<dyn OrderLedger>, updater: Updater, config: PoolConfig) -> Self {
        Self {
            ledger,
            updater,
            config,
        }
    }

    /// Spawn the workers. They run until `shutdown` is cancelled; queued and
    /// in-flight tasks are then dropped, not drained.
    pub fn start(self, shutdown: CancellationToken) -> PoolHandle {
        let queue = TaskQueue::new(self.config.queue_capacity);
        let tracker = TaskTracker::new();
        let workers = self.config.workers.max(1);

        let shared = Arc::new(Shared {
            ledger: self.ledger,
            updater: self.updater.with_max_pause(self.config.backoff_max),
            config: self.config,
            queue: queue.clone(),
            tracker: tracker.clone(),
            shutdown: shutdown.clone(),
        });

        for id in 0..workers {
            let worker = Worker {
                id,
                shared: shared.clone(),
            };
            tracker.spawn(worker.run());
        }
        tracing::info!(
            workers,
            capacity = shared.config.queue_capacity,
            "worker pool started"
        );

        PoolHandle {
            queue,
            ledger: shared.ledger.clone(),
            tracker,
            shutdown,
        }
    }
}

/// Handle on a running pool.
pub struct PoolHandle {
    queue: TaskQueue,
    ledger: Arc<dyn OrderLedger>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl PoolHandle {
    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    /// Producer handle for order submissions.
    pub fn intake(&self) -> OrderIntake {
        OrderIntake::new(self.ledger.clone(), self.queue.clone())
    }

    /// Enqueue every non-terminal order found in storage.
    ///
    /// Queue contents do not survive a restart; call this once at startup.
    pub async fn reseed(&self) -> ResultEngine<usize> {
        let pending = self.ledger.pending_orders().await?;
        let mut seeded = 0;
        for (number, status) in pending {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                pushed = self.queue.push(Task::with_status(number, status)) => {
                    if pushed {
                        seeded += 1;
                    }
                }
            }
        }
        tracing::info!(seeded, "queue re-seeded from storage");
        Ok(seeded)
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Wait for all workers and pending requeue timers to finish. Only
    /// returns after the shutdown token is cancelled.
    pub async fn join(self) {
        self.tracker.close();
        self.tracker.wait().await;
        tracing::info!("worker pool stopped");
    }
}

struct Worker {
    id: usize,
    shared: Arc<Shared>,
}

impl Worker {
    async fn run(self) {
        tracing::debug!(worker = self.id, "worker started");
        loop {
            let task = tokio::select! {
                biased;
                _ = self.shared.shutdown.cancelled() => break,
                task = self.shared.queue.pop() => task,
            };
            let Some(task) = task else {
                break;
            };
            if !self.wait_for_throttle().await {
                self.shared.queue.complete(&task.number);
                break;
            }
            self.process(task).await;
        }
        tracing::debug!(worker = self.id, "worker stopped");
    }

    /// Sleep while the accrual client is paused. Returns `false` on shutdown.
    async fn wait_for_throttle(&self) -> bool {
        while let Some(wait) = self.shared.updater.throttle().remaining() {
            tracing::debug!(worker = self.id, wait_ms = wait.as_millis() as u64, "throttled");
            tokio::select! {
                _ = self.shared.shutdown.cancelled() => return false,
                _ = tokio::time::sleep(wait) => {}
            }
        }
        true
    }

    async fn process(&self, mut task: Task) {
        let observation = match self.shared.updater.query_status(&task.number).await {
            Ok(observation) => observation,
            Err(err) => {
                tracing::error!(
                    worker = self.id,
                    order = %task.number,
                    "can't query order status from accrual authority: {err}"
                );
                return self.retry(task);
            }
        };
        let (status, accrual) = match observation {
            Observation::Status { status, accrual } => (status, accrual),
            Observation::Unchanged => {
                task.attempts = 0;
                return self.schedule(task, self.shared.config.poll_interval);
            }
            Observation::Unavailable => return self.back_off(task),
        };
        task.attempts = 0;

        if status != task.status {
            let saved = if status == OrderStatus::Processed {
                self.shared
                    .ledger
                    .update_status_and_accrual(&task.number, status, accrual)
                    .await
            } else {
                self.shared.ledger.update_status(&task.number, status).await
            };
            match saved {
                Ok(true) => tracing::debug!(
                    worker = self.id,
                    order = %task.number,
                    old_status = %task.status,
                    new_status = %status,
                    %accrual,
                    "order status updated"
                ),
                Ok(false) => tracing::debug!(
                    worker = self.id,
                    order = %task.number,
                    new_status = %status,
                    "stored status already at or past the observed one"
                ),
                Err(err) => {
                    tracing::error!(
                        worker = self.id,
                        order = %task.number,
                        "can't save order status: {err}"
                    );
                    return self.retry(task);
                }
            }
            task.status = status;
        }

        if status.is_terminal() {
            tracing::info!(order = %task.number, %status, "order reconciled");
            self.shared.queue.complete(&task.number);
        } else {
            self.schedule(task, self.shared.config.poll_interval);
        }
    }

    /// Count a failure and either back off or give the task up.
    fn retry(&self, mut task: Task) {
        task.attempts += 1;
        let config = &self.shared.config;
        if task.attempts >= config.max_attempts {
            tracing::error!(
                order = %task.number,
                attempts = task.attempts,
                "giving up on order until next restart"
            );
            self.shared.queue.complete(&task.number);
            return;
        }
        let delay = with_jitter(config.backoff(task.attempts));
        self.schedule(task, delay);
    }

    /// Poll again later, a bit later each time the authority refuses.
    /// Refusals never drop the task.
    fn back_off(&self, mut task: Task) {
        task.attempts = task.attempts.saturating_add(1);
        let config = &self.shared.config;
        let delay = with_jitter(config.backoff(task.attempts)).max(config.poll_interval);
        tracing::debug!(
            worker = self.id,
            order = %task.number,
            attempts = task.attempts,
            delay_ms = delay.as_millis() as u64,
            "accrual authority refused, backing off"
        );
        self.schedule(task, delay);
    }

    /// Push `task` back onto the queue after `delay`.
    fn schedule(&self, task: Task, delay: Duration) {
        let queue = self.shared.queue.clone();
        let shutdown = self.shared.shutdown.clone();
        self.shared.tracker.spawn(async move {
            let number = task.number.clone();
            tokio::select! {
                _ = shutdown.cancelled() => queue.complete(&number),
                _ = async {
                    tokio::time::sleep(delay).await;
                    queue.requeue(task).await;
                } => {}
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PoolConfig {
        PoolConfig {
            backoff_base: Duration::from_millis(100),
            backoff_max: Duration::from_secs(1),
            ..PoolConfig::default()
        }
    }

    #[test]
    fn backoff_doubles_until_the_cap() {
        let config = config();
        assert_eq!(config.backoff(1), Duration::from_millis(100));
        assert_eq!(config.backoff(2), Duration::from_millis(200));
        assert_eq!(config.backoff(4), Duration::from_millis(800));
        assert_eq!(config.backoff(5), Duration::from_secs(1));
        assert_eq!(config.backoff(200), Duration::from_secs(1));
    }

    #[test]
    fn jitter_stays_within_half_the_delay() {
        for _ in 0..100 {
            let delay = with_jitter(Duration::from_millis(100));
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(150));
        }
        assert_eq!(with_jitter(Duration::from_millis(1)), Duration::from_millis(1));
    }

    #[test]
    fn default_pool_has_at_least_one_worker() {
        let config = PoolConfig::default();
        assert!(config.workers >= 1);
        assert_eq!(config.queue_capacity, 20);
    }
}
