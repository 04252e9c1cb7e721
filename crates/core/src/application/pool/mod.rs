//! Worker pool manager - reconciles persisted assignments onto a pool of
//! consumer slots.
//!
//! The store is the source of truth: a fixed-interval tick reads this
//! worker's assignments and hands any unmapped one to an idle slot, spawning
//! new slots only below the capacity ceiling. Completion deletes the claim
//! and recycles or retires the slot.

mod slots;

pub use slots::{ConsumerPool, ReleaseOutcome, SlotState};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::domain::{AssignmentId, WorkerId, WorkerRecord};
use crate::error::Result;
use crate::port::{
    AssignmentRepository, MessageHandler, QueueRepository, QueueService, TimeProvider,
    WorkerRepository,
};

use super::constants::EVENT_CHANNEL_CAPACITY;
use super::consumer::ConsumerConfig;
use super::protocol::{AssignCommand, SlotEvent, SlotIndex};
use super::shutdown::ShutdownToken;

/// Pool manager configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Ceiling on consumer slots in this pool
    pub max_slots: usize,
    /// Assignments a slot handles before retirement
    pub usage_limit: u32,
    /// Interval between reconciliation ticks
    pub tick_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_slots: super::constants::DEFAULT_MAX_SLOTS,
            usage_limit: super::constants::DEFAULT_USAGE_LIMIT,
            tick_interval: super::constants::DEFAULT_TICK_INTERVAL,
        }
    }
}

pub struct WorkerPoolManager {
    worker_id: WorkerId,
    worker_repo: Arc<dyn WorkerRepository>,
    assignment_repo: Arc<dyn AssignmentRepository>,
    time_provider: Arc<dyn TimeProvider>,
    pool: ConsumerPool,
    active: HashMap<AssignmentId, SlotIndex>,
    events_rx: mpsc::Receiver<SlotEvent>,
    tick_interval: Duration,
}

impl WorkerPoolManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        worker_id: impl Into<String>,
        worker_repo: Arc<dyn WorkerRepository>,
        assignment_repo: Arc<dyn AssignmentRepository>,
        queue_repo: Arc<dyn QueueRepository>,
        queue_service: Arc<dyn QueueService>,
        handler: Arc<dyn MessageHandler>,
        time_provider: Arc<dyn TimeProvider>,
        pool_config: PoolConfig,
        consumer_config: ConsumerConfig,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let pool = ConsumerPool::new(
            pool_config.max_slots,
            pool_config.usage_limit,
            queue_service,
            queue_repo,
            handler,
            consumer_config,
            events_tx,
        );
        Self {
            worker_id: worker_id.into(),
            worker_repo,
            assignment_repo,
            time_provider,
            pool,
            active: HashMap::new(),
            events_rx,
            tick_interval: pool_config.tick_interval,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Register this worker in the store so the allocator can see it
    pub async fn register(&self) -> Result<()> {
        let record = WorkerRecord::new(&self.worker_id, self.time_provider.now_millis());
        self.worker_repo.insert(&record).await?;
        info!(worker_id = %self.worker_id, "Worker registered");
        Ok(())
    }

    /// Event/tick loop. A failed store read is logged and retried on the
    /// next tick; nothing here is fatal to the manager.
    pub async fn run(mut self, mut shutdown: ShutdownToken) -> Result<()> {
        info!(worker_id = %self.worker_id, "Worker pool manager started");
        let mut tick = tokio::time::interval(self.tick_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = self.reconcile().await {
                        warn!(
                            worker_id = %self.worker_id,
                            error = %e,
                            "Reconcile failed, retrying next tick"
                        );
                    }
                }
                Some(event) = self.events_rx.recv() => {
                    self.handle_event(event).await;
                }
                _ = shutdown.wait() => {
                    info!(worker_id = %self.worker_id, "Worker pool manager shutting down");
                    break;
                }
            }
        }
        Ok(())
    }

    /// One reconciliation pass: every persisted assignment for this worker
    /// that has no slot mapping gets an idle slot, a freshly spawned slot,
    /// or stays pending when the pool is saturated.
    pub async fn reconcile(&mut self) -> Result<()> {
        let assignments = self.assignment_repo.find_by_worker(&self.worker_id).await?;

        for assignment in assignments {
            if self.active.contains_key(&assignment.id) {
                continue;
            }

            let Some(slot) = self.pool.acquire() else {
                debug!(
                    worker_id = %self.worker_id,
                    assignment_id = %assignment.id,
                    pool_size = self.pool.len(),
                    "Pool saturated, assignment stays pending"
                );
                continue;
            };

            let command = AssignCommand {
                assignment_id: assignment.id.clone(),
                queue_ref: assignment.queue_ref.clone(),
            };

            match self.pool.dispatch(slot, command).await {
                Ok(()) => {
                    self.active.insert(assignment.id.clone(), slot);
                    info!(
                        worker_id = %self.worker_id,
                        assignment_id = %assignment.id,
                        queue_ref = %assignment.queue_ref,
                        slot,
                        "Assignment dispatched"
                    );
                }
                Err(_) => {
                    warn!(
                        worker_id = %self.worker_id,
                        assignment_id = %assignment.id,
                        slot,
                        "Slot rejected assignment, slot dropped"
                    );
                }
            }
        }
        Ok(())
    }

    /// Apply one slot event to pool state
    pub async fn handle_event(&mut self, event: SlotEvent) {
        match event {
            SlotEvent::Started {
                assignment_id,
                slot,
            } => {
                debug!(
                    worker_id = %self.worker_id,
                    assignment_id = %assignment_id,
                    slot,
                    "Assignment started"
                );
            }
            SlotEvent::Done {
                assignment_id,
                slot,
                total_processed,
            } => {
                self.active.remove(&assignment_id);

                // Deleting the claim makes the queue re-claimable if it is
                // repopulated. On failure the mapping is already gone, so a
                // later tick re-dispatches the assignment and the delete is
                // retried after the (empty) re-drain.
                match self.assignment_repo.delete(&assignment_id).await {
                    Ok(_) => {
                        info!(
                            worker_id = %self.worker_id,
                            assignment_id = %assignment_id,
                            slot,
                            total_processed,
                            "Assignment completed"
                        );
                    }
                    Err(e) => {
                        error!(
                            worker_id = %self.worker_id,
                            assignment_id = %assignment_id,
                            error = %e,
                            "Failed to delete completed assignment"
                        );
                    }
                }

                match self.pool.release(slot) {
                    Some(ReleaseOutcome::Retired { usage_count }) => {
                        info!(
                            worker_id = %self.worker_id,
                            slot,
                            usage_count,
                            "Consumer slot retired"
                        );
                    }
                    Some(ReleaseOutcome::Idle { .. }) | None => {}
                }
            }
            SlotEvent::Exited { slot } => {
                if self.pool.remove(slot) {
                    warn!(
                        worker_id = %self.worker_id,
                        slot,
                        "Consumer slot exited unexpectedly"
                    );
                    // Purge the mapping so the assignment reappears as
                    // unmapped on a future tick (at-least-once recovery,
                    // possibly delayed).
                    self.active.retain(|_, s| *s != slot);
                } else {
                    debug!(slot, "Exit event for retired slot");
                }
            }
        }
    }

    /// Pool size, for tests and stats
    pub fn pool_len(&self) -> usize {
        self.pool.len()
    }

    /// Active assignment count, for tests and stats
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Drain any already-queued slot events without waiting
    pub async fn drain_pending_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::constants::DEFAULT_CONCURRENCY_LIMIT;
    use crate::domain::Assignment;
    use crate::port::assignment_repository::mocks::InMemoryAssignmentRepository;
    use crate::port::message_handler::mocks::MockMessageHandler;
    use crate::port::queue_repository::mocks::InMemoryQueueRepository;
    use crate::port::queue_service::mocks::MockQueueService;
    use crate::port::time_provider::mocks::MockTimeProvider;
    use crate::port::worker_repository::mocks::InMemoryWorkerRepository;

    fn test_consumer_config() -> ConsumerConfig {
        ConsumerConfig {
            default_concurrency: DEFAULT_CONCURRENCY_LIMIT,
            receive_wait: Duration::from_millis(0),
            visibility_timeout: Duration::from_secs(10),
            poll_backoff: Duration::from_millis(10),
        }
    }

    fn manager(
        assignment_repo: Arc<InMemoryAssignmentRepository>,
        queue_service: Arc<MockQueueService>,
        max_slots: usize,
        usage_limit: u32,
    ) -> WorkerPoolManager {
        WorkerPoolManager::new(
            "w-test",
            Arc::new(InMemoryWorkerRepository::new()),
            assignment_repo,
            Arc::new(InMemoryQueueRepository::new()),
            queue_service,
            Arc::new(MockMessageHandler::new_success()),
            Arc::new(MockTimeProvider::new(1000)),
            PoolConfig {
                max_slots,
                usage_limit,
                tick_interval: Duration::from_millis(20),
            },
            test_consumer_config(),
        )
    }

    async fn wait_for_done(manager: &mut WorkerPoolManager) -> (AssignmentId, SlotIndex, u64) {
        loop {
            let event = manager.events_rx.recv().await.expect("event channel open");
            if let SlotEvent::Done {
                assignment_id,
                slot,
                total_processed,
            } = &event
            {
                let result = (assignment_id.clone(), *slot, *total_processed);
                manager.handle_event(event).await;
                return result;
            }
            manager.handle_event(event).await;
        }
    }

    #[tokio::test]
    async fn reconcile_dispatches_unmapped_assignments() {
        let assignments = Arc::new(InMemoryAssignmentRepository::new());
        assignments
            .insert(&Assignment::new("as-1", "memory://orders", "w-test", None))
            .await
            .unwrap();
        let queue_service = Arc::new(MockQueueService::new(vec!["m1".to_string()]));

        let mut manager = manager(assignments.clone(), queue_service, 5, 5);
        manager.reconcile().await.unwrap();

        assert_eq!(manager.active_len(), 1);
        assert_eq!(manager.pool_len(), 1);

        let (assignment_id, _, total) = wait_for_done(&mut manager).await;
        assert_eq!(assignment_id, "as-1");
        assert_eq!(total, 1);

        // Completion removed the mapping and deleted the claim
        assert_eq!(manager.active_len(), 0);
        assert!(assignments.is_empty());
    }

    #[tokio::test]
    async fn idle_slot_is_reused_before_spawning() {
        let assignments = Arc::new(InMemoryAssignmentRepository::new());
        assignments
            .insert(&Assignment::new("as-1", "memory://a", "w-test", None))
            .await
            .unwrap();
        let queue_service = Arc::new(MockQueueService::new(vec![]));

        let mut manager = manager(assignments.clone(), queue_service, 5, 5);
        manager.reconcile().await.unwrap();
        let (_, first_slot, _) = wait_for_done(&mut manager).await;
        assert_eq!(manager.pool_len(), 1);

        // Second assignment arrives after the first completed
        assignments
            .insert(&Assignment::new("as-2", "memory://b", "w-test", None))
            .await
            .unwrap();
        manager.reconcile().await.unwrap();
        let (_, second_slot, _) = wait_for_done(&mut manager).await;

        assert_eq!(first_slot, second_slot, "idle slot should be reused");
        assert_eq!(manager.pool_len(), 1, "no extra slot should be spawned");
    }

    #[tokio::test]
    async fn saturated_pool_leaves_assignments_pending() {
        let assignments = Arc::new(InMemoryAssignmentRepository::new());
        for i in 0..3 {
            assignments
                .insert(&Assignment::new(
                    format!("as-{}", i),
                    format!("memory://q{}", i),
                    "w-test",
                    None,
                ))
                .await
                .unwrap();
        }
        // Events are not pumped here, so the single slot stays mapped Busy
        let queue_service = Arc::new(MockQueueService::new(vec![]));

        let mut manager = manager(assignments.clone(), queue_service, 1, 5);
        manager.reconcile().await.unwrap();

        assert_eq!(manager.pool_len(), 1, "capacity ceiling respected");
        assert_eq!(manager.active_len(), 1, "only one assignment mapped");
    }

    #[tokio::test]
    async fn slot_retires_at_usage_limit() {
        let assignments = Arc::new(InMemoryAssignmentRepository::new());
        let queue_service = Arc::new(MockQueueService::new(vec![]));
        let mut manager = manager(assignments.clone(), queue_service, 5, 2);

        for round in 0..2 {
            assignments
                .insert(&Assignment::new(
                    format!("as-{}", round),
                    format!("memory://q{}", round),
                    "w-test",
                    None,
                ))
                .await
                .unwrap();
            manager.reconcile().await.unwrap();
            wait_for_done(&mut manager).await;
        }

        // Two completions with usage_limit 2: the slot is gone
        assert_eq!(manager.pool_len(), 0, "slot should be retired");
    }

    #[tokio::test]
    async fn handler_panic_does_not_kill_the_slot() {
        let assignments = Arc::new(InMemoryAssignmentRepository::new());
        assignments
            .insert(&Assignment::new("as-1", "memory://orders", "w-test", None))
            .await
            .unwrap();
        // The mock hands the message out only once, so after the panicking
        // handler loses it the re-poll sees an empty queue.
        let queue_service = Arc::new(MockQueueService::new(vec!["m1".to_string()]));

        let mut manager = WorkerPoolManager::new(
            "w-test",
            Arc::new(InMemoryWorkerRepository::new()),
            assignments.clone(),
            Arc::new(InMemoryQueueRepository::new()),
            queue_service,
            Arc::new(MockMessageHandler::new_panic("poison")),
            Arc::new(MockTimeProvider::new(1000)),
            PoolConfig {
                max_slots: 5,
                usage_limit: 5,
                tick_interval: Duration::from_millis(20),
            },
            test_consumer_config(),
        );

        manager.reconcile().await.unwrap();
        assert_eq!(manager.active_len(), 1);

        // The message task panics inside the consumer's JoinSet; the drain
        // still completes (0 processed) and the slot survives for reuse.
        let (_, _, total) = wait_for_done(&mut manager).await;
        assert_eq!(total, 0);
        assert_eq!(manager.pool_len(), 1);
        assert!(assignments.is_empty(), "claim deleted after drain");
    }

    #[tokio::test]
    async fn exited_slot_is_purged_and_assignment_redispatched() {
        let assignments = Arc::new(InMemoryAssignmentRepository::new());
        assignments
            .insert(&Assignment::new("as-1", "memory://orders", "w-test", None))
            .await
            .unwrap();
        let queue_service = Arc::new(MockQueueService::new(vec![]));

        let mut manager = manager(assignments.clone(), queue_service, 5, 5);
        manager.reconcile().await.unwrap();
        assert_eq!(manager.active_len(), 1);

        // Simulate the consumer task dying mid-assignment
        manager.handle_event(SlotEvent::Exited { slot: 0 }).await;
        assert_eq!(manager.pool_len(), 0);
        assert_eq!(
            manager.active_len(),
            0,
            "mapping purged so the claim is picked up again"
        );

        // The claim is still live in the store; the next tick re-dispatches
        assert_eq!(assignments.len(), 1);
        manager.reconcile().await.unwrap();
        assert_eq!(manager.active_len(), 1);
        assert_eq!(manager.pool_len(), 1);
    }

    #[tokio::test]
    async fn register_inserts_worker_record() {
        let worker_repo = Arc::new(InMemoryWorkerRepository::new());
        let manager = WorkerPoolManager::new(
            "w-reg",
            worker_repo.clone(),
            Arc::new(InMemoryAssignmentRepository::new()),
            Arc::new(InMemoryQueueRepository::new()),
            Arc::new(MockQueueService::new(vec![])),
            Arc::new(MockMessageHandler::new_success()),
            Arc::new(MockTimeProvider::new(4242)),
            PoolConfig::default(),
            test_consumer_config(),
        );

        manager.register().await.unwrap();
        let workers = worker_repo.find_all().await.unwrap();
        assert_eq!(workers.len(), 1);
        assert_eq!(workers[0].id, "w-reg");
        assert_eq!(workers[0].started_at, 4242);
    }
}
