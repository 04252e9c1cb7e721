//! Master allocator - assigns pending queues to the least-loaded worker.
//!
//! Claim-once semantics without a distributed lock: the store enforces a
//! uniqueness invariant on Assignment.queue_ref, and a losing insert is
//! recovered locally by reading the winning record back.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::{Assignment, QueueRef, WorkerId};
use crate::error::{AppError, Result};
use crate::port::{AssignmentRepository, IdProvider, WorkerRepository};

/// Allocator configuration
#[derive(Debug, Clone)]
pub struct AllocatorConfig {
    /// Ceiling on live assignments per worker
    pub max_worker_load: i64,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            max_worker_load: super::constants::DEFAULT_MAX_WORKER_LOAD,
        }
    }
}

/// Queue descriptor accepted by the assignment request API
#[derive(Debug, Clone)]
pub struct QueueDescriptor {
    pub name: String,
    pub queue_ref: QueueRef,
    pub queue_id: Option<String>,
}

/// Outcome of an assignment request
#[derive(Debug, Clone)]
pub struct AssignOutcome {
    pub already_assigned: bool,
    pub worker_id: WorkerId,
    pub queue_ref: QueueRef,
    pub queue_id: Option<String>,
}

pub struct MasterAllocator {
    worker_repo: Arc<dyn WorkerRepository>,
    assignment_repo: Arc<dyn AssignmentRepository>,
    id_provider: Arc<dyn IdProvider>,
    config: AllocatorConfig,
}

impl MasterAllocator {
    pub fn new(
        worker_repo: Arc<dyn WorkerRepository>,
        assignment_repo: Arc<dyn AssignmentRepository>,
        id_provider: Arc<dyn IdProvider>,
        config: AllocatorConfig,
    ) -> Self {
        Self {
            worker_repo,
            assignment_repo,
            id_provider,
            config,
        }
    }

    /// Assign a queue to the least-loaded registered worker.
    ///
    /// Idempotent: repeated calls for the same queue_ref return the worker
    /// that already holds the claim. At most one durable write per call, and
    /// no retry beyond the single conflict-recovery read.
    pub async fn assign_queue(&self, descriptor: QueueDescriptor) -> Result<AssignOutcome> {
        if descriptor.name.is_empty() || descriptor.queue_ref.is_empty() {
            return Err(AppError::Validation(
                "queue descriptor requires name and queue_ref".to_string(),
            ));
        }

        // Idempotence check before attempting a claim
        if let Some(existing) = self
            .assignment_repo
            .find_by_queue_ref(&descriptor.queue_ref)
            .await?
        {
            info!(
                queue = %descriptor.name,
                worker_id = %existing.worker_id,
                "Queue already assigned"
            );
            return Ok(AssignOutcome {
                already_assigned: true,
                worker_id: existing.worker_id,
                queue_ref: existing.queue_ref,
                queue_id: existing.queue_id,
            });
        }

        let workers = self.worker_repo.find_all().await?;
        if workers.is_empty() {
            warn!(queue = %descriptor.name, "No workers registered");
            return Err(AppError::NoWorkersAvailable);
        }

        let loads: HashMap<WorkerId, i64> = self
            .assignment_repo
            .count_by_worker()
            .await?
            .into_iter()
            .collect();

        // Minimum load below the ceiling; ties go to the first worker seen
        let mut selected: Option<&WorkerId> = None;
        let mut min_load = i64::MAX;
        for worker in &workers {
            let load = loads.get(&worker.id).copied().unwrap_or(0);
            if load < self.config.max_worker_load && load < min_load {
                min_load = load;
                selected = Some(&worker.id);
            }
        }

        let worker_id = match selected {
            Some(id) => id.clone(),
            None => {
                warn!(
                    queue = %descriptor.name,
                    max_worker_load = self.config.max_worker_load,
                    "All workers saturated"
                );
                return Err(AppError::NoEligibleWorker);
            }
        };

        let assignment = Assignment::new(
            self.id_provider.generate_id(),
            &descriptor.queue_ref,
            &worker_id,
            descriptor.queue_id.clone(),
        );

        match self.assignment_repo.insert(&assignment).await {
            Ok(()) => {
                info!(
                    queue = %descriptor.name,
                    worker_id = %worker_id,
                    load = min_load,
                    "Assigned queue to worker"
                );
                Ok(AssignOutcome {
                    already_assigned: false,
                    worker_id,
                    queue_ref: assignment.queue_ref,
                    queue_id: assignment.queue_id,
                })
            }
            Err(AppError::Conflict(_)) => {
                // Lost the claim race; the winner's record is authoritative
                let winner = self
                    .assignment_repo
                    .find_by_queue_ref(&descriptor.queue_ref)
                    .await?
                    .ok_or_else(|| {
                        AppError::Internal(format!(
                            "claim conflict for {} but no surviving assignment",
                            descriptor.queue_ref
                        ))
                    })?;
                info!(
                    queue = %descriptor.name,
                    worker_id = %winner.worker_id,
                    "Claim race resolved by concurrent request"
                );
                Ok(AssignOutcome {
                    already_assigned: true,
                    worker_id: winner.worker_id,
                    queue_ref: winner.queue_ref,
                    queue_id: winner.queue_id,
                })
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::WorkerRecord;
    use crate::port::assignment_repository::mocks::InMemoryAssignmentRepository;
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::worker_repository::mocks::InMemoryWorkerRepository;

    fn allocator(
        workers: Arc<InMemoryWorkerRepository>,
        assignments: Arc<InMemoryAssignmentRepository>,
        max_worker_load: i64,
    ) -> MasterAllocator {
        MasterAllocator::new(
            workers,
            assignments,
            Arc::new(SequentialIdProvider::new()),
            AllocatorConfig { max_worker_load },
        )
    }

    fn descriptor(name: &str) -> QueueDescriptor {
        QueueDescriptor {
            name: name.to_string(),
            queue_ref: format!("memory://{}", name),
            queue_id: None,
        }
    }

    async fn register_workers(repo: &InMemoryWorkerRepository, ids: &[&str]) {
        for (i, id) in ids.iter().enumerate() {
            repo.insert(&WorkerRecord::new(*id, 1000 + i as i64))
                .await
                .unwrap();
        }
    }

    async fn preload(
        repo: &InMemoryAssignmentRepository,
        worker_id: &str,
        count: usize,
        tag: &str,
    ) {
        for i in 0..count {
            repo.insert(&Assignment::new(
                format!("{}-{}", tag, i),
                format!("memory://{}-{}", tag, i),
                worker_id,
                None,
            ))
            .await
            .unwrap();
        }
    }

    #[tokio::test]
    async fn fails_without_workers() {
        let workers = Arc::new(InMemoryWorkerRepository::new());
        let assignments = Arc::new(InMemoryAssignmentRepository::new());
        let allocator = allocator(workers, assignments, 5);

        let result = allocator.assign_queue(descriptor("orders")).await;
        assert!(matches!(result, Err(AppError::NoWorkersAvailable)));
    }

    #[tokio::test]
    async fn rejects_empty_descriptor_fields() {
        let workers = Arc::new(InMemoryWorkerRepository::new());
        let assignments = Arc::new(InMemoryAssignmentRepository::new());
        let allocator = allocator(workers, assignments, 5);

        let result = allocator
            .assign_queue(QueueDescriptor {
                name: String::new(),
                queue_ref: "memory://orders".to_string(),
                queue_id: None,
            })
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn picks_least_loaded_worker() {
        let workers = Arc::new(InMemoryWorkerRepository::new());
        let assignments = Arc::new(InMemoryAssignmentRepository::new());
        register_workers(&workers, &["w-a", "w-b", "w-c"]).await;
        // Loads [0, 2, 4] with ceiling 5: the idle worker wins
        preload(&assignments, "w-b", 2, "b").await;
        preload(&assignments, "w-c", 4, "c").await;

        let allocator = allocator(workers, assignments, 5);
        let outcome = allocator.assign_queue(descriptor("orders")).await.unwrap();

        assert!(!outcome.already_assigned);
        assert_eq!(outcome.worker_id, "w-a");
    }

    #[tokio::test]
    async fn saturated_workers_are_ineligible() {
        let workers = Arc::new(InMemoryWorkerRepository::new());
        let assignments = Arc::new(InMemoryAssignmentRepository::new());
        register_workers(&workers, &["w-a", "w-b", "w-c"]).await;
        for w in ["w-a", "w-b", "w-c"] {
            preload(&assignments, w, 5, w).await;
        }

        let allocator = allocator(workers, assignments, 5);
        let result = allocator.assign_queue(descriptor("orders")).await;
        assert!(matches!(result, Err(AppError::NoEligibleWorker)));
    }

    #[tokio::test]
    async fn ties_break_by_registration_order() {
        let workers = Arc::new(InMemoryWorkerRepository::new());
        let assignments = Arc::new(InMemoryAssignmentRepository::new());
        register_workers(&workers, &["w-a", "w-b"]).await;

        let allocator = allocator(workers, assignments, 5);
        let outcome = allocator.assign_queue(descriptor("orders")).await.unwrap();
        assert_eq!(outcome.worker_id, "w-a");
    }

    #[tokio::test]
    async fn repeated_calls_are_idempotent() {
        let workers = Arc::new(InMemoryWorkerRepository::new());
        let assignments = Arc::new(InMemoryAssignmentRepository::new());
        register_workers(&workers, &["w-a"]).await;

        let allocator = allocator(workers, assignments.clone(), 5);
        let first = allocator.assign_queue(descriptor("orders")).await.unwrap();
        let second = allocator.assign_queue(descriptor("orders")).await.unwrap();

        assert!(!first.already_assigned);
        assert!(second.already_assigned);
        assert_eq!(first.worker_id, second.worker_id);
        assert_eq!(assignments.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_claims_yield_one_assignment() {
        let workers = Arc::new(InMemoryWorkerRepository::new());
        let assignments = Arc::new(InMemoryAssignmentRepository::new());
        register_workers(&workers, &["w-a"]).await;

        let allocator = Arc::new(allocator(workers, assignments.clone(), 5));

        let a = {
            let allocator = allocator.clone();
            tokio::spawn(async move { allocator.assign_queue(descriptor("orders")).await })
        };
        let b = {
            let allocator = allocator.clone();
            tokio::spawn(async move { allocator.assign_queue(descriptor("orders")).await })
        };

        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();

        assert_eq!(assignments.len(), 1);
        assert_eq!(a.worker_id, b.worker_id);
    }
}
