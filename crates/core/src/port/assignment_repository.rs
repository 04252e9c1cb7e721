// Assignment Repository Port (Interface)

use crate::domain::{Assignment, AssignmentId, WorkerId};
use crate::error::Result;
use async_trait::async_trait;

/// Repository interface for assignment claim records.
///
/// `insert` must surface a store-level uniqueness violation on `queue_ref` as
/// `AppError::Conflict`: the allocator relies on it to resolve claim races
/// with a read-back instead of a distributed lock.
#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    /// Insert a new assignment; `AppError::Conflict` if the queue_ref is
    /// already claimed
    async fn insert(&self, assignment: &Assignment) -> Result<()>;

    /// Find the live assignment for a queue, if any
    async fn find_by_queue_ref(&self, queue_ref: &str) -> Result<Option<Assignment>>;

    /// All assignments owned by one worker
    async fn find_by_worker(&self, worker_id: &str) -> Result<Vec<Assignment>>;

    /// Current load per worker: assignment count grouped by worker_id
    async fn count_by_worker(&self) -> Result<Vec<(WorkerId, i64)>>;

    /// Delete an assignment by id; returns true if a row was removed
    async fn delete(&self, id: &AssignmentId) -> Result<bool>;
}

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory assignment store enforcing the queue_ref uniqueness
    /// invariant, so allocator race recovery is testable without a database.
    pub struct InMemoryAssignmentRepository {
        assignments: Mutex<Vec<Assignment>>,
    }

    impl InMemoryAssignmentRepository {
        pub fn new() -> Self {
            Self {
                assignments: Mutex::new(Vec::new()),
            }
        }

        pub fn len(&self) -> usize {
            self.assignments.lock().unwrap().len()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }
    }

    impl Default for InMemoryAssignmentRepository {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl AssignmentRepository for InMemoryAssignmentRepository {
        async fn insert(&self, assignment: &Assignment) -> Result<()> {
            let mut assignments = self.assignments.lock().unwrap();
            if assignments
                .iter()
                .any(|a| a.queue_ref == assignment.queue_ref)
            {
                return Err(AppError::Conflict(format!(
                    "queue {} already claimed",
                    assignment.queue_ref
                )));
            }
            assignments.push(assignment.clone());
            Ok(())
        }

        async fn find_by_queue_ref(&self, queue_ref: &str) -> Result<Option<Assignment>> {
            Ok(self
                .assignments
                .lock()
                .unwrap()
                .iter()
                .find(|a| a.queue_ref == queue_ref)
                .cloned())
        }

        async fn find_by_worker(&self, worker_id: &str) -> Result<Vec<Assignment>> {
            Ok(self
                .assignments
                .lock()
                .unwrap()
                .iter()
                .filter(|a| a.worker_id == worker_id)
                .cloned()
                .collect())
        }

        async fn count_by_worker(&self) -> Result<Vec<(WorkerId, i64)>> {
            let assignments = self.assignments.lock().unwrap();
            let mut counts: HashMap<WorkerId, i64> = HashMap::new();
            for assignment in assignments.iter() {
                *counts.entry(assignment.worker_id.clone()).or_insert(0) += 1;
            }
            Ok(counts.into_iter().collect())
        }

        async fn delete(&self, id: &AssignmentId) -> Result<bool> {
            let mut assignments = self.assignments.lock().unwrap();
            let before = assignments.len();
            assignments.retain(|a| &a.id != id);
            Ok(assignments.len() < before)
        }
    }
}
