// Queue Metadata Repository Port (Interface)

use crate::domain::QueueRecord;
use crate::error::Result;
use async_trait::async_trait;

/// Repository interface for persisted queue metadata
#[async_trait]
pub trait QueueRepository: Send + Sync {
    /// Insert queue metadata (name and queue_ref are unique)
    async fn insert(&self, queue: &QueueRecord) -> Result<()>;

    /// Find queue metadata by administrative name
    async fn find_by_name(&self, name: &str) -> Result<Option<QueueRecord>>;

    /// Find queue metadata by queue service reference
    async fn find_by_queue_ref(&self, queue_ref: &str) -> Result<Option<QueueRecord>>;

    /// List all queue metadata
    async fn find_all(&self) -> Result<Vec<QueueRecord>>;

    /// Update the per-queue concurrency limit (the only mutable field)
    async fn set_concurrency(&self, name: &str, limit: i32, now_millis: i64) -> Result<()>;

    /// Delete queue metadata by name; returns true if a row was removed
    async fn delete_by_name(&self, name: &str) -> Result<bool>;
}

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::sync::Mutex;

    /// In-memory queue metadata store for tests
    pub struct InMemoryQueueRepository {
        queues: Mutex<Vec<QueueRecord>>,
    }

    impl InMemoryQueueRepository {
        pub fn new() -> Self {
            Self {
                queues: Mutex::new(Vec::new()),
            }
        }
    }

    impl Default for InMemoryQueueRepository {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl QueueRepository for InMemoryQueueRepository {
        async fn insert(&self, queue: &QueueRecord) -> Result<()> {
            let mut queues = self.queues.lock().unwrap();
            if queues
                .iter()
                .any(|q| q.name == queue.name || q.queue_ref == queue.queue_ref)
            {
                return Err(AppError::Conflict(format!(
                    "queue {} already exists",
                    queue.name
                )));
            }
            queues.push(queue.clone());
            Ok(())
        }

        async fn find_by_name(&self, name: &str) -> Result<Option<QueueRecord>> {
            Ok(self
                .queues
                .lock()
                .unwrap()
                .iter()
                .find(|q| q.name == name)
                .cloned())
        }

        async fn find_by_queue_ref(&self, queue_ref: &str) -> Result<Option<QueueRecord>> {
            Ok(self
                .queues
                .lock()
                .unwrap()
                .iter()
                .find(|q| q.queue_ref == queue_ref)
                .cloned())
        }

        async fn find_all(&self) -> Result<Vec<QueueRecord>> {
            Ok(self.queues.lock().unwrap().clone())
        }

        async fn set_concurrency(&self, name: &str, limit: i32, now_millis: i64) -> Result<()> {
            let mut queues = self.queues.lock().unwrap();
            match queues.iter_mut().find(|q| q.name == name) {
                Some(queue) => {
                    queue.concurrency_limit = limit;
                    queue.updated_at = now_millis;
                    Ok(())
                }
                None => Err(AppError::NotFound(format!("queue {} not found", name))),
            }
        }

        async fn delete_by_name(&self, name: &str) -> Result<bool> {
            let mut queues = self.queues.lock().unwrap();
            let before = queues.len();
            queues.retain(|q| q.name != name);
            Ok(queues.len() < before)
        }
    }
}
