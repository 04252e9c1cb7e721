// Worker Repository Port (Interface)

use crate::domain::WorkerRecord;
use crate::error::Result;
use async_trait::async_trait;

/// Repository interface for the worker registry
#[async_trait]
pub trait WorkerRepository: Send + Sync {
    /// Register a worker (one row per live worker process)
    async fn insert(&self, worker: &WorkerRecord) -> Result<()>;

    /// List all registered workers
    async fn find_all(&self) -> Result<Vec<WorkerRecord>>;

    /// Clear the registry (full-system restart); returns rows removed
    async fn delete_all(&self) -> Result<u64>;
}

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// In-memory worker registry for tests
    pub struct InMemoryWorkerRepository {
        workers: Mutex<Vec<WorkerRecord>>,
    }

    impl InMemoryWorkerRepository {
        pub fn new() -> Self {
            Self {
                workers: Mutex::new(Vec::new()),
            }
        }
    }

    impl Default for InMemoryWorkerRepository {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl WorkerRepository for InMemoryWorkerRepository {
        async fn insert(&self, worker: &WorkerRecord) -> Result<()> {
            let mut workers = self.workers.lock().unwrap();
            if workers.iter().any(|w| w.id == worker.id) {
                return Err(crate::error::AppError::Conflict(format!(
                    "worker {} already registered",
                    worker.id
                )));
            }
            workers.push(worker.clone());
            Ok(())
        }

        async fn find_all(&self) -> Result<Vec<WorkerRecord>> {
            Ok(self.workers.lock().unwrap().clone())
        }

        async fn delete_all(&self) -> Result<u64> {
            let mut workers = self.workers.lock().unwrap();
            let removed = workers.len() as u64;
            workers.clear();
            Ok(removed)
        }
    }
}
