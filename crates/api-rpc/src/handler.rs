//! RPC Method Handlers
//!
//! Implements the business logic for each JSON-RPC method.

use crate::error::{throttled, to_rpc_error};
use crate::rate_limiter::RateLimiter;
use crate::types::{
    AssignRequest, AssignResponse, CreateQueueRequest, CreateQueueResponse, DeleteQueueRequest,
    DeleteQueueResponse, ListQueuesRequest, ListQueuesResponse, QueueInfo, QueueSizeRequest,
    QueueSizeResponse, SendMessagesRequest, SendMessagesResponse, SetConcurrencyRequest,
    SetConcurrencyResponse, StatsRequest, StatsResponse,
};
use jsonrpsee::types::ErrorObjectOwned;
use siphon_core::application::{MasterAllocator, QueueDescriptor};
use siphon_core::domain::QueueRecord;
use siphon_core::error::AppError;
use siphon_core::port::{
    AssignmentRepository, IdProvider, QueueRepository, QueueService, TimeProvider,
    WorkerRepository,
};
use std::sync::Arc;
use tracing::info;

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    allocator: Arc<MasterAllocator>,
    worker_repo: Arc<dyn WorkerRepository>,
    queue_repo: Arc<dyn QueueRepository>,
    assignment_repo: Arc<dyn AssignmentRepository>,
    queue_service: Arc<dyn QueueService>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    rate_limiter: Arc<RateLimiter>,
    start_time: std::time::Instant,
}

impl RpcHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        allocator: Arc<MasterAllocator>,
        worker_repo: Arc<dyn WorkerRepository>,
        queue_repo: Arc<dyn QueueRepository>,
        assignment_repo: Arc<dyn AssignmentRepository>,
        queue_service: Arc<dyn QueueService>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        // Default: 200 burst, 100 req/sec (configurable via env)
        let max_burst: u32 = std::env::var("SIPHON_RATE_LIMIT_BURST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(200);

        let rate_per_sec: u32 = std::env::var("SIPHON_RATE_LIMIT_RATE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(100);

        Self {
            allocator,
            worker_repo,
            queue_repo,
            assignment_repo,
            queue_service,
            id_provider,
            time_provider,
            rate_limiter: Arc::new(RateLimiter::new(max_burst, rate_per_sec)),
            start_time: std::time::Instant::now(),
        }
    }

    /// cluster.assign.v1
    pub async fn assign(&self, params: AssignRequest) -> Result<AssignResponse, ErrorObjectOwned> {
        if !self.rate_limiter.check() {
            return Err(throttled());
        }

        // Resolve the queue_ref from persisted metadata when the caller only
        // names the queue
        let (queue_ref, queue_id) = match params.queue_ref {
            Some(queue_ref) => (queue_ref, params.queue_id),
            None => {
                let record = self
                    .queue_repo
                    .find_by_name(&params.name)
                    .await
                    .map_err(to_rpc_error)?
                    .ok_or_else(|| {
                        to_rpc_error(AppError::Validation(format!(
                            "queue_ref missing and queue {} has no persisted metadata",
                            params.name
                        )))
                    })?;
                (record.queue_ref, params.queue_id.or(Some(record.id)))
            }
        };

        let outcome = self
            .allocator
            .assign_queue(QueueDescriptor {
                name: params.name,
                queue_ref,
                queue_id,
            })
            .await
            .map_err(to_rpc_error)?;

        Ok(AssignResponse {
            success: true,
            already_assigned: outcome.already_assigned,
            worker: outcome.worker_id,
            queue_ref: outcome.queue_ref,
        })
    }

    /// queue.create.v1
    pub async fn create_queue(
        &self,
        params: CreateQueueRequest,
    ) -> Result<CreateQueueResponse, ErrorObjectOwned> {
        let concurrency_limit = params
            .concurrency_limit
            .unwrap_or(siphon_core::domain::MAX_CONCURRENCY_LIMIT);

        let queue_ref = self
            .queue_service
            .create_queue(&params.name)
            .await
            .map_err(to_rpc_error)?;

        let record = QueueRecord::new(
            self.id_provider.generate_id(),
            &params.name,
            &queue_ref,
            concurrency_limit,
            self.time_provider.now_millis(),
        )
        .map_err(|e| to_rpc_error(e.into()))?;

        self.queue_repo
            .insert(&record)
            .await
            .map_err(to_rpc_error)?;

        info!(name = %params.name, queue_ref = %queue_ref, "Queue created");
        Ok(CreateQueueResponse {
            name: record.name,
            queue_ref: record.queue_ref,
            concurrency_limit: record.concurrency_limit,
        })
    }

    /// queue.delete.v1
    pub async fn delete_queue(
        &self,
        params: DeleteQueueRequest,
    ) -> Result<DeleteQueueResponse, ErrorObjectOwned> {
        let record = self
            .queue_repo
            .find_by_name(&params.name)
            .await
            .map_err(to_rpc_error)?
            .ok_or_else(|| {
                to_rpc_error(AppError::NotFound(format!("Queue {} not found", params.name)))
            })?;

        self.queue_service
            .delete_queue(&record.queue_ref)
            .await
            .map_err(to_rpc_error)?;
        let deleted = self
            .queue_repo
            .delete_by_name(&params.name)
            .await
            .map_err(to_rpc_error)?;

        info!(name = %params.name, "Queue deleted");
        Ok(DeleteQueueResponse {
            name: params.name,
            deleted,
        })
    }

    /// queue.list.v1
    pub async fn list_queues(
        &self,
        _params: ListQueuesRequest,
    ) -> Result<ListQueuesResponse, ErrorObjectOwned> {
        let queues = self
            .queue_repo
            .find_all()
            .await
            .map_err(to_rpc_error)?
            .into_iter()
            .map(|q| QueueInfo {
                name: q.name,
                queue_ref: q.queue_ref,
                concurrency_limit: q.concurrency_limit,
            })
            .collect();

        Ok(ListQueuesResponse { queues })
    }

    /// queue.send.v1
    pub async fn send_messages(
        &self,
        params: SendMessagesRequest,
    ) -> Result<SendMessagesResponse, ErrorObjectOwned> {
        if !self.rate_limiter.check() {
            return Err(throttled());
        }

        let record = self
            .queue_repo
            .find_by_name(&params.name)
            .await
            .map_err(to_rpc_error)?
            .ok_or_else(|| {
                to_rpc_error(AppError::NotFound(format!("Queue {} not found", params.name)))
            })?;

        let template = params.body.as_deref().unwrap_or("Test message");
        for i in 1..=params.count {
            let body = format!("{} {}", template, i);
            self.queue_service
                .send_message(&record.queue_ref, &body)
                .await
                .map_err(to_rpc_error)?;
        }

        info!(name = %params.name, count = params.count, "Messages sent");
        Ok(SendMessagesResponse {
            name: params.name,
            sent: params.count,
        })
    }

    /// queue.size.v1
    pub async fn queue_size(
        &self,
        params: QueueSizeRequest,
    ) -> Result<QueueSizeResponse, ErrorObjectOwned> {
        let record = self
            .queue_repo
            .find_by_name(&params.name)
            .await
            .map_err(to_rpc_error)?
            .ok_or_else(|| {
                to_rpc_error(AppError::NotFound(format!("Queue {} not found", params.name)))
            })?;

        let approximate_size = self
            .queue_service
            .approximate_size(&record.queue_ref)
            .await
            .map_err(to_rpc_error)?;

        Ok(QueueSizeResponse {
            name: params.name,
            approximate_size,
        })
    }

    /// queue.setConcurrency.v1
    pub async fn set_concurrency(
        &self,
        params: SetConcurrencyRequest,
    ) -> Result<SetConcurrencyResponse, ErrorObjectOwned> {
        self.queue_repo
            .set_concurrency(&params.name, params.limit, self.time_provider.now_millis())
            .await
            .map_err(to_rpc_error)?;

        info!(name = %params.name, limit = params.limit, "Concurrency limit updated");
        Ok(SetConcurrencyResponse {
            name: params.name,
            concurrency_limit: params.limit,
        })
    }

    /// admin.stats.v1
    pub async fn stats(&self, _params: StatsRequest) -> Result<StatsResponse, ErrorObjectOwned> {
        let workers = self.worker_repo.find_all().await.map_err(to_rpc_error)?.len() as i64;
        let assignments: i64 = self
            .assignment_repo
            .count_by_worker()
            .await
            .map_err(to_rpc_error)?
            .into_iter()
            .map(|(_, count)| count)
            .sum();
        let queues = self.queue_repo.find_all().await.map_err(to_rpc_error)?.len() as i64;

        Ok(StatsResponse {
            workers,
            assignments,
            queues,
            uptime_seconds: self.start_time.elapsed().as_secs() as i64,
        })
    }
}
