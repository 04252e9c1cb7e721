//! RPC Request/Response Types
//!
//! Defines the JSON-RPC method parameters and results.

use serde::{Deserialize, Serialize};

/// cluster.assign.v1 - Request assignment of a queue to a worker
#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub name: String,
    /// Resolved from persisted metadata when omitted
    #[serde(default)]
    pub queue_ref: Option<String>,
    #[serde(default)]
    pub queue_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssignResponse {
    pub success: bool,
    pub already_assigned: bool,
    pub worker: String,
    pub queue_ref: String,
}

/// queue.create.v1 - Create a queue and persist its metadata
#[derive(Debug, Deserialize)]
pub struct CreateQueueRequest {
    pub name: String,
    #[serde(default)]
    pub concurrency_limit: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateQueueResponse {
    pub name: String,
    pub queue_ref: String,
    pub concurrency_limit: i32,
}

/// queue.delete.v1 - Delete a queue and its metadata
#[derive(Debug, Deserialize)]
pub struct DeleteQueueRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteQueueResponse {
    pub name: String,
    pub deleted: bool,
}

/// queue.list.v1 - List known queues
#[derive(Debug, Deserialize)]
pub struct ListQueuesRequest {
    // No parameters needed
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueInfo {
    pub name: String,
    pub queue_ref: String,
    pub concurrency_limit: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListQueuesResponse {
    pub queues: Vec<QueueInfo>,
}

/// queue.send.v1 - Send test messages to a queue
#[derive(Debug, Deserialize)]
pub struct SendMessagesRequest {
    pub name: String,
    #[serde(default = "default_count")]
    pub count: u32,
    /// Body template; a counter suffix is appended per message
    #[serde(default)]
    pub body: Option<String>,
}

fn default_count() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize)]
pub struct SendMessagesResponse {
    pub name: String,
    pub sent: u32,
}

/// queue.size.v1 - Approximate message count
#[derive(Debug, Deserialize)]
pub struct QueueSizeRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueSizeResponse {
    pub name: String,
    pub approximate_size: usize,
}

/// queue.setConcurrency.v1 - Update the per-queue drain concurrency (1-5)
#[derive(Debug, Deserialize)]
pub struct SetConcurrencyRequest {
    pub name: String,
    pub limit: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SetConcurrencyResponse {
    pub name: String,
    pub concurrency_limit: i32,
}

/// admin.stats.v1 - Cluster statistics
#[derive(Debug, Deserialize)]
pub struct StatsRequest {
    // No parameters needed
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub workers: i64,
    pub assignments: i64,
    pub queues: i64,
    pub uptime_seconds: i64,
}
