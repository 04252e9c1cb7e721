// Queue Metadata Domain Model

use serde::{Deserialize, Serialize};

use super::assignment::QueueRef;
use super::error::{DomainError, Result};

/// Lower bound for a queue's consumer concurrency limit
pub const MIN_CONCURRENCY_LIMIT: i32 = 1;

/// Upper bound for a queue's consumer concurrency limit
pub const MAX_CONCURRENCY_LIMIT: i32 = 5;

/// Persisted queue metadata, created administratively.
///
/// `concurrency_limit` is the only mutable field: it caps how many messages
/// a consumer drains in flight at once for this queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueRecord {
    pub id: String,
    pub name: String,
    pub queue_ref: QueueRef,
    pub concurrency_limit: i32,
    pub created_at: i64, // epoch ms
    pub updated_at: i64,
}

impl QueueRecord {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        queue_ref: impl Into<String>,
        concurrency_limit: i32,
        now_millis: i64,
    ) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(DomainError::ValidationError(
                "queue name must not be empty".to_string(),
            ));
        }
        validate_concurrency_limit(concurrency_limit)?;
        Ok(Self {
            id: id.into(),
            name,
            queue_ref: queue_ref.into(),
            concurrency_limit,
            created_at: now_millis,
            updated_at: now_millis,
        })
    }
}

/// Check a requested concurrency limit against the allowed range
pub fn validate_concurrency_limit(limit: i32) -> Result<()> {
    if !(MIN_CONCURRENCY_LIMIT..=MAX_CONCURRENCY_LIMIT).contains(&limit) {
        return Err(DomainError::InvalidConcurrencyLimit(limit));
    }
    Ok(())
}
