// Assignment Domain Model

use serde::{Deserialize, Serialize};

use super::worker::WorkerId;

/// Assignment ID (UUID v4)
pub type AssignmentId = String;

/// Opaque reference to a queue in the external queue service
pub type QueueRef = String;

/// Claim record binding one external queue to one worker.
///
/// Created exactly once per queue_ref by the master allocator; deleted by the
/// owning worker pool manager once its consumer reports the queue drained.
/// The store enforces uniqueness on `queue_ref`, which is the system's sole
/// global consistency guarantee: at most one live claim per queue at any
/// instant, so two workers can never drain the same queue concurrently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub queue_ref: QueueRef,
    pub worker_id: WorkerId,
    pub queue_id: Option<String>,
}

impl Assignment {
    pub fn new(
        id: impl Into<String>,
        queue_ref: impl Into<String>,
        worker_id: impl Into<String>,
        queue_id: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            queue_ref: queue_ref.into(),
            worker_id: worker_id.into(),
            queue_id,
        }
    }
}
