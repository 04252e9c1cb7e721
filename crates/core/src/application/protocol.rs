// Manager <-> Consumer message contracts

use serde::{Deserialize, Serialize};

use crate::domain::{AssignmentId, QueueRef};

/// Handle identifying a consumer slot within one pool.
///
/// Monotonically increasing; never reused, so a stale event from a retired
/// slot can be told apart from one addressed to a live slot.
pub type SlotIndex = u64;

/// Manager -> consumer: drain this queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignCommand {
    pub assignment_id: AssignmentId,
    pub queue_ref: QueueRef,
}

/// Consumer -> manager lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SlotEvent {
    /// Assignment acknowledged, drain starting
    Started {
        assignment_id: AssignmentId,
        slot: SlotIndex,
    },
    /// Queue drained; emitted exactly once per assignment
    Done {
        assignment_id: AssignmentId,
        slot: SlotIndex,
        total_processed: u64,
    },
    /// The slot's consumer task ended (retirement or crash)
    Exited { slot: SlotIndex },
}
