// Worker Registry Domain Model

use serde::{Deserialize, Serialize};

/// Worker identity (unique among live workers)
pub type WorkerId = String;

/// One row per live worker process, created on startup registration
/// and bulk-cleared on a full-system restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub id: WorkerId,
    pub started_at: i64, // epoch ms
}

impl WorkerRecord {
    pub fn new(id: impl Into<String>, started_at: i64) -> Self {
        Self {
            id: id.into(),
            started_at,
        }
    }
}
