// Application constants (no magic values)
use std::time::Duration;

/// Default ceiling on live assignments per worker
pub const DEFAULT_MAX_WORKER_LOAD: i64 = 5;

/// Default ceiling on consumer slots per worker pool
pub const DEFAULT_MAX_SLOTS: usize = 5;

/// Default number of assignments a slot handles before retirement
pub const DEFAULT_USAGE_LIMIT: u32 = 5;

/// Default per-queue drain concurrency when no override is persisted
pub const DEFAULT_CONCURRENCY_LIMIT: i32 = 5;

/// Hard cap on messages requested in one receive call
pub const MAX_RECEIVE_BATCH: usize = 10;

/// Interval between pool reconciliation ticks (1s)
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Long-poll wait on each receive call (5s)
pub const DEFAULT_RECEIVE_WAIT: Duration = Duration::from_secs(5);

/// How long received messages stay hidden from other receivers (10s)
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(10);

/// Sleep after a failed receive call before retrying (1s)
pub const DEFAULT_POLL_BACKOFF: Duration = Duration::from_secs(1);

/// Capacity of the slot event channel (manager side)
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Capacity of a slot's command channel (one assignment at a time)
pub const SLOT_COMMAND_CAPACITY: usize = 1;
