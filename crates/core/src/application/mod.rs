// Application Layer - Allocation and drain state machines

pub mod allocator;
pub mod constants;
pub mod consumer;
pub mod pool;
pub mod protocol;
pub mod shutdown;

// Re-exports
pub use allocator::{AllocatorConfig, AssignOutcome, MasterAllocator, QueueDescriptor};
pub use consumer::{Consumer, ConsumerConfig};
pub use pool::{PoolConfig, WorkerPoolManager};
pub use protocol::{AssignCommand, SlotEvent, SlotIndex};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
