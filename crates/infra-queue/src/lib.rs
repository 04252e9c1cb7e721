// Siphon Infrastructure - Queue Service Adapters
// Implements: QueueService (in-memory broker), MessageHandler (subprocess, sleep)

mod handlers;
mod memory;

pub use handlers::{SleepHandler, SubprocessHandler, SubprocessHandlerConfig};
pub use memory::InMemoryQueueService;
