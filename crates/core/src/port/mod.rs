// Port Layer - Interfaces for external dependencies

pub mod assignment_repository;
pub mod id_provider; // For deterministic testing
pub mod message_handler;
pub mod queue_repository;
pub mod queue_service;
pub mod time_provider;
pub mod worker_repository;

// Re-exports
pub use assignment_repository::AssignmentRepository;
pub use id_provider::IdProvider;
pub use message_handler::{HandlerError, MessageHandler};
pub use queue_repository::QueueRepository;
pub use queue_service::{QueueService, ReceiveOptions, ReceivedMessage};
pub use time_provider::TimeProvider;
pub use worker_repository::WorkerRepository;
