// Siphon Infrastructure - SQLite Adapter
// Implements: WorkerRepository, QueueRepository, AssignmentRepository

mod assignment_repository;
mod connection;
mod error;
mod migration;
mod queue_repository;
mod worker_repository;

pub use assignment_repository::SqliteAssignmentRepository;
pub use connection::create_pool;
pub use migration::run_migrations;
pub use queue_repository::SqliteQueueRepository;
pub use worker_repository::SqliteWorkerRepository;

// Note: sqlx::Error conversion is handled by a shared helper
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
