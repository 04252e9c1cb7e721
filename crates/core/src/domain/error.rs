// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid concurrency limit {0} (must be between {min} and {max})",
        min = super::queue::MIN_CONCURRENCY_LIMIT,
        max = super::queue::MAX_CONCURRENCY_LIMIT)]
    InvalidConcurrencyLimit(i32),

    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
