// Message Handler Port (Interface)
// Abstraction for processing one message as an opaque unit of work

use crate::port::queue_service::ReceivedMessage;
use async_trait::async_trait;
use thiserror::Error;

/// Handler errors
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("Handler failed: {0}")]
    Failed(String),

    #[error("Handler timeout after {0}ms")]
    Timeout(i64),

    #[error("Spawn failed: {0}")]
    SpawnFailed(String),
}

/// Message handler trait.
///
/// A returned error leaves the message undeleted; it is redelivered once the
/// queue's visibility timeout elapses.
///
/// Implementations:
/// - SubprocessHandler: pipes the body to a configured command (infra-queue)
/// - SleepHandler: fixed-delay simulated work (infra-queue)
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &ReceivedMessage) -> Result<(), HandlerError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
    use std::time::Duration;

    /// Mock handler behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Always succeed
        Success,
        /// Always fail with message
        Fail(String),
        /// Panic with message (for slot-crash testing)
        Panic(String),
        /// Fail for bodies matching a marker, succeed otherwise
        FailMatching(String),
    }

    /// Mock message handler that tracks the in-flight high-water mark,
    /// so concurrency-bound tests can assert the limit was never exceeded.
    pub struct MockMessageHandler {
        behavior: MockBehavior,
        delay: Duration,
        handled: AtomicU64,
        in_flight: AtomicI64,
        max_in_flight: AtomicI64,
    }

    impl MockMessageHandler {
        pub fn new(behavior: MockBehavior, delay: Duration) -> Self {
            Self {
                behavior,
                delay,
                handled: AtomicU64::new(0),
                in_flight: AtomicI64::new(0),
                max_in_flight: AtomicI64::new(0),
            }
        }

        pub fn new_success() -> Self {
            Self::new(MockBehavior::Success, Duration::from_millis(0))
        }

        pub fn new_success_with_delay(delay: Duration) -> Self {
            Self::new(MockBehavior::Success, delay)
        }

        pub fn new_fail(message: impl Into<String>) -> Self {
            Self::new(MockBehavior::Fail(message.into()), Duration::from_millis(0))
        }

        pub fn new_panic(message: impl Into<String>) -> Self {
            Self::new(
                MockBehavior::Panic(message.into()),
                Duration::from_millis(0),
            )
        }

        pub fn handled_count(&self) -> u64 {
            self.handled.load(Ordering::SeqCst)
        }

        pub fn max_in_flight(&self) -> i64 {
            self.max_in_flight.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MessageHandler for MockMessageHandler {
        async fn handle(&self, message: &ReceivedMessage) -> Result<(), HandlerError> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let result = match &self.behavior {
                MockBehavior::Success => Ok(()),
                MockBehavior::Fail(msg) => Err(HandlerError::Failed(msg.clone())),
                MockBehavior::Panic(msg) => {
                    self.in_flight.fetch_sub(1, Ordering::SeqCst);
                    panic!("{}", msg); // Actually panic for crash testing
                }
                MockBehavior::FailMatching(marker) => {
                    if message.body.contains(marker.as_str()) {
                        Err(HandlerError::Failed(format!(
                            "body matched failure marker {}",
                            marker
                        )))
                    } else {
                        Ok(())
                    }
                }
            };

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if result.is_ok() {
                self.handled.fetch_add(1, Ordering::SeqCst);
            }
            result
        }
    }
}
