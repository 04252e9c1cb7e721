// Queue Service Port (Interface)
// Abstraction over the external message-queue service

use crate::domain::QueueRef;
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// A message received from a queue.
///
/// The receipt handle identifies this particular receive: it is required to
/// delete the message and becomes stale once the visibility timeout elapses
/// and the message is redelivered.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub message_id: String,
    pub receipt_handle: String,
    pub body: String,
}

/// Options for a single receive call
#[derive(Debug, Clone)]
pub struct ReceiveOptions {
    /// Upper bound on messages returned (the service may return fewer)
    pub max_messages: usize,
    /// Long-poll wait before returning an empty batch
    pub wait: Duration,
    /// How long received messages stay hidden from other receivers
    pub visibility_timeout: Duration,
}

/// Queue service interface.
///
/// Delivery contract: at-least-once. A received message that is not deleted
/// before its visibility timeout elapses is redelivered.
#[async_trait]
pub trait QueueService: Send + Sync {
    /// Create a queue (idempotent); returns its reference
    async fn create_queue(&self, name: &str) -> Result<QueueRef>;

    /// Delete a queue and any messages it holds
    async fn delete_queue(&self, queue_ref: &str) -> Result<()>;

    /// List all queue references
    async fn list_queues(&self) -> Result<Vec<QueueRef>>;

    /// Send one message
    async fn send_message(&self, queue_ref: &str, body: &str) -> Result<()>;

    /// Receive up to `max_messages` visible messages
    async fn receive_messages(
        &self,
        queue_ref: &str,
        options: ReceiveOptions,
    ) -> Result<Vec<ReceivedMessage>>;

    /// Delete a message by its receipt handle
    async fn delete_message(&self, queue_ref: &str, receipt_handle: &str) -> Result<()>;

    /// Approximate number of messages currently held
    async fn approximate_size(&self, queue_ref: &str) -> Result<usize>;
}

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    /// Scripted queue service for consumer tests.
    ///
    /// Messages are handed out in order and considered gone once received;
    /// visibility-timeout redelivery is exercised against the real in-memory
    /// broker in the infra-queue crate, not here.
    pub struct MockQueueService {
        messages: Mutex<VecDeque<String>>,
        deleted: Mutex<Vec<String>>,
        receive_calls: AtomicU64,
        failing_receives: AtomicU64,
    }

    impl MockQueueService {
        pub fn new(bodies: Vec<String>) -> Self {
            Self {
                messages: Mutex::new(bodies.into_iter().collect()),
                deleted: Mutex::new(Vec::new()),
                receive_calls: AtomicU64::new(0),
                failing_receives: AtomicU64::new(0),
            }
        }

        /// Fail the next `count` receive calls, for poll-retry tests
        pub fn fail_next_receives(&self, count: u64) {
            self.failing_receives.store(count, Ordering::SeqCst);
        }

        pub fn deleted_count(&self) -> usize {
            self.deleted.lock().unwrap().len()
        }

        pub fn receive_calls(&self) -> u64 {
            self.receive_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl QueueService for MockQueueService {
        async fn create_queue(&self, name: &str) -> Result<QueueRef> {
            Ok(format!("mock://{}", name))
        }

        async fn delete_queue(&self, _queue_ref: &str) -> Result<()> {
            Ok(())
        }

        async fn list_queues(&self) -> Result<Vec<QueueRef>> {
            Ok(vec![])
        }

        async fn send_message(&self, _queue_ref: &str, body: &str) -> Result<()> {
            self.messages.lock().unwrap().push_back(body.to_string());
            Ok(())
        }

        async fn receive_messages(
            &self,
            _queue_ref: &str,
            options: ReceiveOptions,
        ) -> Result<Vec<ReceivedMessage>> {
            let call = self.receive_calls.fetch_add(1, Ordering::SeqCst);
            let failing = self.failing_receives.load(Ordering::SeqCst);
            if failing > 0 {
                self.failing_receives.store(failing - 1, Ordering::SeqCst);
                return Err(AppError::QueueService("receive unavailable".to_string()));
            }
            let mut messages = self.messages.lock().unwrap();
            let mut batch = Vec::new();
            while batch.len() < options.max_messages {
                match messages.pop_front() {
                    Some(body) => {
                        let n = batch.len();
                        batch.push(ReceivedMessage {
                            message_id: format!("msg-{}-{}", call, n),
                            receipt_handle: format!("rh-{}-{}", call, n),
                            body,
                        });
                    }
                    None => break,
                }
            }
            Ok(batch)
        }

        async fn delete_message(&self, _queue_ref: &str, receipt_handle: &str) -> Result<()> {
            self.deleted
                .lock()
                .unwrap()
                .push(receipt_handle.to_string());
            Ok(())
        }

        async fn approximate_size(&self, _queue_ref: &str) -> Result<usize> {
            Ok(self.messages.lock().unwrap().len())
        }
    }
}
