//! In-memory queue service with SQS-shaped semantics.
//!
//! Receive hides a message from other receivers for the requested visibility
//! timeout and hands out a fresh receipt handle; delete works only with the
//! current handle. A message that is received but not deleted in time becomes
//! visible again - at-least-once delivery, same as a real broker.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

use siphon_core::domain::QueueRef;
use siphon_core::error::{AppError, Result};
use siphon_core::port::{QueueService, ReceiveOptions, ReceivedMessage, TimeProvider};

/// Poll granularity while a receive call is long-polling
const LONG_POLL_TICK: Duration = Duration::from_millis(50);

struct StoredMessage {
    message_id: String,
    body: String,
    /// Epoch ms at which the message is (re)delivered
    visible_at: i64,
    /// Rotates on every receive; stale handles cannot delete
    receipt_handle: String,
}

#[derive(Default)]
struct QueueState {
    messages: Vec<StoredMessage>,
}

pub struct InMemoryQueueService {
    queues: Mutex<HashMap<QueueRef, QueueState>>,
    time_provider: Arc<dyn TimeProvider>,
}

impl InMemoryQueueService {
    pub fn new(time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            time_provider,
        }
    }

    fn queue_ref_for(name: &str) -> QueueRef {
        format!("memory://{}", name)
    }

    /// Take up to `max` visible messages, stamping visibility and fresh
    /// receipt handles. Returns an empty batch when nothing is visible.
    fn take_visible(
        state: &mut QueueState,
        max: usize,
        now: i64,
        visibility_timeout: Duration,
    ) -> Vec<ReceivedMessage> {
        let hidden_until = now + visibility_timeout.as_millis() as i64;
        let mut batch = Vec::new();
        for message in state.messages.iter_mut() {
            if batch.len() >= max {
                break;
            }
            if message.visible_at > now {
                continue;
            }
            message.visible_at = hidden_until;
            message.receipt_handle = uuid::Uuid::new_v4().to_string();
            batch.push(ReceivedMessage {
                message_id: message.message_id.clone(),
                receipt_handle: message.receipt_handle.clone(),
                body: message.body.clone(),
            });
        }
        batch
    }
}

#[async_trait]
impl QueueService for InMemoryQueueService {
    async fn create_queue(&self, name: &str) -> Result<QueueRef> {
        if name.is_empty() {
            return Err(AppError::Validation(
                "queue name must not be empty".to_string(),
            ));
        }
        let queue_ref = Self::queue_ref_for(name);
        let mut queues = self.queues.lock().await;
        queues.entry(queue_ref.clone()).or_default();
        debug!(queue_ref = %queue_ref, "Queue created");
        Ok(queue_ref)
    }

    async fn delete_queue(&self, queue_ref: &str) -> Result<()> {
        let mut queues = self.queues.lock().await;
        if queues.remove(queue_ref).is_none() {
            return Err(AppError::NotFound(format!("Queue {} not found", queue_ref)));
        }
        Ok(())
    }

    async fn list_queues(&self) -> Result<Vec<QueueRef>> {
        let queues = self.queues.lock().await;
        let mut refs: Vec<QueueRef> = queues.keys().cloned().collect();
        refs.sort();
        Ok(refs)
    }

    async fn send_message(&self, queue_ref: &str, body: &str) -> Result<()> {
        let now = self.time_provider.now_millis();
        let mut queues = self.queues.lock().await;
        let state = queues
            .get_mut(queue_ref)
            .ok_or_else(|| AppError::NotFound(format!("Queue {} not found", queue_ref)))?;
        state.messages.push(StoredMessage {
            message_id: uuid::Uuid::new_v4().to_string(),
            body: body.to_string(),
            visible_at: now,
            receipt_handle: String::new(),
        });
        Ok(())
    }

    async fn receive_messages(
        &self,
        queue_ref: &str,
        options: ReceiveOptions,
    ) -> Result<Vec<ReceivedMessage>> {
        let deadline = Instant::now() + options.wait;
        loop {
            {
                let now = self.time_provider.now_millis();
                let mut queues = self.queues.lock().await;
                let state = queues.get_mut(queue_ref).ok_or_else(|| {
                    AppError::NotFound(format!("Queue {} not found", queue_ref))
                })?;
                let batch = Self::take_visible(
                    state,
                    options.max_messages,
                    now,
                    options.visibility_timeout,
                );
                if !batch.is_empty() {
                    return Ok(batch);
                }
            }
            if Instant::now() >= deadline {
                return Ok(Vec::new());
            }
            sleep(LONG_POLL_TICK.min(options.wait)).await;
        }
    }

    async fn delete_message(&self, queue_ref: &str, receipt_handle: &str) -> Result<()> {
        let mut queues = self.queues.lock().await;
        let state = queues
            .get_mut(queue_ref)
            .ok_or_else(|| AppError::NotFound(format!("Queue {} not found", queue_ref)))?;
        let before = state.messages.len();
        state
            .messages
            .retain(|m| m.receipt_handle != receipt_handle);
        if state.messages.len() == before {
            // Stale handle: the visibility timeout elapsed and the message
            // was handed out again, or it was already deleted
            return Err(AppError::NotFound(format!(
                "No message with receipt handle {}",
                receipt_handle
            )));
        }
        Ok(())
    }

    async fn approximate_size(&self, queue_ref: &str) -> Result<usize> {
        let queues = self.queues.lock().await;
        let state = queues
            .get(queue_ref)
            .ok_or_else(|| AppError::NotFound(format!("Queue {} not found", queue_ref)))?;
        Ok(state.messages.len())
    }
}
