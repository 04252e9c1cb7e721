//! Consumer - drains one assigned queue at a time with bounded in-flight
//! concurrency, then reports completion and waits for the next assignment.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::domain::{MAX_CONCURRENCY_LIMIT, MIN_CONCURRENCY_LIMIT};
use crate::port::{MessageHandler, QueueRepository, QueueService, ReceiveOptions, ReceivedMessage};

use super::constants::MAX_RECEIVE_BATCH;
use super::protocol::{AssignCommand, SlotEvent, SlotIndex};

/// Consumer configuration
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Drain concurrency when the queue has no persisted override
    pub default_concurrency: i32,
    /// Long-poll wait on each receive call
    pub receive_wait: Duration,
    /// Visibility timeout requested for received messages
    pub visibility_timeout: Duration,
    /// Sleep after a failed receive call before retrying
    pub poll_backoff: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            default_concurrency: super::constants::DEFAULT_CONCURRENCY_LIMIT,
            receive_wait: super::constants::DEFAULT_RECEIVE_WAIT,
            visibility_timeout: super::constants::DEFAULT_VISIBILITY_TIMEOUT,
            poll_backoff: super::constants::DEFAULT_POLL_BACKOFF,
        }
    }
}

pub struct Consumer {
    slot: SlotIndex,
    queue_service: Arc<dyn QueueService>,
    queue_repo: Arc<dyn QueueRepository>,
    handler: Arc<dyn MessageHandler>,
    config: ConsumerConfig,
}

impl Consumer {
    pub fn new(
        slot: SlotIndex,
        queue_service: Arc<dyn QueueService>,
        queue_repo: Arc<dyn QueueRepository>,
        handler: Arc<dyn MessageHandler>,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            slot,
            queue_service,
            queue_repo,
            handler,
            config,
        }
    }

    /// Command loop: drain one assignment at a time until the manager drops
    /// the command channel (retirement) or the event channel closes.
    pub async fn run(
        self,
        mut commands: mpsc::Receiver<AssignCommand>,
        events: mpsc::Sender<SlotEvent>,
    ) {
        while let Some(command) = commands.recv().await {
            let assignment_id = command.assignment_id.clone();
            info!(
                slot = self.slot,
                assignment_id = %assignment_id,
                queue_ref = %command.queue_ref,
                "Assignment received"
            );

            if events
                .send(SlotEvent::Started {
                    assignment_id: assignment_id.clone(),
                    slot: self.slot,
                })
                .await
                .is_err()
            {
                break;
            }

            let total_processed = self.drain(&command.queue_ref).await;

            // Exactly one Done per assignment, only once nothing is in flight
            if events
                .send(SlotEvent::Done {
                    assignment_id,
                    slot: self.slot,
                    total_processed,
                })
                .await
                .is_err()
            {
                break;
            }
        }
        debug!(slot = self.slot, "Consumer command channel closed");
    }

    /// Resolve the effective drain concurrency: queue-specific persisted
    /// override, falling back to the configured default, clamped to the
    /// allowed range. A metadata lookup failure falls back too - the drain
    /// must not stall on it.
    async fn effective_concurrency(&self, queue_ref: &str) -> usize {
        let limit = match self.queue_repo.find_by_queue_ref(queue_ref).await {
            Ok(Some(record)) => record.concurrency_limit,
            Ok(None) => self.config.default_concurrency,
            Err(e) => {
                warn!(
                    queue_ref = %queue_ref,
                    error = %e,
                    "Queue metadata lookup failed, using default concurrency"
                );
                self.config.default_concurrency
            }
        };
        limit.clamp(MIN_CONCURRENCY_LIMIT, MAX_CONCURRENCY_LIMIT) as usize
    }

    /// Poll loop: receive-process-delete until an empty poll coincides with
    /// an empty in-flight set. Returns the number of messages successfully
    /// processed and deleted.
    async fn drain(&self, queue_ref: &str) -> u64 {
        let limit = self.effective_concurrency(queue_ref).await;
        let mut in_flight: JoinSet<bool> = JoinSet::new();
        let mut total_processed: u64 = 0;

        debug!(
            slot = self.slot,
            queue_ref = %queue_ref,
            concurrency = limit,
            "Drain started"
        );

        loop {
            let headroom = limit.saturating_sub(in_flight.len());
            if headroom == 0 {
                // At the concurrency bound: wait for one completion
                if let Some(result) = in_flight.join_next().await {
                    total_processed += Self::count_completion(result);
                }
                continue;
            }

            let options = ReceiveOptions {
                max_messages: headroom.min(MAX_RECEIVE_BATCH),
                wait: self.config.receive_wait,
                visibility_timeout: self.config.visibility_timeout,
            };

            let batch = match self.queue_service.receive_messages(queue_ref, options).await {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(
                        slot = self.slot,
                        queue_ref = %queue_ref,
                        error = %e,
                        "Receive failed, backing off"
                    );
                    sleep(self.config.poll_backoff).await;
                    continue;
                }
            };

            if batch.is_empty() {
                match in_flight.join_next().await {
                    Some(result) => {
                        total_processed += Self::count_completion(result);
                        continue;
                    }
                    // Empty poll and nothing in flight: drained
                    None => break,
                }
            }

            for message in batch {
                let queue_service = Arc::clone(&self.queue_service);
                let handler = Arc::clone(&self.handler);
                let queue_ref = queue_ref.to_string();
                in_flight
                    .spawn(Self::process_message(queue_service, handler, queue_ref, message));
            }
        }

        info!(
            slot = self.slot,
            queue_ref = %queue_ref,
            total_processed,
            "Queue drained"
        );
        total_processed
    }

    fn count_completion(result: std::result::Result<bool, tokio::task::JoinError>) -> u64 {
        match result {
            Ok(true) => 1,
            Ok(false) => 0,
            Err(e) => {
                // A panicking handler loses this message until redelivery
                warn!(error = %e, "Message task aborted");
                0
            }
        }
    }

    /// Process one message, deleting it only after the handler succeeds.
    /// Either failure leaves the message for redelivery once its visibility
    /// timeout elapses.
    async fn process_message(
        queue_service: Arc<dyn QueueService>,
        handler: Arc<dyn MessageHandler>,
        queue_ref: String,
        message: ReceivedMessage,
    ) -> bool {
        if let Err(e) = handler.handle(&message).await {
            warn!(
                queue_ref = %queue_ref,
                message_id = %message.message_id,
                error = %e,
                "Message handling failed, leaving for redelivery"
            );
            return false;
        }

        if let Err(e) = queue_service
            .delete_message(&queue_ref, &message.receipt_handle)
            .await
        {
            warn!(
                queue_ref = %queue_ref,
                message_id = %message.message_id,
                error = %e,
                "Message delete failed, message will be redelivered"
            );
            return false;
        }

        debug!(
            queue_ref = %queue_ref,
            message_id = %message.message_id,
            "Message processed"
        );
        true
    }
}
