//! Consumer slot table.
//!
//! Owns every slot handle for one pool manager: idle lookup, spawning under
//! the capacity ceiling, dispatch, usage accounting and retirement. This
//! state never crosses a process boundary.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::port::{MessageHandler, QueueRepository, QueueService};

use super::super::constants::SLOT_COMMAND_CAPACITY;
use super::super::consumer::{Consumer, ConsumerConfig};
use super::super::protocol::{AssignCommand, SlotEvent, SlotIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Busy,
}

/// What happened to a slot when its assignment completed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Below the usage limit: back to Idle, preferred over spawning
    Idle { usage_count: u32 },
    /// Usage limit reached: slot terminated and dropped from the pool
    Retired { usage_count: u32 },
}

struct Slot {
    commands: mpsc::Sender<AssignCommand>,
    // Watches the consumer task and reports its exit as a SlotEvent
    _monitor: tokio::task::JoinHandle<()>,
    state: SlotState,
    usage_count: u32,
}

pub struct ConsumerPool {
    slots: HashMap<SlotIndex, Slot>,
    next_index: SlotIndex,
    max_slots: usize,
    usage_limit: u32,
    queue_service: Arc<dyn QueueService>,
    queue_repo: Arc<dyn QueueRepository>,
    handler: Arc<dyn MessageHandler>,
    consumer_config: ConsumerConfig,
    events_tx: mpsc::Sender<SlotEvent>,
}

impl ConsumerPool {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        max_slots: usize,
        usage_limit: u32,
        queue_service: Arc<dyn QueueService>,
        queue_repo: Arc<dyn QueueRepository>,
        handler: Arc<dyn MessageHandler>,
        consumer_config: ConsumerConfig,
        events_tx: mpsc::Sender<SlotEvent>,
    ) -> Self {
        Self {
            slots: HashMap::new(),
            next_index: 0,
            max_slots,
            usage_limit,
            queue_service,
            queue_repo,
            handler,
            consumer_config,
            events_tx,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, index: SlotIndex) -> bool {
        self.slots.contains_key(&index)
    }

    pub fn idle_count(&self) -> usize {
        self.slots
            .values()
            .filter(|s| s.state == SlotState::Idle)
            .count()
    }

    /// Reuse an idle slot, or spawn a new consumer while below the capacity
    /// ceiling. `None` means the pool is saturated: the assignment stays
    /// pending until a later tick (backpressure, never unbounded spawning).
    pub fn acquire(&mut self) -> Option<SlotIndex> {
        if let Some((&index, _)) = self
            .slots
            .iter()
            .find(|(_, slot)| slot.state == SlotState::Idle)
        {
            return Some(index);
        }
        if self.slots.len() < self.max_slots {
            return Some(self.spawn_slot());
        }
        None
    }

    fn spawn_slot(&mut self) -> SlotIndex {
        let index = self.next_index;
        self.next_index += 1;

        let (command_tx, command_rx) = mpsc::channel(SLOT_COMMAND_CAPACITY);
        let consumer = Consumer::new(
            index,
            Arc::clone(&self.queue_service),
            Arc::clone(&self.queue_repo),
            Arc::clone(&self.handler),
            self.consumer_config.clone(),
        );

        let consumer_task = tokio::spawn(consumer.run(command_rx, self.events_tx.clone()));

        // Mirror of a child-process exit notification: fires on retirement
        // (command channel dropped) and on crash alike.
        let monitor = {
            let events = self.events_tx.clone();
            tokio::spawn(async move {
                let _ = consumer_task.await;
                let _ = events.send(SlotEvent::Exited { slot: index }).await;
            })
        };

        self.slots.insert(
            index,
            Slot {
                commands: command_tx,
                _monitor: monitor,
                state: SlotState::Busy,
                usage_count: 0,
            },
        );
        info!(slot = index, pool_size = self.slots.len(), "Spawned consumer slot");
        index
    }

    /// Hand an assignment to a slot and mark it Busy. A send failure means
    /// the consumer task is gone; the slot is dropped and the caller leaves
    /// the assignment for a later tick.
    pub async fn dispatch(
        &mut self,
        index: SlotIndex,
        command: AssignCommand,
    ) -> Result<(), AssignCommand> {
        let slot = match self.slots.get_mut(&index) {
            Some(slot) => slot,
            None => return Err(command),
        };
        slot.state = SlotState::Busy;
        match slot.commands.send(command).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.slots.remove(&index);
                Err(e.0)
            }
        }
    }

    /// Account a completed assignment: increment usage, retire at the limit
    /// (dropping the command channel ends the consumer task), otherwise
    /// return the slot to Idle for reuse.
    pub fn release(&mut self, index: SlotIndex) -> Option<ReleaseOutcome> {
        let slot = self.slots.get_mut(&index)?;
        slot.usage_count += 1;
        let usage_count = slot.usage_count;
        if usage_count >= self.usage_limit {
            self.slots.remove(&index);
            info!(slot = index, usage_count, "Slot retired at usage limit");
            Some(ReleaseOutcome::Retired { usage_count })
        } else {
            slot.state = SlotState::Idle;
            debug!(slot = index, usage_count, "Slot idle");
            Some(ReleaseOutcome::Idle { usage_count })
        }
    }

    /// Drop a slot after an unexpected consumer exit; returns false when the
    /// slot was already retired (the exit event is then stale).
    pub fn remove(&mut self, index: SlotIndex) -> bool {
        self.slots.remove(&index).is_some()
    }
}
