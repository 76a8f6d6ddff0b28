use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::queue::{CommandQueue, QueuePolicy, QueueStats};
use crate::clock::Clock;
use crate::domain::{AckOutcome, Command, CommandId, TerminalId};
use crate::error::{BridgeError, Result};

type SharedQueue = Arc<Mutex<CommandQueue>>;

/// Registry of per-terminal command queues.
///
/// The map is only consulted to find a terminal's queue handle; the queue
/// itself is behind its own mutex, so terminals never wait on each other and
/// every operation on one terminal's queue is a single critical section.
/// Time is read after the queue lock is taken, so timestamps follow the order
/// in which operations actually apply.
#[derive(Debug, Clone)]
pub struct CommandStore {
    queues: Arc<DashMap<TerminalId, SharedQueue>>,
    policy: QueuePolicy,
    /// Highest `next_id` of any evicted queue; new queues start here
    id_floor: Arc<AtomicU64>,
}

impl CommandStore {
    pub fn new(policy: QueuePolicy) -> Self {
        Self {
            queues: Arc::new(DashMap::new()),
            policy,
            id_floor: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn policy(&self) -> &QueuePolicy {
        &self.policy
    }

    fn queue(&self, terminal_id: &TerminalId) -> Option<SharedQueue> {
        self.queues
            .get(terminal_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    fn queue_or_create(&self, terminal_id: &TerminalId) -> SharedQueue {
        let entry = self
            .queues
            .entry(terminal_id.clone())
            .or_insert_with(|| {
                let first_id = self.id_floor.load(Ordering::SeqCst);
                debug!(terminal = %terminal_id, first_id, "Creating command queue");
                Arc::new(Mutex::new(CommandQueue::with_first_id(
                    terminal_id.clone(),
                    self.policy.clone(),
                    first_id,
                )))
            });
        Arc::clone(entry.value())
    }

    /// Append a command for the terminal, creating its queue on first use
    pub async fn enqueue(
        &self,
        terminal_id: &TerminalId,
        payload: serde_json::Value,
        clock: &dyn Clock,
    ) -> Result<CommandId> {
        let queue = self.queue_or_create(terminal_id);
        let mut queue = queue.lock().await;
        queue.enqueue(payload, clock.now())
    }

    /// Deliver up to `max_n` commands. A terminal without a queue gets nothing.
    pub async fn poll(
        &self,
        terminal_id: &TerminalId,
        max_n: usize,
        clock: &dyn Clock,
    ) -> Vec<Command> {
        let Some(queue) = self.queue(terminal_id) else {
            return Vec::new();
        };
        let mut queue = queue.lock().await;
        queue.poll(max_n, clock.now())
    }

    pub async fn acknowledge(
        &self,
        terminal_id: &TerminalId,
        command_id: CommandId,
        clock: &dyn Clock,
    ) -> Result<AckOutcome> {
        let Some(queue) = self.queue(terminal_id) else {
            // Evicted queues leave their ids below the floor
            if command_id > 0 && command_id < self.id_floor.load(Ordering::SeqCst) {
                return Ok(AckOutcome::Settled);
            }
            return Err(BridgeError::CommandNotFound {
                terminal_id: terminal_id.to_string(),
                command_id,
            });
        };
        let mut queue = queue.lock().await;
        queue.acknowledge(command_id, clock.now())
    }

    pub async fn stats(&self, terminal_id: &TerminalId) -> Option<QueueStats> {
        let queue = self.queue(terminal_id)?;
        let queue = queue.lock().await;
        Some(queue.stats())
    }

    /// Stats summed over all terminals
    pub async fn total_stats(&self) -> QueueStats {
        let mut total = QueueStats::default();
        for queue in self.snapshot_queues() {
            total.merge(&queue.lock().await.stats());
        }
        total
    }

    /// Run the expiry sweep over every queue; returns commands newly expired
    pub async fn sweep_all(&self, clock: &dyn Clock) -> usize {
        let mut expired = 0;
        for queue in self.snapshot_queues() {
            let mut queue = queue.lock().await;
            expired += queue.sweep(clock.now());
        }
        expired
    }

    /// Drop queues that are empty and have been idle for the policy's
    /// eviction window. Queues in use by a request are skipped.
    pub fn evict_idle(&self, clock: &dyn Clock) -> usize {
        let terminals: Vec<TerminalId> =
            self.queues.iter().map(|entry| entry.key().clone()).collect();

        let mut evicted = 0;
        for terminal_id in terminals {
            // Handles are only cloned under the shard lock, which remove_if holds
            let removed = self.queues.remove_if(&terminal_id, |_, queue| {
                if Arc::strong_count(queue) > 1 {
                    return false;
                }
                let Ok(queue) = queue.try_lock() else {
                    return false;
                };
                if !queue.is_idle(clock.now()) {
                    return false;
                }
                self.id_floor.fetch_max(queue.next_id(), Ordering::SeqCst);
                true
            });
            if removed.is_some() {
                debug!(terminal = %terminal_id, "Evicted idle command queue");
                evicted += 1;
            }
        }
        evicted
    }

    pub fn terminal_count(&self) -> usize {
        self.queues.len()
    }

    // Handles are cloned out so no map shard lock is held across an await
    fn snapshot_queues(&self) -> Vec<SharedQueue> {
        self.queues
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}
