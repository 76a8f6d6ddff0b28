//! Command Queue - per-terminal ordered command queue with at-least-once delivery

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::domain::{AckOutcome, Command, CommandId, CommandState, TerminalId};
use crate::error::{BridgeError, Result};

/// Delivery policy shared by every terminal's queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuePolicy {
    /// Maximum pending + delivered commands
    pub max_len: usize,
    /// How long a delivery may stay unacknowledged before it is handed out again
    pub redelivery_timeout: Duration,
    /// Lifetime of an unacknowledged command, measured from creation
    pub ttl: Duration,
    /// How long settled commands are kept so late acks can be classified
    pub settled_retention: Duration,
    /// How long an empty queue may sit untouched before the store drops it;
    /// zero keeps queues for the life of the process
    pub idle_eviction: Duration,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            max_len: 100,
            redelivery_timeout: Duration::seconds(30),
            ttl: Duration::seconds(300),
            settled_retention: Duration::seconds(300),
            idle_eviction: Duration::seconds(3600),
        }
    }
}

/// Command queue for a single terminal, ordered by command id
#[derive(Debug)]
pub struct CommandQueue {
    terminal_id: TerminalId,
    /// Commands in flight and recently settled, keyed (and thus ordered) by id
    commands: BTreeMap<CommandId, Command>,
    /// Next id to assign; ids start at 1 unless the queue replaces an evicted one
    next_id: CommandId,
    policy: QueuePolicy,
    /// Last enqueue, poll or ack
    last_activity: Option<DateTime<Utc>>,
    /// Stats: accepted submissions
    enqueued_count: u64,
    /// Stats: deliveries, redeliveries included
    delivered_count: u64,
    /// Stats: acknowledged commands
    acknowledged_count: u64,
    /// Stats: expired commands
    expired_count: u64,
    /// Stats: submissions rejected because the queue was full
    rejected_count: u64,
}

impl CommandQueue {
    pub fn new(terminal_id: TerminalId, policy: QueuePolicy) -> Self {
        Self::with_first_id(terminal_id, policy, 1)
    }

    /// Queue whose ids start at `first_id`; ids below it count as settled
    pub fn with_first_id(terminal_id: TerminalId, policy: QueuePolicy, first_id: CommandId) -> Self {
        Self {
            terminal_id,
            commands: BTreeMap::new(),
            next_id: first_id.max(1),
            policy,
            last_activity: None,
            enqueued_count: 0,
            delivered_count: 0,
            acknowledged_count: 0,
            expired_count: 0,
            rejected_count: 0,
        }
    }

    pub fn terminal_id(&self) -> &TerminalId {
        &self.terminal_id
    }

    /// Append a command in Pending state
    ///
    /// # Returns
    /// - `Ok(id)` the id assigned to the command
    /// - `Err(QueueFull)` the terminal already has `max_len` active commands;
    ///   the queue is left untouched
    pub fn enqueue(&mut self, payload: serde_json::Value, now: DateTime<Utc>) -> Result<CommandId> {
        self.sweep(now);
        self.last_activity = Some(now);

        if self.active_len() >= self.policy.max_len {
            self.rejected_count += 1;
            warn!(
                terminal = %self.terminal_id,
                capacity = self.policy.max_len,
                "Command queue full, rejecting submission"
            );
            return Err(BridgeError::QueueFull {
                terminal_id: self.terminal_id.to_string(),
                capacity: self.policy.max_len,
            });
        }

        let id = self.next_id;
        self.next_id += 1;

        debug!(terminal = %self.terminal_id, command_id = id, "Enqueuing command");

        self.commands
            .insert(id, Command::new(id, self.terminal_id.clone(), payload, now));
        self.enqueued_count += 1;

        Ok(id)
    }

    /// Hand out up to `max_n` commands in ascending id order.
    ///
    /// Candidates are Pending commands, which includes deliveries whose
    /// redelivery deadline elapsed (the sweep puts those back to Pending).
    /// Every returned command becomes Delivered with a fresh deadline.
    pub fn poll(&mut self, max_n: usize, now: DateTime<Utc>) -> Vec<Command> {
        self.sweep(now);
        self.last_activity = Some(now);

        let redelivery_timeout = self.policy.redelivery_timeout;
        let mut batch = Vec::with_capacity(max_n.min(self.commands.len()));

        for command in self
            .commands
            .values_mut()
            .filter(|c| c.state == CommandState::Pending)
            .take(max_n)
        {
            command.mark_delivered(now, redelivery_timeout);
            if command.delivery_count > 1 {
                debug!(
                    terminal = %self.terminal_id,
                    command_id = command.id,
                    attempt = command.delivery_count,
                    "Redelivering unacknowledged command"
                );
            }
            batch.push(command.clone());
        }

        self.delivered_count += batch.len() as u64;
        batch
    }

    /// Record the terminal's acknowledgment of a command
    pub fn acknowledge(&mut self, id: CommandId, now: DateTime<Utc>) -> Result<AckOutcome> {
        self.sweep(now);
        self.last_activity = Some(now);

        let Some(command) = self.commands.get_mut(&id) else {
            if id > 0 && id < self.next_id {
                // Settled and already collected
                return Ok(AckOutcome::Settled);
            }
            return Err(BridgeError::CommandNotFound {
                terminal_id: self.terminal_id.to_string(),
                command_id: id,
            });
        };

        match command.state {
            CommandState::Acknowledged => Ok(AckOutcome::AlreadyAcknowledged),
            CommandState::Expired => {
                debug!(terminal = %self.terminal_id, command_id = id, "Ack for expired command ignored");
                Ok(AckOutcome::Expired)
            }
            CommandState::Pending if command.delivery_count == 0 => {
                Err(BridgeError::Validation(format!(
                    "command {id} has not been delivered yet"
                )))
            }
            CommandState::Pending | CommandState::Delivered => {
                command.settle(CommandState::Acknowledged, now);
                self.acknowledged_count += 1;
                debug!(terminal = %self.terminal_id, command_id = id, "Command acknowledged");
                Ok(AckOutcome::Acknowledged)
            }
        }
    }

    /// Apply TTL expiry and redelivery timeouts, then drop settled commands
    /// past their retention. Returns the number of commands newly expired.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let mut expired = 0;

        for command in self.commands.values_mut() {
            if !command.state.is_active() {
                continue;
            }
            if command.is_past_ttl(now, self.policy.ttl) {
                command.settle(CommandState::Expired, now);
                expired += 1;
            } else if command.is_redelivery_due(now) {
                command.requeue();
            }
        }

        let retention = self.policy.settled_retention;
        let before = self.commands.len();
        self.commands.retain(|_, c| !c.is_collectable(now, retention));
        let collected = before - self.commands.len();

        if expired > 0 {
            self.expired_count += expired as u64;
            debug!(terminal = %self.terminal_id, expired, "Expired unacknowledged commands");
        }
        if collected > 0 {
            debug!(terminal = %self.terminal_id, collected, "Collected settled commands");
        }

        expired
    }

    /// Pending + delivered commands, the quantity bounded by `max_len`
    pub fn active_len(&self) -> usize {
        self.commands.values().filter(|c| c.state.is_active()).count()
    }

    /// All retained commands, settled ones included
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn get(&self, id: CommandId) -> Option<&Command> {
        self.commands.get(&id)
    }

    /// Id the next accepted command will get
    pub fn next_id(&self) -> CommandId {
        self.next_id
    }

    /// Nothing retained and no traffic for `policy.idle_eviction`
    pub fn is_idle(&self, now: DateTime<Utc>) -> bool {
        let idle_for = self.policy.idle_eviction;
        idle_for > Duration::zero()
            && self.commands.is_empty()
            && self
                .last_activity
                .map_or(true, |at| now - at >= idle_for)
    }

    /// Get queue statistics
    pub fn stats(&self) -> QueueStats {
        let mut pending = 0;
        let mut delivered = 0;
        for command in self.commands.values() {
            match command.state {
                CommandState::Pending => pending += 1,
                CommandState::Delivered => delivered += 1,
                CommandState::Acknowledged | CommandState::Expired => {}
            }
        }

        QueueStats {
            pending,
            delivered,
            retained: self.commands.len(),
            max_len: self.policy.max_len,
            enqueued_total: self.enqueued_count,
            delivered_total: self.delivered_count,
            acknowledged_total: self.acknowledged_count,
            expired_total: self.expired_count,
            rejected_total: self.rejected_count,
        }
    }
}

/// Queue statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub delivered: usize,
    pub retained: usize,
    pub max_len: usize,
    pub enqueued_total: u64,
    pub delivered_total: u64,
    pub acknowledged_total: u64,
    pub expired_total: u64,
    pub rejected_total: u64,
}

impl QueueStats {
    pub fn active(&self) -> usize {
        self.pending + self.delivered
    }

    /// Fold another queue's stats into this one
    pub fn merge(&mut self, other: &QueueStats) {
        self.pending += other.pending;
        self.delivered += other.delivered;
        self.retained += other.retained;
        self.max_len += other.max_len;
        self.enqueued_total += other.enqueued_total;
        self.delivered_total += other.delivered_total;
        self.acknowledged_total += other.acknowledged_total;
        self.expired_total += other.expired_total;
        self.rejected_total += other.rejected_total;
    }
}

impl std::fmt::Display for QueueStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Queue[{}/{}, P={}/D={}, enq={}, dlv={}, ack={}, exp={}, rej={}]",
            self.active(),
            self.max_len,
            self.pending,
            self.delivered,
            self.enqueued_total,
            self.delivered_total,
            self.acknowledged_total,
            self.expired_total,
            self.rejected_total
        )
    }
}
