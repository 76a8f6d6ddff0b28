use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::terminal::TerminalId;

/// Server-assigned command id, strictly increasing per terminal
pub type CommandId = u64;

/// Delivery state of a queued command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandState {
    /// Waiting to be handed to the terminal
    Pending,
    /// Handed out, waiting for acknowledgment
    Delivered,
    /// Confirmed by the terminal
    Acknowledged,
    /// Not acknowledged within its TTL
    Expired,
}

impl CommandState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandState::Pending => "pending",
            CommandState::Delivered => "delivered",
            CommandState::Acknowledged => "acknowledged",
            CommandState::Expired => "expired",
        }
    }

    /// Acknowledged and Expired accept no further transitions
    pub fn is_settled(&self) -> bool {
        matches!(self, CommandState::Acknowledged | CommandState::Expired)
    }

    /// Pending and Delivered commands count against the queue cap
    pub fn is_active(&self) -> bool {
        !self.is_settled()
    }

    /// Check if this state can transition to another state
    pub fn can_transition_to(&self, target: CommandState) -> bool {
        use CommandState::*;

        match (self, target) {
            (Pending, Delivered) => true,
            // Redelivery timeout elapsed
            (Delivered, Pending) => true,
            (Delivered, Acknowledged) => true,
            // Late ack after the redelivery timeout put it back in line
            (Pending, Acknowledged) => true,
            (Pending, Expired) | (Delivered, Expired) => true,
            _ => false,
        }
    }
}

impl fmt::Display for CommandState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of acknowledging a command. None of these are errors: acks may race
/// the expiry sweep or be retried by the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckOutcome {
    /// The command moved to Acknowledged
    Acknowledged,
    /// A previous ack already settled it
    AlreadyAcknowledged,
    /// It expired before the ack arrived
    Expired,
    /// It was settled and has since been garbage collected
    Settled,
}

impl AckOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AckOutcome::Acknowledged => "acknowledged",
            AckOutcome::AlreadyAcknowledged => "already_acknowledged",
            AckOutcome::Expired => "expired",
            AckOutcome::Settled => "settled",
        }
    }
}

/// A command submitted by the mobile app for one terminal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub id: CommandId,
    pub terminal_id: TerminalId,
    /// Opaque instruction; the bridge never interprets it
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub state: CommandState,
    /// Time of the most recent delivery
    pub delivered_at: Option<DateTime<Utc>>,
    /// When an unacknowledged delivery becomes eligible again
    pub redeliver_at: Option<DateTime<Utc>>,
    /// Number of times the command has been handed out
    pub delivery_count: u32,
    /// When the command reached Acknowledged or Expired
    pub settled_at: Option<DateTime<Utc>>,
}

impl Command {
    pub fn new(
        id: CommandId,
        terminal_id: TerminalId,
        payload: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            terminal_id,
            payload,
            created_at: now,
            state: CommandState::Pending,
            delivered_at: None,
            redeliver_at: None,
            delivery_count: 0,
            settled_at: None,
        }
    }

    /// TTL is measured from creation, regardless of deliveries
    pub fn is_past_ttl(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.created_at >= ttl
    }

    /// Delivered and the redelivery deadline has passed without an ack
    pub fn is_redelivery_due(&self, now: DateTime<Utc>) -> bool {
        self.state == CommandState::Delivered && self.redeliver_at.is_some_and(|at| now >= at)
    }

    /// Settled long enough ago to drop from the queue
    pub fn is_collectable(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        self.state.is_settled() && self.settled_at.is_some_and(|at| now - at >= retention)
    }

    pub(crate) fn mark_delivered(&mut self, now: DateTime<Utc>, redelivery_timeout: Duration) {
        debug_assert!(self.state.can_transition_to(CommandState::Delivered));
        self.state = CommandState::Delivered;
        self.delivered_at = Some(now);
        self.redeliver_at = Some(now + redelivery_timeout);
        self.delivery_count += 1;
    }

    pub(crate) fn requeue(&mut self) {
        debug_assert!(self.state.can_transition_to(CommandState::Pending));
        self.state = CommandState::Pending;
        self.redeliver_at = None;
    }

    pub(crate) fn settle(&mut self, state: CommandState, now: DateTime<Utc>) {
        debug_assert!(state.is_settled() && self.state.can_transition_to(state));
        self.state = state;
        self.redeliver_at = None;
        self.settled_at = Some(now);
    }
}
