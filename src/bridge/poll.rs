//! Poll coordination: serves EA command retrieval against the command store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::Clock;
use crate::domain::{Command, CommandId, TerminalId};
use crate::error::Result;
use crate::store::CommandStore;

/// One command as handed to the terminal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveredCommand {
    /// Dedup key: the terminal must treat repeated ids idempotently
    pub id: CommandId,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    /// 1 on first delivery, higher on redelivery
    pub attempt: u32,
    /// Deadline for the ack before the command is offered again
    pub ack_deadline: Option<DateTime<Utc>>,
}

impl From<Command> for DeliveredCommand {
    fn from(command: Command) -> Self {
        Self {
            id: command.id,
            payload: command.payload,
            created_at: command.created_at,
            attempt: command.delivery_count,
            ack_deadline: command.redeliver_at,
        }
    }
}

/// Poll response, commands in ascending id order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandBatch {
    pub terminal_id: TerminalId,
    pub count: usize,
    pub commands: Vec<DeliveredCommand>,
}

/// Applies the batch policy on top of `CommandStore::poll`
#[derive(Debug, Clone)]
pub struct PollCoordinator {
    commands: CommandStore,
    max_batch: usize,
}

impl PollCoordinator {
    pub fn new(commands: CommandStore, max_batch: usize) -> Self {
        Self {
            commands,
            max_batch: max_batch.max(1),
        }
    }

    /// Clamp a requested batch size into `[1, max_batch]`
    pub fn batch_size(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.max_batch)
            .clamp(1, self.max_batch)
    }

    /// Validate the terminal identity, deliver a batch and shape it for the wire
    pub async fn poll(
        &self,
        raw_terminal_id: &str,
        requested: Option<usize>,
        clock: &dyn Clock,
    ) -> Result<CommandBatch> {
        let terminal_id = TerminalId::parse(raw_terminal_id)?;
        let batch_size = self.batch_size(requested);

        let mut delivered = self.commands.poll(&terminal_id, batch_size, clock).await;
        // The queue already yields id order; keep the guarantee explicit at the boundary
        delivered.sort_by_key(|c| c.id);

        if !delivered.is_empty() {
            debug!(
                terminal = %terminal_id,
                count = delivered.len(),
                first = delivered[0].id,
                "Delivering commands"
            );
        }

        let commands: Vec<DeliveredCommand> =
            delivered.into_iter().map(DeliveredCommand::from).collect();

        Ok(CommandBatch {
            terminal_id,
            count: commands.len(),
            commands,
        })
    }
}
