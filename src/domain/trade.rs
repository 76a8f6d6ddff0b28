use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::terminal::TerminalId;

/// A trade event reported by a terminal alongside a status update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    pub terminal_id: TerminalId,
    pub trade: serde_json::Value,
    pub received_at: DateTime<Utc>,
}
