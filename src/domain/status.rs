use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::terminal::TerminalId;

/// A status report as delivered by an EA, before the server stamps it
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub terminal_id: TerminalId,
    /// Opaque status document (balance, equity, positions, ...)
    pub payload: serde_json::Value,
    /// Source-side timestamp; must grow between accepted reports
    pub observed_at: i64,
    /// Optional trade event carried along with the report
    pub trade: Option<serde_json::Value>,
}

/// Latest accepted status of one terminal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub terminal_id: TerminalId,
    pub payload: serde_json::Value,
    pub observed_at: i64,
    pub received_at: DateTime<Utc>,
}

impl StatusSnapshot {
    /// Whether `observed_at` would move this snapshot forward
    pub fn is_superseded_by(&self, observed_at: i64) -> bool {
        observed_at > self.observed_at
    }

    /// Seconds since the server received this snapshot
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.received_at).num_seconds()
    }
}
