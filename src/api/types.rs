use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::error;

use crate::bridge::Heartbeat;
use crate::domain::{AckOutcome, CommandId, StatusReport, StatusSnapshot, TerminalId, TradeEvent};
use crate::error::{BridgeError, Result};
use crate::store::QueueStats;

// ============================================================================
// Terminal Identity
// ============================================================================

/// Terminal id as sent by clients: MT5 account numbers arrive as JSON numbers,
/// EA names as strings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TerminalRef {
    Text(String),
    Number(i64),
}

impl TerminalRef {
    pub fn parse(&self) -> Result<TerminalId> {
        match self {
            TerminalRef::Text(raw) => TerminalId::parse(raw),
            TerminalRef::Number(n) => TerminalId::parse(&n.to_string()),
        }
    }
}

fn require_terminal(terminal_id: Option<&TerminalRef>) -> Result<TerminalId> {
    terminal_id
        .ok_or_else(|| BridgeError::Validation("missing 'terminal_id' field".to_string()))?
        .parse()
}

// ============================================================================
// Status Types
// ============================================================================

/// Body of `POST /api/mt5/update`.
///
/// When `payload` is absent, every field other than the terminal id,
/// `observed_at` and `trade` is taken as the status payload, which is how
/// EAs that post their account state as a flat object are handled.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateRequest {
    #[serde(default, alias = "account")]
    pub terminal_id: Option<TerminalRef>,
    #[serde(default, alias = "timestamp")]
    pub observed_at: Option<i64>,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default)]
    pub trade: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UpdateRequest {
    pub fn into_report(self) -> Result<StatusReport> {
        let terminal_id = require_terminal(self.terminal_id.as_ref())?;
        let observed_at = self
            .observed_at
            .ok_or_else(|| BridgeError::Validation("missing 'observed_at' field".to_string()))?;

        let payload = match self.payload {
            Some(Value::Null) => {
                return Err(BridgeError::Validation(
                    "'payload' must not be null".to_string(),
                ))
            }
            Some(payload) => payload,
            None => Value::Object(self.extra),
        };

        Ok(StatusReport {
            terminal_id,
            payload,
            observed_at,
            trade: self.trade.filter(|t| !t.is_null()),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateResponse {
    pub status: String,
    pub terminal_id: TerminalId,
    pub observed_at: i64,
    pub received_at: DateTime<Utc>,
    pub message: String,
}

/// Query string shared by the terminal-scoped GET endpoints
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TerminalQuery {
    #[serde(default, alias = "account")]
    pub terminal_id: Option<String>,
    pub limit: Option<usize>,
}

impl TerminalQuery {
    /// Parsed terminal id, `None` when the parameter is absent or blank
    pub fn terminal(&self) -> Result<Option<TerminalId>> {
        match self.terminal_id.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => TerminalId::parse(raw).map(Some),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TerminalStatusResponse {
    #[serde(flatten)]
    pub snapshot: StatusSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<QueueStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverviewSummary {
    pub total_terminals: usize,
    pub online_terminals: usize,
    pub total_trades: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverviewResponse {
    pub terminals: Vec<StatusSnapshot>,
    pub summary: OverviewSummary,
}

// ============================================================================
// Command Types
// ============================================================================

/// Body of `POST /api/mt5/command`. As with updates, a flat body without
/// `payload` is itself the payload (e.g. `{"account": 1, "command": "trade",
/// "action": "close_all"}`).
#[derive(Debug, Clone, Deserialize)]
pub struct CommandRequest {
    #[serde(default, alias = "account")]
    pub terminal_id: Option<TerminalRef>,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CommandRequest {
    pub fn into_parts(self) -> Result<(TerminalId, Value)> {
        let terminal_id = require_terminal(self.terminal_id.as_ref())?;
        let payload = self.payload.unwrap_or(Value::Object(self.extra));

        let empty = match &payload {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            Value::String(s) => s.trim().is_empty(),
            _ => false,
        };
        if empty {
            return Err(BridgeError::Validation(
                "command payload must not be empty".to_string(),
            ));
        }

        Ok((terminal_id, payload))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    pub status: String,
    pub command_id: CommandId,
    pub terminal_id: TerminalId,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AckRequest {
    #[serde(default, alias = "account")]
    pub terminal_id: Option<TerminalRef>,
    #[serde(default)]
    pub command_id: Option<CommandId>,
}

impl AckRequest {
    pub fn into_parts(self) -> Result<(TerminalId, CommandId)> {
        let terminal_id = require_terminal(self.terminal_id.as_ref())?;
        let command_id = self
            .command_id
            .ok_or_else(|| BridgeError::Validation("missing 'command_id' field".to_string()))?;
        Ok((terminal_id, command_id))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckResponse {
    pub status: String,
    pub terminal_id: TerminalId,
    pub command_id: CommandId,
    pub outcome: AckOutcome,
}

// ============================================================================
// Trade Types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct TradesResponse {
    pub count: usize,
    pub trades: Vec<TradeEvent>,
}

// ============================================================================
// System Types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct RootResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub endpoints: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HeartbeatResponse {
    pub status: String,
    pub uptime_seconds: i64,
    #[serde(flatten)]
    pub heartbeat: Heartbeat,
}

// ============================================================================
// Error Responses
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl BridgeError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            BridgeError::Validation(_) | BridgeError::Json(_) => StatusCode::BAD_REQUEST,
            BridgeError::NotFound(_) | BridgeError::CommandNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            BridgeError::StaleUpdate { .. } => StatusCode::CONFLICT,
            BridgeError::QueueFull { .. } => StatusCode::TOO_MANY_REQUESTS,
            BridgeError::Config(_)
            | BridgeError::Io(_)
            | BridgeError::Internal(_)
            | BridgeError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        let body = ErrorBody {
            error: self.kind().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
