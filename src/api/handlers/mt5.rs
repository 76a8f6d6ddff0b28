use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Query, State},
    Json,
};

use crate::api::{state::AppState, types::*};
use crate::bridge::CommandBatch;
use crate::error::{BridgeError, Result};

/// Default number of trades returned by `GET /api/mt5/trades`
const DEFAULT_TRADES_LIMIT: usize = 50;

fn json_body<T>(body: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    body.map(|Json(inner)| inner)
        .map_err(|rejection| BridgeError::Validation(rejection.body_text()))
}

fn query_params(query: std::result::Result<Query<TerminalQuery>, QueryRejection>) -> Result<TerminalQuery> {
    query
        .map(|Query(inner)| inner)
        .map_err(|rejection| BridgeError::Validation(rejection.body_text()))
}

/// POST /api/mt5/update -- EA status report
pub async fn receive_update(
    State(state): State<AppState>,
    body: std::result::Result<Json<UpdateRequest>, JsonRejection>,
) -> Result<Json<UpdateResponse>> {
    let report = json_body(body)?.into_report()?;
    let snapshot = state.bridge.ingest(report)?;

    Ok(Json(UpdateResponse {
        status: "success".to_string(),
        message: "Data received successfully".to_string(),
        terminal_id: snapshot.terminal_id,
        observed_at: snapshot.observed_at,
        received_at: snapshot.received_at,
    }))
}

/// GET /api/mt5/status?terminal_id=... -- one terminal, or an overview without an id
pub async fn get_status(
    State(state): State<AppState>,
    query: std::result::Result<Query<TerminalQuery>, QueryRejection>,
) -> Result<Json<serde_json::Value>> {
    let query = query_params(query)?;

    let body = match query.terminal()? {
        Some(terminal_id) => {
            let snapshot = state.bridge.status(&terminal_id)?;
            let queue = state.bridge.queue_stats(&terminal_id).await;
            serde_json::to_value(TerminalStatusResponse { snapshot, queue })?
        }
        None => {
            let overview = state.bridge.status_overview().await;
            serde_json::to_value(OverviewResponse {
                summary: OverviewSummary {
                    total_terminals: overview.total_terminals,
                    online_terminals: overview.online_terminals,
                    total_trades: overview.total_trades,
                },
                terminals: overview.terminals,
            })?
        }
    };

    Ok(Json(body))
}

/// POST /api/mt5/command -- mobile app submits a command
pub async fn submit_command(
    State(state): State<AppState>,
    body: std::result::Result<Json<CommandRequest>, JsonRejection>,
) -> Result<Json<CommandResponse>> {
    let (terminal_id, payload) = json_body(body)?.into_parts()?;
    let command_id = state.bridge.submit_command(&terminal_id, payload).await?;

    Ok(Json(CommandResponse {
        status: "queued".to_string(),
        message: format!("Command {command_id} queued for terminal {terminal_id}"),
        command_id,
        terminal_id,
    }))
}

/// GET /api/mt5/commands?terminal_id=...&limit=n -- EA poll; returned commands become Delivered
pub async fn poll_commands(
    State(state): State<AppState>,
    query: std::result::Result<Query<TerminalQuery>, QueryRejection>,
) -> Result<Json<CommandBatch>> {
    let query = query_params(query)?;
    let raw_terminal_id = query
        .terminal_id
        .as_deref()
        .ok_or_else(|| BridgeError::Validation("missing 'terminal_id' parameter".to_string()))?;

    let batch = state.bridge.poll_commands(raw_terminal_id, query.limit).await?;
    Ok(Json(batch))
}

/// POST /api/mt5/ack -- EA confirms a command
pub async fn acknowledge_command(
    State(state): State<AppState>,
    body: std::result::Result<Json<AckRequest>, JsonRejection>,
) -> Result<Json<AckResponse>> {
    let (terminal_id, command_id) = json_body(body)?.into_parts()?;
    let outcome = state.bridge.acknowledge(&terminal_id, command_id).await?;

    Ok(Json(AckResponse {
        status: "ok".to_string(),
        terminal_id,
        command_id,
        outcome,
    }))
}

/// GET /api/mt5/trades?terminal_id=...&limit=n
pub async fn get_trades(
    State(state): State<AppState>,
    query: std::result::Result<Query<TerminalQuery>, QueryRejection>,
) -> Result<Json<TradesResponse>> {
    let query = query_params(query)?;
    let terminal_id = query.terminal()?;
    let limit = query.limit.unwrap_or(DEFAULT_TRADES_LIMIT);

    let trades = state.bridge.recent_trades(terminal_id.as_ref(), limit);

    Ok(Json(TradesResponse {
        count: trades.len(),
        trades,
    }))
}
