use axum::{extract::State, Json};
use std::collections::BTreeMap;

use crate::api::{state::AppState, types::*};

/// GET / -- liveness probe, touches no relay state
pub async fn root(State(state): State<AppState>) -> Json<RootResponse> {
    let endpoints = [
        ("POST /api/mt5/update", "EA sends status"),
        ("GET /api/mt5/commands", "EA polls for commands"),
        ("POST /api/mt5/ack", "EA acknowledges a command"),
        ("GET /api/mt5/status", "Mobile app fetches status"),
        ("POST /api/mt5/command", "Mobile app sends a command"),
        ("GET /api/mt5/trades", "Mobile app fetches recent trades"),
        ("GET /api/mt5/heartbeat", "Check server health"),
    ]
    .into_iter()
    .map(|(route, purpose)| (route.to_string(), purpose.to_string()))
    .collect::<BTreeMap<_, _>>();

    Json(RootResponse {
        status: "online".to_string(),
        service: "MT5 Trading Bridge".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: state.bridge.now(),
        endpoints,
    })
}

/// GET /api/mt5/heartbeat
pub async fn heartbeat(State(state): State<AppState>) -> Json<HeartbeatResponse> {
    Json(HeartbeatResponse {
        status: "alive".to_string(),
        uptime_seconds: state.uptime_seconds(),
        heartbeat: state.bridge.heartbeat().await,
    })
}
