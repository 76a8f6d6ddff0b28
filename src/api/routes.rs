use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::{handlers, state::AppState};

pub fn create_router(state: AppState) -> Router {
    // CORS configuration (the mobile app calls from arbitrary origins)
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // System endpoints
        .route("/", get(handlers::root))
        .route("/api/mt5/heartbeat", get(handlers::heartbeat))
        // EA endpoints
        .route("/api/mt5/update", post(handlers::receive_update))
        .route("/api/mt5/commands", get(handlers::poll_commands))
        .route("/api/mt5/ack", post(handlers::acknowledge_command))
        // Mobile endpoints
        .route("/api/mt5/status", get(handlers::get_status))
        .route("/api/mt5/command", post(handlers::submit_command))
        .route("/api/mt5/trades", get(handlers::get_trades))
        // Add state, tracing and CORS
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
