use chrono::{DateTime, Utc};

use crate::bridge::Bridge;

/// Shared application state for API handlers
#[derive(Clone)]
pub struct AppState {
    /// Status store, command queues and trade log
    pub bridge: Bridge,

    /// Application start time
    pub start_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(bridge: Bridge) -> Self {
        Self {
            start_time: bridge.now(),
            bridge,
        }
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> i64 {
        (self.bridge.now() - self.start_time).num_seconds()
    }
}
