use thiserror::Error;

use crate::domain::CommandId;

/// Main error type for the bridge
#[derive(Error, Debug)]
pub enum BridgeError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Request errors
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // Status errors
    #[error("Stale update for {terminal_id}: observed_at {observed_at} <= current {current}")]
    StaleUpdate {
        terminal_id: String,
        observed_at: i64,
        current: i64,
    },

    // Command queue errors
    #[error("Command queue full for {terminal_id} (capacity {capacity})")]
    QueueFull { terminal_id: String, capacity: usize },

    #[error("Command {command_id} not found for {terminal_id}")]
    CommandNotFound {
        terminal_id: String,
        command_id: CommandId,
    },

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl BridgeError {
    /// Short machine-readable kind, used as the `error` field of API responses
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::Validation(_) | BridgeError::Json(_) => "validation_error",
            BridgeError::NotFound(_) => "not_found",
            BridgeError::StaleUpdate { .. } => "stale_update",
            BridgeError::QueueFull { .. } => "queue_full",
            BridgeError::CommandNotFound { .. } => "command_not_found",
            BridgeError::Config(_)
            | BridgeError::Io(_)
            | BridgeError::Internal(_)
            | BridgeError::Other(_) => "internal_error",
        }
    }

    /// Whether the caller may retry the same request later and expect success
    pub fn is_retryable(&self) -> bool {
        matches!(self, BridgeError::QueueFull { .. })
    }
}

/// Result type alias for BridgeError
pub type Result<T> = std::result::Result<T, BridgeError>;
