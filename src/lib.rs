pub mod api;
pub mod bridge;
pub mod cli;
pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod store;

pub use bridge::{Bridge, CommandBatch, DeliveredCommand, PollCoordinator};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use domain::{
    AckOutcome, Command, CommandId, CommandState, StatusReport, StatusSnapshot, TerminalId,
    TradeEvent,
};
pub use error::{BridgeError, Result};
pub use store::{CommandQueue, CommandStore, QueuePolicy, QueueStats, StatusStore, TradeLog};
