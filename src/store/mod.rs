//! In-memory state owned by the bridge
//!
//! - `StatusStore`: latest status snapshot per terminal
//! - `CommandQueue` / `CommandStore`: per-terminal command queues
//! - `TradeLog`: bounded log of reported trades

mod commands;
mod queue;
mod status;
mod trades;

pub use commands::CommandStore;
pub use queue::{CommandQueue, QueuePolicy, QueueStats};
pub use status::StatusStore;
pub use trades::TradeLog;
