pub mod api_server;
pub mod sweeper;

pub use api_server::{shutdown_signal, start_api_server};
pub use sweeper::CommandSweeper;
