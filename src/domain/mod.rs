pub mod command;
pub mod status;
pub mod terminal;
pub mod trade;

pub use command::*;
pub use status::*;
pub use terminal::*;
pub use trade::*;
