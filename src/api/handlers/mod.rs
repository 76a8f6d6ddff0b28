pub mod mt5;
pub mod system;

pub use mt5::*;
pub use system::*;
