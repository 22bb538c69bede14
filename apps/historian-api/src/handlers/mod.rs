//! Handlers 模块

pub mod readings;
pub mod sources;
pub mod system;

pub use readings::*;
pub use sources::*;
pub use system::*;
