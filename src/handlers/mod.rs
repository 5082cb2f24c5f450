pub mod config;
pub mod index;
pub mod predict;

pub use self::config::*;
pub use self::index::*;
pub use self::predict::*;
