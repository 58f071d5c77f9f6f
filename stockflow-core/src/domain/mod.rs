//! Domain types for StockFlow

pub mod bar;
pub mod partition;

pub use bar::RawBar;
pub use partition::{PartitionKey, Phase};
