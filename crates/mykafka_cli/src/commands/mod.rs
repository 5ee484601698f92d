//! CLI command implementations.

pub mod consume;
pub mod dump;
pub mod info;
pub mod produce;
pub mod topic;
pub mod verify;

use mykafka_broker::{Broker, BrokerConfig, BrokerResult};
use std::path::Path;

/// Opens the broker rooted at `root` with default settings.
pub fn open_broker(root: &Path) -> BrokerResult<Broker> {
    Broker::open(BrokerConfig::new(root))
}

/// Renders a byte count with a binary unit.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Renders an optional offset, `-` when absent.
pub fn format_offset(offset: Option<u64>) -> String {
    offset.map_or_else(|| "-".to_string(), |o| o.to_string())
}
