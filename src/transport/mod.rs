//! Transport health monitoring and selection.

pub mod monitor;
pub mod optimizer;

pub use monitor::{InMemoryNetworkMonitor, NetworkMetrics, NetworkMonitor};
pub use optimizer::TransportOptimizer;
