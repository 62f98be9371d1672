pub mod metrics;
pub mod monitor;

pub use metrics::{MetricsSnapshot, RunMetrics};
pub use monitor::{BlockSummary, ConsoleMonitor, MetricsMonitor, NoopMonitor, PipelineMonitor};
