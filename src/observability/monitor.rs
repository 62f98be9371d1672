use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{error, info};

use super::{MetricsSnapshot, RunMetrics};
use crate::core::StageOutputs;

/// Per-block report handed to [`PipelineMonitor::on_block_end`]
#[derive(Debug, Clone)]
pub struct BlockSummary {
    pub block_index: usize,
    pub duration: Duration,
    /// Everything produced for the block, or `None` when a stage failed
    pub outputs: Option<StageOutputs>,
}

/// Observer hooks called by the executor. Implementations must not fail.
pub trait PipelineMonitor: Send + Sync {
    fn on_block_start(&self, _block_index: usize) {}

    fn on_block_end(&self, _summary: &BlockSummary) {}

    fn on_error(&self, _block_index: usize, _stage_name: &str, _error: &anyhow::Error) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMonitor;

impl PipelineMonitor for NoopMonitor {}

/// Writes one log line per block event
#[derive(Debug, Clone)]
pub struct ConsoleMonitor {
    prefix: String,
}

impl ConsoleMonitor {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for ConsoleMonitor {
    fn default() -> Self {
        Self::new("[blockflow]")
    }
}

impl PipelineMonitor for ConsoleMonitor {
    fn on_block_start(&self, block_index: usize) {
        info!("{} block {} start", self.prefix, block_index);
    }

    fn on_block_end(&self, summary: &BlockSummary) {
        let outputs: Vec<&str> = summary
            .outputs
            .as_ref()
            .map(|outputs| outputs.keys().map(String::as_str).collect())
            .unwrap_or_default();
        info!(
            "{} block {} end duration={:.4}s outputs={:?}",
            self.prefix,
            summary.block_index,
            summary.duration.as_secs_f64(),
            outputs
        );
    }

    fn on_error(&self, block_index: usize, stage_name: &str, err: &anyhow::Error) {
        error!("{} block {} error in {}: {:#}", self.prefix, block_index, stage_name, err);
    }
}

/// Aggregates block counts, latency and per-stage errors
#[derive(Debug, Default, Clone)]
pub struct MetricsMonitor {
    metrics: Arc<RunMetrics>,
    stage_errors: Arc<Mutex<BTreeMap<String, u64>>>,
}

impl MetricsMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metrics(&self) -> &RunMetrics {
        &self.metrics
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let stage_errors = self
            .stage_errors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        MetricsSnapshot {
            blocks_started: self.metrics.blocks_started(),
            blocks_completed: self.metrics.blocks_completed(),
            blocks_failed: self.metrics.blocks_failed(),
            avg_latency_us: self.metrics.avg_latency_us(),
            stage_errors,
        }
    }

    pub fn generate_report(&self) -> String {
        let snapshot = self.snapshot();

        if snapshot.blocks_started == 0 {
            return "No blocks processed".to_string();
        }

        let mut report = String::from("=== Pipeline Metrics ===\n");
        report.push_str(&format!(
            "  Blocks: {} completed, {} failed\n  Avg Latency: {}μs\n",
            snapshot.blocks_completed, snapshot.blocks_failed, snapshot.avg_latency_us
        ));

        for (stage, count) in &snapshot.stage_errors {
            report.push_str(&format!(
                "\n[{}]\n  Errors: {} error{}\n",
                stage,
                count,
                if *count == 1 { "" } else { "s" }
            ));
        }

        report
    }
}

impl PipelineMonitor for MetricsMonitor {
    fn on_block_start(&self, _block_index: usize) {
        self.metrics.record_block_started();
    }

    fn on_block_end(&self, summary: &BlockSummary) {
        self.metrics.record_latency(summary.duration);
        if summary.outputs.is_some() {
            self.metrics.record_block_completed();
        } else {
            self.metrics.record_block_failed();
        }
    }

    fn on_error(&self, _block_index: usize, stage_name: &str, _error: &anyhow::Error) {
        let mut errors = self
            .stage_errors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *errors.entry(stage_name.to_string()).or_insert(0) += 1;
    }
}

impl<M: PipelineMonitor + ?Sized> PipelineMonitor for Arc<M> {
    fn on_block_start(&self, block_index: usize) {
        (**self).on_block_start(block_index);
    }

    fn on_block_end(&self, summary: &BlockSummary) {
        (**self).on_block_end(summary);
    }

    fn on_error(&self, block_index: usize, stage_name: &str, error: &anyhow::Error) {
        (**self).on_error(block_index, stage_name, error);
    }
}
