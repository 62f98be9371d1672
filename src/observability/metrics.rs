use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Lock-free counters for one pipeline run
#[derive(Debug, Default)]
pub struct RunMetrics {
    blocks_started: AtomicU64,
    blocks_completed: AtomicU64,
    blocks_failed: AtomicU64,
    total_latency_us: AtomicU64,
    latency_samples: AtomicU64,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blocks_started(&self) -> u64 {
        self.blocks_started.load(Ordering::Relaxed)
    }

    pub fn blocks_completed(&self) -> u64 {
        self.blocks_completed.load(Ordering::Relaxed)
    }

    pub fn blocks_failed(&self) -> u64 {
        self.blocks_failed.load(Ordering::Relaxed)
    }

    pub fn record_block_started(&self) {
        self.blocks_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_block_completed(&self) {
        self.blocks_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_block_failed(&self) {
        self.blocks_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_latency(&self, elapsed: Duration) {
        let latency_us = elapsed.as_micros() as u64;
        self.total_latency_us.fetch_add(latency_us, Ordering::Relaxed);
        self.latency_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn avg_latency_us(&self) -> u64 {
        let samples = self.latency_samples.load(Ordering::Relaxed);
        if samples == 0 {
            return 0;
        }
        self.total_latency_us.load(Ordering::Relaxed) / samples
    }
}

/// Point-in-time copy of [`RunMetrics`] plus per-stage error counts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub blocks_started: u64,
    pub blocks_completed: u64,
    pub blocks_failed: u64,
    pub avg_latency_us: u64,
    pub stage_errors: BTreeMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_avg_latency() {
        let metrics = RunMetrics::new();
        assert_eq!(metrics.avg_latency_us(), 0);

        metrics.record_latency(Duration::from_micros(100));
        metrics.record_latency(Duration::from_micros(300));
        assert_eq!(metrics.avg_latency_us(), 200);
    }
}
