use std::sync::Arc;
use std::thread;
use std::time::Duration;

use blockflow::observability::RunMetrics;

#[test]
fn test_metrics_creation() {
    let metrics = RunMetrics::new();
    assert_eq!(metrics.blocks_started(), 0);
    assert_eq!(metrics.blocks_completed(), 0);
    assert_eq!(metrics.blocks_failed(), 0);
}

#[test]
fn test_metrics_increment_across_threads() {
    let metrics = Arc::new(RunMetrics::new());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let metrics = Arc::clone(&metrics);
            thread::spawn(move || {
                for _ in 0..25 {
                    metrics.record_block_started();
                    metrics.record_block_completed();
                }
                metrics.record_block_failed();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(metrics.blocks_started(), 100);
    assert_eq!(metrics.blocks_completed(), 100);
    assert_eq!(metrics.blocks_failed(), 4);
}

#[test]
fn test_metrics_latency_tracking() {
    let metrics = RunMetrics::new();
    metrics.record_latency(Duration::from_millis(10));
    metrics.record_latency(Duration::from_millis(20));
    assert_eq!(metrics.avg_latency_us(), 15_000);
}
