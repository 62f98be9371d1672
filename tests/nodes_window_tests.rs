use approx::assert_relative_eq;
use blockflow::nodes::{SlidingWindow, WindowBuffer};
use blockflow::{Block, Stage, StageInputs};
use chrono::{DateTime, Duration, TimeZone, Utc};
use ndarray::Array2;

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Two channels; channel 0 holds the absolute sample index, channel 1 its negation.
fn ramp(start: usize, len: usize, rate: f64) -> Block {
    let values = Array2::from_shape_fn((len, 2), |(i, c)| {
        let n = (start + i) as f64;
        if c == 0 {
            n
        } else {
            -n
        }
    });
    Block::new(values, rate, epoch()).unwrap()
}

fn feed(stage: &mut dyn Stage, key: &str, out: &str, blocks: usize, size: usize, rate: f64) -> Vec<Block> {
    let mut windows = Vec::new();
    for b in 0..blocks {
        let mut inputs = StageInputs::new();
        inputs.insert(key.to_string(), ramp(b * size, size, rate));
        if let Some(window) = stage.process(&inputs).unwrap().remove(out) {
            windows.push(window);
        }
    }
    windows
}

#[test]
fn test_window_count_offsets_and_timestamps() {
    // 20 blocks of 10 samples, W=50 H=20: floor((200 - 50) / 20) + 1 windows
    let mut stage = WindowBuffer::new("x", Some("w"), 50, Some(20)).unwrap();
    let windows = feed(&mut stage, "x", "w", 20, 10, 10.0);
    assert_eq!(windows.len(), 8);

    for (i, window) in windows.iter().enumerate() {
        let offset = i * 20;
        assert_eq!(window.block_size(), 50);
        assert_eq!(window.channels(), 2);
        assert_eq!(window.values()[[0, 0]], offset as f64);
        assert_eq!(window.values()[[49, 1]], -((offset + 49) as f64));
        assert_eq!(window.timestamp(), epoch() + Duration::seconds(2 * i as i64));
        assert_eq!(window.sample_rate(), 10.0);

        let meta = window.metadata();
        assert_eq!(meta["window_size"], 50);
        assert_eq!(meta["hop_size"], 20);
        assert_eq!(meta["window_offset"], offset);
        assert_eq!(meta["slice"], serde_json::json!([offset, offset + 50, 1]));
    }
}

#[test]
fn test_one_window_per_call() {
    // a single 8-row block could fill three 4-row windows with hop 2
    let mut stage = WindowBuffer::new("x", Some("w"), 4, Some(2)).unwrap();
    let windows = feed(&mut stage, "x", "w", 3, 8, 10.0);

    let offsets: Vec<f64> = windows.iter().map(|w| w.values()[[0, 0]]).collect();
    assert_eq!(offsets, vec![0.0, 2.0, 4.0]);
    assert_eq!(stage.buffered_rows(), 24 - 6);
}

#[test]
fn test_default_hop_is_window() {
    let mut stage = WindowBuffer::new("x", None, 5, None).unwrap();
    assert_eq!(stage.hop_size(), 5);
    assert_eq!(stage.produces(), ["x_window".to_string()]);

    let windows = feed(&mut stage, "x", "x_window", 5, 5, 100.0);
    let offsets: Vec<f64> = windows.iter().map(|w| w.values()[[0, 0]]).collect();
    assert_eq!(offsets, vec![0.0, 5.0, 10.0, 15.0, 20.0]);
}

#[test]
fn test_sliding_window_converts_seconds() {
    let mut stage = SlidingWindow::new("x", "w", 2.0, 0.5).unwrap();
    let windows = feed(&mut stage, "x", "w", 8, 256, 256.0);
    assert_eq!(stage.latched_sizes(), Some((512, 128)));

    // one window per block once two seconds are buffered
    assert_eq!(windows.len(), 7);
    for (i, window) in windows.iter().enumerate() {
        assert_eq!(window.block_size(), 512);
        assert_eq!(window.values()[[0, 0]], (i * 128) as f64);
        assert_eq!(window.timestamp(), epoch() + Duration::milliseconds(500 * i as i64));
        assert_relative_eq!(window.metadata()["hop_seconds"].as_f64().unwrap(), 0.5);
        assert_relative_eq!(window.metadata()["window_seconds"].as_f64().unwrap(), 2.0);
    }
}

#[test]
fn test_tolerates_tiny_rate_jitter() {
    let mut stage = WindowBuffer::new("x", Some("w"), 4, None).unwrap();
    let mut inputs = StageInputs::new();
    inputs.insert("x".to_string(), ramp(0, 2, 1000.0));
    stage.process(&inputs).unwrap();

    inputs.insert("x".to_string(), ramp(2, 2, 1000.0 * (1.0 + 1e-7)));
    let out = stage.process(&inputs).unwrap();
    assert_eq!(out["w"].sample_rate(), 1000.0);
}

#[test]
fn test_window_metadata_carries_block_metadata() {
    let mut stage = WindowBuffer::new("x", Some("w"), 2, None).unwrap();
    let mut meta = blockflow::Metadata::new();
    meta.insert("sensor".to_string(), "accel".into());

    let mut inputs = StageInputs::new();
    inputs.insert("x".to_string(), ramp(0, 2, 10.0).with_metadata(meta));
    let out = stage.process(&inputs).unwrap();
    assert_eq!(out["w"].metadata()["sensor"], "accel");
}
