use blockflow::engine::PipelineConfig;
use blockflow::io::{MultiSensorDataset, SineDataset, StreamDataLoader};
use blockflow::observability::{BlockSummary, ConsoleMonitor, MetricsMonitor, PipelineMonitor};

/// Fans every callback out to both monitors
struct Tee(ConsoleMonitor, MetricsMonitor);

impl PipelineMonitor for Tee {
    fn on_block_start(&self, block_index: usize) {
        self.0.on_block_start(block_index);
        self.1.on_block_start(block_index);
    }

    fn on_block_end(&self, summary: &BlockSummary) {
        self.0.on_block_end(summary);
        self.1.on_block_end(summary);
    }

    fn on_error(&self, block_index: usize, stage_name: &str, error: &anyhow::Error) {
        self.0.on_error(block_index, stage_name, error);
        self.1.on_error(block_index, stage_name, error);
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("blockflow - multi-sensor windowing demo");
    println!("=======================================\n");

    // Two sensors sampled at 256 Hz, one second per block
    let sensors = MultiSensorDataset::default()
        .with_stream("sensor_a", SineDataset::new(4.0, 256.0, 256, 12)?)
        .with_stream("sensor_b", SineDataset::new(9.0, 256.0, 256, 12)?);
    let loader = StreamDataLoader::new(sensors).max_blocks(10);

    let config = serde_json::json!({
        "input_key": "multi",
        "output_keys": ["sensor_a_window", "sensor_b_window", "decision"],
        "on_error": "continue",
        "stages": [
            {"type": "SplitSensor", "config": {"input": "multi", "sensors": ["sensor_a", "sensor_b"]}},
            {"type": "Normalizer", "name": "norm_a", "config": {"input": "sensor_a_raw", "output": "sensor_a_norm"}},
            {"type": "Normalizer", "name": "norm_b", "config": {"input": "sensor_b_raw", "output": "sensor_b_norm"}},
            {"type": "SlidingWindow", "name": "window_a", "config": {
                "input": "sensor_a_norm", "output": "sensor_a_window",
                "window_seconds": 3.0, "hop_seconds": 1.0
            }},
            {"type": "SlidingWindow", "name": "window_b", "config": {
                "input": "sensor_b_norm", "output": "sensor_b_window",
                "window_seconds": 3.0, "hop_seconds": 1.0
            }},
            {"type": "Decision", "config": {"requires": ["sensor_a_window", "sensor_b_window"]}}
        ]
    });

    println!("Building pipeline from config...");
    let metrics = MetricsMonitor::new();
    let mut pipeline = PipelineConfig::from_json(config)?
        .into_builder()?
        .monitor(Tee(ConsoleMonitor::default(), metrics.clone()))
        .build(loader)?;
    println!("Execution order: {:?}\n", pipeline.stage_names());

    for (i, outputs) in pipeline.run().enumerate() {
        let outputs = outputs?;
        let keys: Vec<&str> = outputs.keys().map(String::as_str).collect();
        match outputs.get("decision") {
            Some(decision) => println!(
                "output {}: {:?} decision={:.4}",
                i,
                keys,
                decision.values()[[0, 0]]
            ),
            None => println!("output {}: {:?} (windows still filling)", i, keys),
        }
    }

    println!("\n{}", metrics.generate_report());
    Ok(())
}
