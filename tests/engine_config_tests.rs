use std::io::Write;

use blockflow::io::{Dataset, SineDataset};
use blockflow::{ErrorPolicy, PipelineConfig, PipelineError};
use tempfile::NamedTempFile;

const CONFIG: &str = r#"{
    "input_key": "raw",
    "output_keys": ["raw_ma3_window", "spectrum"],
    "on_error": "continue",
    "stages": [
        {"type": "Spectrum", "config": {"input": "raw_ma3_window", "output": "spectrum"}},
        {"type": "WindowBuffer", "name": "window", "config": {"input": "raw_ma3", "window_size": 64, "hop_size": 32}},
        {"type": "MovingAverage", "name": "smooth", "config": {"input": "raw", "window": 3}}
    ]
}"#;

fn config_file(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file
}

#[test]
fn test_pipeline_from_file() {
    let file = config_file(CONFIG);
    let config = PipelineConfig::from_file(file.path()).unwrap();
    assert_eq!(config.input_key, "raw");
    assert_eq!(config.on_error, ErrorPolicy::Continue);
    assert_eq!(config.stages.len(), 3);

    let source = SineDataset::new(8.0, 64.0, 32, 6).unwrap();
    assert_eq!(source.len(), Some(6));
    let mut pipeline = config.into_builder().unwrap().build(source).unwrap();

    assert_eq!(pipeline.stage_names(), vec!["smooth", "window", "Spectrum"]);
    assert_eq!(pipeline.error_policy(), ErrorPolicy::Continue);

    let outputs = pipeline.collect_outputs().unwrap();
    assert_eq!(outputs.len(), 6);

    let emitted: Vec<_> = outputs.iter().filter(|o| !o.is_empty()).collect();
    assert_eq!(emitted.len(), 5);
    for out in emitted {
        assert_eq!(out["raw_ma3_window"].block_size(), 64);
        assert_eq!(out["spectrum"].block_size(), 33);
    }
}

#[test]
fn test_malformed_file_is_config_error() {
    let file = config_file("{\"stages\": [");
    assert!(matches!(
        PipelineConfig::from_file(file.path()),
        Err(PipelineError::Config(_))
    ));
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        PipelineConfig::from_file(dir.path().join("absent.json")),
        Err(PipelineError::Io(_))
    ));
}

#[test]
fn test_unknown_stage_type_rejected() {
    let config = PipelineConfig::from_json(serde_json::json!({
        "stages": [{"type": "Compressor", "config": {}}]
    }))
    .unwrap();
    assert!(matches!(
        config.into_builder(),
        Err(PipelineError::UnknownStage(kind)) if kind == "Compressor"
    ));
}

#[test]
fn test_bad_stage_parameters_rejected() {
    let config = PipelineConfig::from_json(serde_json::json!({
        "stages": [{"type": "WindowBuffer", "config": {"input": "input", "window_size": 0}}]
    }))
    .unwrap();
    assert!(matches!(
        config.into_builder(),
        Err(PipelineError::InvalidConfig(_))
    ));
}

#[test]
fn test_config_duplicate_outputs_opt_in() {
    let stages = serde_json::json!([
        {"type": "Normalizer", "name": "a", "config": {"input": "input", "output": "norm"}},
        {"type": "Normalizer", "name": "b", "config": {"input": "input", "output": "norm"}}
    ]);

    let strict = PipelineConfig::from_json(serde_json::json!({"stages": stages})).unwrap();
    let err = strict
        .into_builder()
        .unwrap()
        .build(SineDataset::new(1.0, 8.0, 8, 1).unwrap());
    assert!(matches!(err, Err(PipelineError::DuplicateOutput { .. })));

    let relaxed = PipelineConfig::from_json(serde_json::json!({
        "allow_duplicate_outputs": true,
        "stages": stages
    }))
    .unwrap();
    assert!(relaxed
        .into_builder()
        .unwrap()
        .build(SineDataset::new(1.0, 8.0, 8, 1).unwrap())
        .is_ok());
}
