use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::pipeline::{PipelineBuilder, DEFAULT_INPUT_KEY};
use crate::core::Stage;
use crate::error::PipelineError;
use crate::nodes::{Decision, MovingAverage, Normalizer, SlidingWindow, Spectrum, SplitSensor, WindowBuffer};
use crate::resilience::ErrorPolicy;

fn default_input_key() -> String {
    DEFAULT_INPUT_KEY.to_string()
}

/// One stage entry: `{"type": "MovingAverage", "name": "smooth", "config": {...}}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub config: Value,
}

/// Declarative pipeline description, usually loaded from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_input_key")]
    pub input_key: String,
    #[serde(default)]
    pub output_keys: Option<Vec<String>>,
    #[serde(default)]
    pub on_error: ErrorPolicy,
    #[serde(default)]
    pub allow_duplicate_outputs: bool,
    #[serde(default)]
    pub stages: Vec<StageConfig>,
}

impl PipelineConfig {
    pub fn from_json(config: Value) -> Result<Self, PipelineError> {
        Ok(serde_json::from_value(config)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Instantiates every stage and returns a builder ready for a source and
    /// an optional monitor.
    pub fn into_builder(self) -> Result<PipelineBuilder, PipelineError> {
        let mut builder = PipelineBuilder::new()
            .input_key(self.input_key)
            .on_error(self.on_error)
            .allow_duplicate_outputs(self.allow_duplicate_outputs);

        if let Some(keys) = self.output_keys {
            builder = builder.output_keys(keys);
        }

        for stage in &self.stages {
            builder = builder.add_boxed_stage(create_stage(stage)?);
        }
        Ok(builder)
    }
}

/// Maps a stage entry's `type` to a concrete stage.
pub fn create_stage(stage: &StageConfig) -> Result<Box<dyn Stage>, PipelineError> {
    let cfg = &stage.config;

    macro_rules! build {
        ($ty:ty) => {{
            let node = <$ty>::from_config(cfg)?;
            let node = match stage.name.clone() {
                Some(name) => node.with_name(name),
                None => node,
            };
            Box::new(node) as Box<dyn Stage>
        }};
    }

    let boxed = match stage.kind.as_str() {
        "MovingAverage" => build!(MovingAverage),
        "Normalizer" => build!(Normalizer),
        "Spectrum" => build!(Spectrum),
        "WindowBuffer" => build!(WindowBuffer),
        "SlidingWindow" => build!(SlidingWindow),
        "SplitSensor" => build!(SplitSensor),
        "Decision" => build!(Decision),
        other => return Err(PipelineError::UnknownStage(other.to_string())),
    };

    Ok(boxed)
}
