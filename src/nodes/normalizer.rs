use anyhow::Result;
use serde::Deserialize;
use serde_json::Value;

use crate::core::stage::{require_input, single_output};
use crate::core::{Stage, StageInputs, StageOutputs};
use crate::error::PipelineError;

/// Scales a block so its peak absolute value is 1.
#[derive(Debug, Clone)]
pub struct Normalizer {
    name: String,
    requires: Vec<String>,
    produces: Vec<String>,
    eps: f64,
}

fn default_eps() -> f64 {
    1e-9
}

#[derive(Debug, Deserialize)]
struct NormalizerConfig {
    input: String,
    output: Option<String>,
    #[serde(default = "default_eps")]
    eps: f64,
}

impl Normalizer {
    /// `output` defaults to `"<input>_norm"`.
    pub fn new(input: &str, output: Option<&str>) -> Self {
        let output = output.map_or_else(|| format!("{input}_norm"), str::to_string);
        Self {
            name: "Normalizer".to_string(),
            requires: vec![input.to_string()],
            produces: vec![output],
            eps: default_eps(),
        }
    }

    pub fn from_config(config: &Value) -> Result<Self, PipelineError> {
        let cfg: NormalizerConfig = serde_json::from_value(config.clone())?;
        Ok(Self::new(&cfg.input, cfg.output.as_deref()).with_eps(cfg.eps))
    }

    /// Peaks below `eps` leave the block untouched.
    pub fn with_eps(mut self, eps: f64) -> Self {
        self.eps = eps;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Stage for Normalizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires(&self) -> &[String] {
        &self.requires
    }

    fn produces(&self) -> &[String] {
        &self.produces
    }

    fn process(&mut self, inputs: &StageInputs) -> Result<StageOutputs> {
        let block = require_input(&self.name, inputs, &self.requires[0])?;
        let peak = block.values().iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        if peak < self.eps {
            return Ok(single_output(&self.produces[0], block.clone()));
        }

        let scaled = block.values() / peak;
        let mut metadata = block.metadata().clone();
        metadata.insert("scale".to_string(), (1.0 / peak).into());
        Ok(single_output(
            &self.produces[0],
            block.copy_with(Some(scaled), Some(metadata))?,
        ))
    }
}
