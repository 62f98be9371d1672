use anyhow::Result;
use ndarray::{Array2, Axis};
use serde::Deserialize;
use serde_json::Value;

use crate::core::stage::{require_input, single_output};
use crate::core::{Stage, StageInputs, StageOutputs};
use crate::error::PipelineError;

/// Box-filter smoothing applied independently to every channel.
///
/// The valid part of the convolution is kept and the first `window - 1`
/// rows repeat the first valid row, so the output has as many rows as the
/// input. Blocks shorter than the window pass through unchanged.
#[derive(Debug, Clone)]
pub struct MovingAverage {
    name: String,
    requires: Vec<String>,
    produces: Vec<String>,
    window: usize,
}

fn default_window() -> usize {
    5
}

#[derive(Debug, Deserialize)]
struct MovingAverageConfig {
    input: String,
    output: Option<String>,
    #[serde(default = "default_window")]
    window: usize,
}

impl MovingAverage {
    /// `output` defaults to `"<input>_ma<window>"`.
    pub fn new(input: &str, output: Option<&str>, window: usize) -> Result<Self, PipelineError> {
        if window == 0 {
            return Err(PipelineError::InvalidConfig(
                "window must be positive".to_string(),
            ));
        }
        let output = output.map_or_else(|| format!("{input}_ma{window}"), str::to_string);
        Ok(Self {
            name: "MovingAverage".to_string(),
            requires: vec![input.to_string()],
            produces: vec![output],
            window,
        })
    }

    pub fn from_config(config: &Value) -> Result<Self, PipelineError> {
        let cfg: MovingAverageConfig = serde_json::from_value(config.clone())?;
        Self::new(&cfg.input, cfg.output.as_deref(), cfg.window)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn smooth(&self, values: &Array2<f64>) -> Array2<f64> {
        let (rows, cols) = values.dim();
        let pad = self.window - 1;
        let mut smoothed = Array2::zeros((rows, cols));

        for (i, window) in values.windows((self.window, cols)).into_iter().enumerate() {
            let mean = window.sum_axis(Axis(0)) / self.window as f64;
            smoothed.row_mut(pad + i).assign(&mean);
        }

        let first_valid = smoothed.row(pad).to_owned();
        for i in 0..pad {
            smoothed.row_mut(i).assign(&first_valid);
        }
        smoothed
    }
}

impl Stage for MovingAverage {
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
        if block.block_size() < self.window {
            return Ok(single_output(&self.produces[0], block.clone()));
        }

        let smoothed = self.smooth(block.values());
        Ok(single_output(
            &self.produces[0],
            block.copy_with(Some(smoothed), None)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Block;
    use chrono::Utc;

    #[test]
    fn test_edge_padding_repeats_first_valid_row() {
        let mut stage = MovingAverage::new("x", Some("y"), 3).unwrap();
        let block = Block::from_samples(vec![0.0, 3.0, 6.0, 9.0, 12.0], 10.0, Utc::now()).unwrap();
        let mut inputs = StageInputs::new();
        inputs.insert("x".to_string(), block);

        let out = stage.process(&inputs).unwrap();
        let column: Vec<f64> = out["y"].values().column(0).to_vec();
        assert_eq!(column, vec![3.0, 3.0, 3.0, 6.0, 9.0]);
    }

    #[test]
    fn test_short_block_passes_through() {
        let mut stage = MovingAverage::new("x", None, 5).unwrap();
        let block = Block::from_samples(vec![1.0, 2.0], 10.0, Utc::now()).unwrap();
        let mut inputs = StageInputs::new();
        inputs.insert("x".to_string(), block);

        let out = stage.process(&inputs).unwrap();
        assert_eq!(out["x_ma5"].values().column(0).to_vec(), vec![1.0, 2.0]);
    }
}
