use std::fmt;

use anyhow::Result;
use ndarray::Array2;
use rustfft::{num_complex::Complex, FftPlanner};
use serde::Deserialize;
use serde_json::Value;

use crate::core::stage::{require_input, single_output};
use crate::core::{Block, Stage, StageInputs, StageOutputs};
use crate::error::PipelineError;

/// One-sided FFT magnitude per channel.
///
/// Output rows are frequency bins `0..=n/2`; their centre frequencies are
/// stored under `"frequencies_hz"`. FFT plans are cached per block length
/// for the lifetime of the stage.
pub struct Spectrum {
    name: String,
    requires: Vec<String>,
    produces: Vec<String>,
    planner: FftPlanner<f64>,
}

impl fmt::Debug for Spectrum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spectrum")
            .field("name", &self.name)
            .field("requires", &self.requires)
            .field("produces", &self.produces)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct SpectrumConfig {
    input: String,
    output: Option<String>,
}

impl Spectrum {
    /// `output` defaults to `"<input>_fft"`.
    pub fn new(input: &str, output: Option<&str>) -> Self {
        let output = output.map_or_else(|| format!("{input}_fft"), str::to_string);
        Self {
            name: "Spectrum".to_string(),
            requires: vec![input.to_string()],
            produces: vec![output],
            planner: FftPlanner::new(),
        }
    }

    pub fn from_config(config: &Value) -> Result<Self, PipelineError> {
        let cfg: SpectrumConfig = serde_json::from_value(config.clone())?;
        Ok(Self::new(&cfg.input, cfg.output.as_deref()))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

fn magnitude(planner: &mut FftPlanner<f64>, values: &Array2<f64>) -> Array2<f64> {
    let (n, channels) = values.dim();
    let bins = n / 2 + 1;
    let fft = planner.plan_fft_forward(n);

    let mut out = Array2::zeros((bins, channels));
    for (ch, column) in values.columns().into_iter().enumerate() {
        let mut buffer: Vec<Complex<f64>> =
            column.iter().map(|&v| Complex::new(v, 0.0)).collect();
        fft.process(&mut buffer);
        for (bin, value) in buffer.iter().take(bins).enumerate() {
            out[[bin, ch]] = value.norm();
        }
    }
    out
}

impl Stage for Spectrum {
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
        let n = block.block_size();
        let frequencies: Vec<f64> = (0..=n / 2)
            .map(|k| k as f64 * block.sample_rate() / n as f64)
            .collect();

        let mut metadata = block.metadata().clone();
        metadata.insert("frequencies_hz".to_string(), frequencies.into());
        metadata.insert("fft_magnitude".to_string(), true.into());

        let values = magnitude(&mut self.planner, block.values());
        let spectrum =
            Block::new(values, block.sample_rate(), block.timestamp())?.with_metadata(metadata);
        Ok(single_output(&self.produces[0], spectrum))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_dc_signal_lands_in_bin_zero() {
        let mut stage = Spectrum::new("x", None);
        let block = Block::from_samples(vec![1.0; 8], 8.0, Utc::now()).unwrap();
        let mut inputs = StageInputs::new();
        inputs.insert("x".to_string(), block);

        let out = stage.process(&inputs).unwrap();
        let spectrum = &out["x_fft"];
        assert_eq!(spectrum.block_size(), 5);
        assert!((spectrum.values()[[0, 0]] - 8.0).abs() < 1e-9);
        assert!(spectrum.values()[[1, 0]].abs() < 1e-9);
        assert_eq!(spectrum.metadata()["frequencies_hz"][4], 4.0);
    }

    #[test]
    fn test_reused_stage_handles_changing_lengths() {
        let mut stage = Spectrum::new("x", Some("f"));
        for len in [8, 16, 8] {
            let block = Block::from_samples(vec![2.0; len], 8.0, Utc::now()).unwrap();
            let mut inputs = StageInputs::new();
            inputs.insert("x".to_string(), block);

            let out = stage.process(&inputs).unwrap();
            assert_eq!(out["f"].block_size(), len / 2 + 1);
            assert!((out["f"].values()[[0, 0]] - 2.0 * len as f64).abs() < 1e-9);
        }
    }
}
