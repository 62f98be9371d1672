use anyhow::Result;
use chrono::{DateTime, Utc};
use ndarray::{concatenate, s, Array2, Axis};
use serde::Deserialize;
use serde_json::Value;

use crate::core::block::offset_timestamp;
use crate::core::stage::{require_input, single_output};
use crate::core::{Block, Metadata, Stage, StageInputs, StageOutputs};
use crate::error::{PipelineError, StageError};

/// Window and hop lengths, either fixed in samples or derived from the
/// first observed sample rate.
#[derive(Debug, Clone, Copy, PartialEq)]
enum WindowLength {
    Samples { window: usize, hop: usize },
    Seconds { window: f64, hop: f64 },
}

impl WindowLength {
    fn in_samples(&self, sample_rate: f64) -> (usize, usize) {
        match *self {
            Self::Samples { window, hop } => (window, hop),
            Self::Seconds { window, hop } => (
                seconds_to_samples(window, sample_rate),
                seconds_to_samples(hop, sample_rate),
            ),
        }
    }
}

fn seconds_to_samples(seconds: f64, sample_rate: f64) -> usize {
    ((seconds * sample_rate).round() as usize).max(1)
}

/// Relative tolerance 1e-5 plus absolute 1e-8.
fn rates_match(latched: f64, observed: f64) -> bool {
    (latched - observed).abs() <= 1e-8 + 1e-5 * observed.abs()
}

/// Values fixed by the first block of an accumulation epoch
#[derive(Debug, Clone)]
struct Latched {
    sample_rate: f64,
    window_samples: usize,
    hop_samples: usize,
    initial_timestamp: DateTime<Utc>,
    base_metadata: Metadata,
}

/// A completed window, ready to be wrapped in a block
struct Emitted {
    values: Array2<f64>,
    offset_samples: usize,
}

/// Cross-block sample accumulator shared by the windowing stages.
///
/// Empty until the first push latches the sample rate and sizes. Each push
/// appends rows; once at least `window_samples` rows are buffered, the first
/// window is emitted and the buffer advances by one hop. At most one window
/// is emitted per push. When the hop is longer than the buffered rows, the
/// remainder of the hop is skipped from the next incoming samples so window
/// `i` always starts at absolute sample `i * hop_samples`.
///
/// A sample-rate drift poisons the accumulator: every later push returns
/// the same error until `reset`.
#[derive(Debug, Default)]
struct WindowAccumulator {
    latched: Option<Latched>,
    failed: Option<StageError>,
    buffer: Option<Array2<f64>>,
    offset_samples: usize,
    pending_skip: usize,
}

impl WindowAccumulator {
    fn reset(&mut self) {
        *self = Self::default();
    }

    fn buffered_rows(&self) -> usize {
        self.buffer.as_ref().map_or(0, Array2::nrows)
    }

    fn push(
        &mut self,
        stage: &str,
        block: &Block,
        length: WindowLength,
    ) -> Result<Option<Emitted>, StageError> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }

        let latched = self.latched.get_or_insert_with(|| {
            let (window_samples, hop_samples) = length.in_samples(block.sample_rate());
            Latched {
                sample_rate: block.sample_rate(),
                window_samples,
                hop_samples,
                initial_timestamp: block.timestamp(),
                base_metadata: block.metadata().clone(),
            }
        });
        if !rates_match(latched.sample_rate, block.sample_rate()) {
            let err = StageError::SampleRateDrift {
                stage: stage.to_string(),
                expected: latched.sample_rate,
                actual: block.sample_rate(),
            };
            self.failed = Some(err.clone());
            return Err(err);
        }
        let (window, hop) = (latched.window_samples, latched.hop_samples);

        let mut incoming = block.values().view();
        if self.pending_skip > 0 {
            let skip = self.pending_skip.min(incoming.nrows());
            self.pending_skip -= skip;
            incoming = incoming.slice_move(s![skip.., ..]);
        }

        if incoming.nrows() > 0 {
            let grown = match self.buffer.take() {
                None => incoming.to_owned(),
                Some(buffer) => concatenate(Axis(0), &[buffer.view(), incoming]).map_err(|e| {
                    StageError::InvalidInput {
                        stage: stage.to_string(),
                        reason: format!("cannot append block to window buffer: {e}"),
                    }
                })?,
            };
            self.buffer = Some(grown);
        }

        let rows = self.buffered_rows();
        if rows < window {
            return Ok(None);
        }
        let Some(buffer) = self.buffer.take() else {
            return Ok(None);
        };

        let emitted = Emitted {
            values: buffer.slice(s![..window, ..]).to_owned(),
            offset_samples: self.offset_samples,
        };

        let trim = hop.min(rows);
        self.pending_skip = hop - trim;
        self.offset_samples += hop;
        if trim < rows {
            self.buffer = Some(buffer.slice(s![trim.., ..]).to_owned());
        }

        Ok(Some(emitted))
    }

    /// Wraps an emitted window in a block stamped relative to the first block.
    fn window_block(&self, emitted: Emitted, current: &Block) -> Result<Block> {
        let latched = self
            .latched
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("window emitted before sample rate was latched"))?;

        let mut metadata = latched.base_metadata.clone();
        metadata.extend(current.metadata().clone());
        metadata.insert("window_size".to_string(), latched.window_samples.into());
        metadata.insert("hop_size".to_string(), latched.hop_samples.into());
        metadata.insert("window_offset".to_string(), emitted.offset_samples.into());
        metadata.insert(
            "slice".to_string(),
            serde_json::json!([
                emitted.offset_samples,
                emitted.offset_samples + latched.window_samples,
                1
            ]),
        );

        let timestamp = offset_timestamp(
            latched.initial_timestamp,
            emitted.offset_samples,
            latched.sample_rate,
        );
        Ok(Block::new(emitted.values, latched.sample_rate, timestamp)?.with_metadata(metadata))
    }
}

/// Emits fixed-length windows counted in samples.
#[derive(Debug)]
pub struct WindowBuffer {
    name: String,
    requires: Vec<String>,
    produces: Vec<String>,
    window_size: usize,
    hop_size: usize,
    state: WindowAccumulator,
}

#[derive(Debug, Deserialize)]
struct WindowBufferConfig {
    input: String,
    output: Option<String>,
    window_size: usize,
    hop_size: Option<usize>,
}

impl WindowBuffer {
    /// `output` defaults to `"<input>_window"`, `hop_size` to `window_size`.
    pub fn new(
        input: &str,
        output: Option<&str>,
        window_size: usize,
        hop_size: Option<usize>,
    ) -> Result<Self, PipelineError> {
        if window_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "window_size must be positive".to_string(),
            ));
        }
        if hop_size == Some(0) {
            return Err(PipelineError::InvalidConfig(
                "hop_size must be positive when provided".to_string(),
            ));
        }

        let output = output.map_or_else(|| format!("{input}_window"), str::to_string);
        Ok(Self {
            name: "WindowBuffer".to_string(),
            requires: vec![input.to_string()],
            produces: vec![output],
            window_size,
            hop_size: hop_size.unwrap_or(window_size),
            state: WindowAccumulator::default(),
        })
    }

    pub fn from_config(config: &Value) -> Result<Self, PipelineError> {
        let cfg: WindowBufferConfig = serde_json::from_value(config.clone())?;
        Self::new(&cfg.input, cfg.output.as_deref(), cfg.window_size, cfg.hop_size)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    /// Rows currently waiting for the next window
    pub fn buffered_rows(&self) -> usize {
        self.state.buffered_rows()
    }
}

impl Stage for WindowBuffer {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires(&self) -> &[String] {
        &self.requires
    }

    fn produces(&self) -> &[String] {
        &self.produces
    }

    fn reset(&mut self) {
        self.state.reset();
    }

    fn process(&mut self, inputs: &StageInputs) -> Result<StageOutputs> {
        let block = require_input(&self.name, inputs, &self.requires[0])?;
        let length = WindowLength::Samples {
            window: self.window_size,
            hop: self.hop_size,
        };

        match self.state.push(&self.name, block, length)? {
            None => Ok(StageOutputs::new()),
            Some(emitted) => {
                let window = self.state.window_block(emitted, block)?;
                Ok(single_output(&self.produces[0], window))
            }
        }
    }
}

/// Emits windows whose length and hop are given in seconds.
///
/// Sizes are converted to samples with the sample rate of the first block
/// after a reset (rounded, at least one sample).
#[derive(Debug)]
pub struct SlidingWindow {
    name: String,
    requires: Vec<String>,
    produces: Vec<String>,
    window_seconds: f64,
    hop_seconds: f64,
    state: WindowAccumulator,
}

#[derive(Debug, Deserialize)]
struct SlidingWindowConfig {
    input: String,
    output: String,
    window_seconds: f64,
    hop_seconds: f64,
}

impl SlidingWindow {
    pub fn new(
        input: &str,
        output: &str,
        window_seconds: f64,
        hop_seconds: f64,
    ) -> Result<Self, PipelineError> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(window_seconds) || !positive(hop_seconds) {
            return Err(PipelineError::InvalidConfig(
                "window_seconds and hop_seconds must be positive".to_string(),
            ));
        }

        Ok(Self {
            name: "SlidingWindow".to_string(),
            requires: vec![input.to_string()],
            produces: vec![output.to_string()],
            window_seconds,
            hop_seconds,
            state: WindowAccumulator::default(),
        })
    }

    pub fn from_config(config: &Value) -> Result<Self, PipelineError> {
        let cfg: SlidingWindowConfig = serde_json::from_value(config.clone())?;
        Self::new(&cfg.input, &cfg.output, cfg.window_seconds, cfg.hop_seconds)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Window and hop in samples, once a block has been seen.
    pub fn latched_sizes(&self) -> Option<(usize, usize)> {
        self.state
            .latched
            .as_ref()
            .map(|latched| (latched.window_samples, latched.hop_samples))
    }

    pub fn buffered_rows(&self) -> usize {
        self.state.buffered_rows()
    }
}

impl Stage for SlidingWindow {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires(&self) -> &[String] {
        &self.requires
    }

    fn produces(&self) -> &[String] {
        &self.produces
    }

    fn reset(&mut self) {
        self.state.reset();
    }

    fn process(&mut self, inputs: &StageInputs) -> Result<StageOutputs> {
        let block = require_input(&self.name, inputs, &self.requires[0])?;
        let length = WindowLength::Seconds {
            window: self.window_seconds,
            hop: self.hop_seconds,
        };

        let Some(emitted) = self.state.push(&self.name, block, length)? else {
            return Ok(StageOutputs::new());
        };

        let window = self.state.window_block(emitted, block)?;
        let mut metadata = window.metadata().clone();
        metadata.insert("window_seconds".to_string(), self.window_seconds.into());
        metadata.insert("hop_seconds".to_string(), self.hop_seconds.into());
        Ok(single_output(
            &self.produces[0],
            window.with_metadata(metadata),
        ))
    }
}
