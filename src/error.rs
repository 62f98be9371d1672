use thiserror::Error;

/// Failures raised while constructing or slicing a [`Block`](crate::core::Block).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BlockError {
    #[error("sample_rate must be positive and finite, got {0}")]
    InvalidSampleRate(f64),

    #[error("values must contain at least one sample")]
    EmptySamples,

    #[error("values must contain at least one channel")]
    EmptyChannels,

    #[error("row {row} has {found} channels, expected {expected}")]
    RaggedRows {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("slice {start}..{stop} produced an empty block")]
    EmptySlice { start: usize, stop: usize },
}

/// Conditions raised by stages that the executor inspects.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StageError {
    /// The upstream sample rate changed mid-stream. Never covered by
    /// [`ErrorPolicy::Continue`](crate::resilience::ErrorPolicy::Continue).
    #[error("stage '{stage}' latched {expected} Hz but received {actual} Hz")]
    SampleRateDrift {
        stage: String,
        expected: f64,
        actual: f64,
    },

    #[error("stage '{stage}' did not receive input '{key}'")]
    MissingInput { stage: String, key: String },

    #[error("stage '{stage}' requires per-sensor blocks, sensor '{sensor}' not found")]
    MissingSensor { stage: String, sensor: String },

    #[error("stage '{stage}' received invalid input: {reason}")]
    InvalidInput { stage: String, reason: String },
}

impl StageError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SampleRateDrift { .. })
    }
}

/// Build-time and run-time pipeline failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Unresolved dependencies: {missing:?}")]
    UnresolvedDependencies { missing: Vec<String> },

    #[error("output '{name}' is produced by both '{first}' and '{second}'")]
    DuplicateOutput {
        name: String,
        first: String,
        second: String,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown stage type: {0}")]
    UnknownStage(String),

    #[error("Error in stage '{stage}' on block {block_index}: {source}")]
    Execution {
        block_index: usize,
        stage: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to parse pipeline config: {0}")]
    Config(#[from] serde_json::Error),

    #[error("failed to read pipeline config: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Block(#[from] BlockError),
}

impl PipelineError {
    /// Index of the block that failed, for execution errors.
    pub fn block_index(&self) -> Option<usize> {
        match self {
            Self::Execution { block_index, .. } => Some(*block_index),
            _ => None,
        }
    }

    pub fn stage_name(&self) -> Option<&str> {
        match self {
            Self::Execution { stage, .. } => Some(stage),
            _ => None,
        }
    }
}
