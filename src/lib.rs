//! Block-streaming execution core for multi-channel time-series pipelines.
//!
//! Stages declare the named blocks they consume and produce. A
//! [`PipelineBuilder`](engine::PipelineBuilder) resolves them into a fixed
//! order once, and every [`Run`](engine::Run) replays that order against a
//! fresh per-block scratch buffer, pulling blocks lazily from a
//! [`Dataset`](io::Dataset).

pub mod core;
pub mod engine;
pub mod error;
pub mod io;
pub mod nodes;
pub mod observability;
pub mod resilience;

pub use crate::core::{Block, Metadata, Stage, StageInputs, StageOutputs};
pub use crate::engine::{Pipeline, PipelineBuilder, PipelineConfig};
pub use crate::error::{BlockError, PipelineError, StageError};
pub use crate::resilience::ErrorPolicy;
