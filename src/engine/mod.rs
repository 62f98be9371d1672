pub mod config;
pub mod pipeline;
pub mod resolver;

pub use config::{create_stage, PipelineConfig, StageConfig};
pub use pipeline::{Pipeline, PipelineBuilder, Run, DEFAULT_INPUT_KEY};
pub use resolver::{check_unique_outputs, resolve, resolve_order};
