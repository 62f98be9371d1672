use std::collections::BTreeMap;

use anyhow::Result;

use super::Block;
use crate::error::StageError;

/// Blocks handed to a stage, keyed by the names it requires.
pub type StageInputs = BTreeMap<String, Block>;

/// Blocks produced by a stage (or a whole pipeline step), keyed by name.
pub type StageOutputs = BTreeMap<String, Block>;

/// Base trait for all processing stages in the pipeline
pub trait Stage: Send {
    /// Display name used in logs, monitor callbacks and errors
    fn name(&self) -> &str;

    /// Names that must be present in the scratch buffer before `process` runs
    fn requires(&self) -> &[String];

    /// Names this stage may write
    fn produces(&self) -> &[String];

    /// Drop any state accumulated across blocks. Called once per run, before
    /// the first block.
    fn reset(&mut self) {}

    /// Transform one block's worth of inputs.
    ///
    /// Returning an empty map means "nothing this time"; stages depending on
    /// this stage's outputs are then skipped for the current block.
    fn process(&mut self, inputs: &StageInputs) -> Result<StageOutputs>;
}

/// Looks up a required input, raising a typed error when it is missing.
pub fn require_input<'a>(stage: &str, inputs: &'a StageInputs, key: &str) -> Result<&'a Block> {
    inputs.get(key).ok_or_else(|| {
        StageError::MissingInput {
            stage: stage.to_string(),
            key: key.to_string(),
        }
        .into()
    })
}

/// Single-entry output map.
pub fn single_output(key: &str, block: Block) -> StageOutputs {
    let mut outputs = StageOutputs::new();
    outputs.insert(key.to_string(), block);
    outputs
}
