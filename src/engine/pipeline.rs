use std::iter::FusedIterator;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, error, info, warn};

use super::resolver::{check_unique_outputs, resolve};
use crate::core::{Block, BlockBuffer, Stage, StageInputs, StageOutputs};
use crate::error::{PipelineError, StageError};
use crate::io::Dataset;
use crate::observability::{BlockSummary, NoopMonitor, PipelineMonitor};
use crate::resilience::ErrorPolicy;

pub const DEFAULT_INPUT_KEY: &str = "input";

/// Collects stages and run options, then resolves them into a [`Pipeline`].
pub struct PipelineBuilder {
    input_key: String,
    output_keys: Option<Vec<String>>,
    stages: Vec<Box<dyn Stage>>,
    monitor: Arc<dyn PipelineMonitor>,
    error_policy: ErrorPolicy,
    allow_duplicate_outputs: bool,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            input_key: DEFAULT_INPUT_KEY.to_string(),
            output_keys: None,
            stages: Vec::new(),
            monitor: Arc::new(NoopMonitor),
            error_policy: ErrorPolicy::Stop,
            allow_duplicate_outputs: false,
        }
    }

    /// Name under which every incoming block is seeded
    pub fn input_key(mut self, key: impl Into<String>) -> Self {
        self.input_key = key.into();
        self
    }

    /// Restrict yielded mappings to these names. An empty list means "all".
    pub fn output_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        self.output_keys = if keys.is_empty() { None } else { Some(keys) };
        self
    }

    pub fn add_stage(self, stage: impl Stage + 'static) -> Self {
        self.add_boxed_stage(Box::new(stage))
    }

    pub fn add_boxed_stage(mut self, stage: Box<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn on_error(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    pub fn monitor(mut self, monitor: impl PipelineMonitor + 'static) -> Self {
        self.monitor = Arc::new(monitor);
        self
    }

    /// Accept several stages producing the same name; the stage running
    /// last within a block wins.
    pub fn allow_duplicate_outputs(mut self, allow: bool) -> Self {
        self.allow_duplicate_outputs = allow;
        self
    }

    pub fn build(self, source: impl Dataset + 'static) -> Result<Pipeline, PipelineError> {
        if !self.allow_duplicate_outputs {
            check_unique_outputs(&self.stages)?;
        }

        let stages = resolve(self.stages, [self.input_key.as_str()])?;
        info!(
            "resolved pipeline order: {:?}",
            stages.iter().map(|s| s.name()).collect::<Vec<_>>()
        );

        Ok(Pipeline {
            stages,
            source: Box::new(source),
            input_key: self.input_key,
            output_keys: self.output_keys,
            monitor: self.monitor,
            error_policy: self.error_policy,
        })
    }
}

/// Stages in resolved order bound to a block source.
///
/// Stage state lives inside the pipeline, so only one [`Run`] can exist at
/// a time (enforced by `run` taking `&mut self`).
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    source: Box<dyn Dataset>,
    input_key: String,
    output_keys: Option<Vec<String>>,
    monitor: Arc<dyn PipelineMonitor>,
    error_policy: ErrorPolicy,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Stage names in execution order
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn input_key(&self) -> &str {
        &self.input_key
    }

    pub fn output_keys(&self) -> Option<&[String]> {
        self.output_keys.as_deref()
    }

    pub fn error_policy(&self) -> ErrorPolicy {
        self.error_policy
    }

    /// Starts a run over the source: resets every stage once, then yields one
    /// mapping per successfully processed block, lazily.
    pub fn run(&mut self) -> Run<'_> {
        for stage in self.stages.iter_mut() {
            stage.reset();
        }

        Run {
            stages: &mut self.stages,
            blocks: self.source.blocks(),
            input_key: &self.input_key,
            output_keys: self.output_keys.as_deref(),
            monitor: &*self.monitor,
            error_policy: self.error_policy,
            buffer: BlockBuffer::new(),
            next_index: 0,
            finished: false,
        }
    }

    /// Drains a whole run, stopping at the first propagated error.
    pub fn collect_outputs(&mut self) -> Result<Vec<StageOutputs>, PipelineError> {
        self.run().collect()
    }
}

/// Lazy, single-pass execution of a [`Pipeline`] over its source.
///
/// Dropping the iterator stops the run; no work happens between calls to
/// `next`. After yielding an error it only returns `None`.
pub struct Run<'a> {
    stages: &'a mut [Box<dyn Stage>],
    blocks: Box<dyn Iterator<Item = Block> + 'a>,
    input_key: &'a str,
    output_keys: Option<&'a [String]>,
    monitor: &'a dyn PipelineMonitor,
    error_policy: ErrorPolicy,
    buffer: BlockBuffer,
    next_index: usize,
    finished: bool,
}

impl Run<'_> {
    /// Number of blocks pulled from the source so far
    pub fn blocks_seen(&self) -> usize {
        self.next_index
    }

    /// Runs every stage against one block. On failure returns the failing
    /// stage's name with its error.
    fn step(&mut self, index: usize, block: Block) -> Result<StageOutputs, (String, anyhow::Error)> {
        self.buffer.clear();
        self.buffer.set(self.input_key, block.clone());
        let mut produced = StageOutputs::new();
        produced.insert(self.input_key.to_string(), block);

        for stage in self.stages.iter_mut() {
            if let Some(missing) = stage
                .requires()
                .iter()
                .find(|key| !self.buffer.contains(key.as_str()))
            {
                debug!(
                    "block {}: skipping stage '{}', input '{}' not available",
                    index,
                    stage.name(),
                    missing
                );
                continue;
            }

            let inputs: StageInputs = stage
                .requires()
                .iter()
                .filter_map(|key| self.buffer.get(key).map(|b| (key.clone(), b.clone())))
                .collect();

            let outputs = stage
                .process(&inputs)
                .map_err(|err| (stage.name().to_string(), err))?;

            for (key, value) in outputs {
                self.buffer.set(key.clone(), value.clone());
                produced.insert(key, value);
            }
        }

        Ok(produced)
    }

    fn project(&self, produced: StageOutputs) -> StageOutputs {
        match self.output_keys {
            None => produced,
            Some(keys) => {
                let mut produced = produced;
                keys.iter()
                    .filter_map(|key| produced.remove_entry(key))
                    .collect()
            }
        }
    }
}

impl Iterator for Run<'_> {
    type Item = Result<StageOutputs, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            let Some(block) = self.blocks.next() else {
                debug!("source exhausted after {} blocks", self.next_index);
                self.finished = true;
                return None;
            };

            let index = self.next_index;
            self.next_index += 1;
            let started = Instant::now();
            self.monitor.on_block_start(index);

            match self.step(index, block) {
                Ok(produced) => {
                    self.monitor.on_block_end(&BlockSummary {
                        block_index: index,
                        duration: started.elapsed(),
                        outputs: Some(produced.clone()),
                    });
                    return Some(Ok(self.project(produced)));
                }
                Err((stage, err)) => {
                    self.monitor.on_error(index, &stage, &err);
                    self.monitor.on_block_end(&BlockSummary {
                        block_index: index,
                        duration: started.elapsed(),
                        outputs: None,
                    });

                    let fatal = err
                        .downcast_ref::<StageError>()
                        .is_some_and(StageError::is_fatal);
                    if self.error_policy == ErrorPolicy::Continue && !fatal {
                        warn!("block {}: dropped after error in stage '{}': {:#}", index, stage, err);
                        continue;
                    }

                    error!("block {}: aborting run, stage '{}' failed: {:#}", index, stage, err);
                    self.finished = true;
                    return Some(Err(PipelineError::Execution {
                        block_index: index,
                        stage,
                        source: err,
                    }));
                }
            }
        }
    }
}

impl FusedIterator for Run<'_> {}
