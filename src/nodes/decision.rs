use anyhow::Result;
use ndarray::array;
use serde::Deserialize;
use serde_json::Value;

use crate::core::stage::{require_input, single_output};
use crate::core::{Metadata, Stage, StageInputs, StageOutputs};
use crate::error::PipelineError;

/// Averages the mean of every input into a single 1x1 score block.
#[derive(Debug, Clone)]
pub struct Decision {
    name: String,
    requires: Vec<String>,
    produces: Vec<String>,
}

fn default_output() -> String {
    "decision".to_string()
}

#[derive(Debug, Deserialize)]
struct DecisionConfig {
    requires: Vec<String>,
    #[serde(default = "default_output")]
    output: String,
}

impl Decision {
    pub fn new<I, S>(requires: I, output: &str) -> Result<Self, PipelineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let requires: Vec<String> = requires.into_iter().map(Into::into).collect();
        if requires.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "Decision needs at least one input".to_string(),
            ));
        }
        Ok(Self {
            name: "Decision".to_string(),
            requires,
            produces: vec![output.to_string()],
        })
    }

    pub fn from_config(config: &Value) -> Result<Self, PipelineError> {
        let cfg: DecisionConfig = serde_json::from_value(config.clone())?;
        Self::new(cfg.requires, &cfg.output)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Stage for Decision {
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
        let mut total = 0.0;
        for key in &self.requires {
            let block = require_input(&self.name, inputs, key)?;
            total += block.values().mean().unwrap_or(0.0);
        }
        let score = total / self.requires.len() as f64;

        let first = require_input(&self.name, inputs, &self.requires[0])?;
        let mut metadata = Metadata::new();
        metadata.insert("decision_score".to_string(), score.into());

        let decision = first.copy_with(Some(array![[score]]), Some(metadata))?;
        Ok(single_output(&self.produces[0], decision))
    }
}
