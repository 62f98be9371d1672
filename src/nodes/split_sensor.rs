use anyhow::Result;
use serde::Deserialize;
use serde_json::Value;

use crate::core::stage::require_input;
use crate::core::{Stage, StageInputs, StageOutputs};
use crate::error::{PipelineError, StageError};

/// Fans a multi-sensor block out into one `<sensor>_raw` output per sensor.
#[derive(Debug, Clone)]
pub struct SplitSensor {
    name: String,
    requires: Vec<String>,
    produces: Vec<String>,
    sensors: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SplitSensorConfig {
    input: String,
    sensors: Vec<String>,
}

impl SplitSensor {
    pub fn new<I, S>(input: &str, sensors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let sensors: Vec<String> = sensors.into_iter().map(Into::into).collect();
        Self {
            name: "SplitSensor".to_string(),
            requires: vec![input.to_string()],
            produces: sensors.iter().map(|s| format!("{s}_raw")).collect(),
            sensors,
        }
    }

    pub fn from_config(config: &Value) -> Result<Self, PipelineError> {
        let cfg: SplitSensorConfig = serde_json::from_value(config.clone())?;
        Ok(Self::new(&cfg.input, cfg.sensors))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Stage for SplitSensor {
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
        let sensors = block.sensors().ok_or_else(|| StageError::InvalidInput {
            stage: self.name.clone(),
            reason: "block carries no per-sensor blocks".to_string(),
        })?;

        let mut outputs = StageOutputs::new();
        for (sensor, key) in self.sensors.iter().zip(&self.produces) {
            let sensor_block = sensors.get(sensor).ok_or_else(|| StageError::MissingSensor {
                stage: self.name.clone(),
                sensor: sensor.clone(),
            })?;
            outputs.insert(key.clone(), sensor_block.clone());
        }
        Ok(outputs)
    }
}
