use serde::{Deserialize, Serialize};

/// What the executor does when a stage fails on a block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Propagate the wrapped error and end the run
    #[default]
    Stop,

    /// Drop the failing block's outputs and move on to the next block
    Continue,
}

impl ErrorPolicy {
    pub fn name(&self) -> &str {
        match self {
            Self::Stop => "stop",
            Self::Continue => "continue",
        }
    }
}
