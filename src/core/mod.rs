pub mod block;
pub mod buffer;
pub mod stage;

pub use block::{Block, Metadata};
pub use buffer::BlockBuffer;
pub use stage::{Stage, StageInputs, StageOutputs};
