pub mod adapter;
pub mod dataset;
pub mod loader;

pub use adapter::{default_collate, AdapterDataset, BlockParts, Collate};
pub use dataset::{ChannelDataset, Dataset, IterableDataset, MultiSensorDataset, SineDataset};
pub use loader::{StreamDataLoader, WindowedStreamDataLoader};
