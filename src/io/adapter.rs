use chrono::{DateTime, Utc};
use log::warn;
use ndarray::Array2;

use crate::core::{Block, Metadata};
use crate::error::BlockError;

use super::Dataset;

/// Raw pieces of a block, for sources that do not build blocks themselves.
#[derive(Debug, Clone)]
pub struct BlockParts {
    pub values: Array2<f64>,
    pub sample_rate: f64,
    pub timestamp: DateTime<Utc>,
    pub metadata: Metadata,
}

/// Sample types [`default_collate`] knows how to turn into a [`Block`].
pub trait Collate {
    fn collate(self) -> Result<Block, BlockError>;
}

impl Collate for Block {
    fn collate(self) -> Result<Block, BlockError> {
        Ok(self)
    }
}

impl Collate for BlockParts {
    fn collate(self) -> Result<Block, BlockError> {
        Ok(Block::new(self.values, self.sample_rate, self.timestamp)?.with_metadata(self.metadata))
    }
}

/// Blocks pass through; [`BlockParts`] are validated and assembled.
pub fn default_collate<T: Collate>(sample: T) -> Result<Block, BlockError> {
    sample.collate()
}

/// Adapts an arbitrary sample source into a block stream.
///
/// `source` is called once per run, so a closure that rebuilds its iterator
/// makes the dataset restartable. The first sample that fails to collate is
/// logged and ends the stream.
pub struct AdapterDataset<F, C> {
    source: F,
    collate: C,
}

impl<F, C> AdapterDataset<F, C> {
    pub fn new(source: F, collate: C) -> Self {
        Self { source, collate }
    }
}

impl<F, I, T> AdapterDataset<F, fn(T) -> Result<Block, BlockError>>
where
    F: Fn() -> I,
    I: IntoIterator<Item = T>,
    T: Collate,
{
    /// Adapter using [`default_collate`].
    pub fn with_default_collate(source: F) -> Self {
        Self::new(source, default_collate::<T>)
    }
}

impl<F, I, C> Dataset for AdapterDataset<F, C>
where
    F: Fn() -> I + Send,
    I: IntoIterator,
    I::IntoIter: 'static,
    C: Fn(I::Item) -> Result<Block, BlockError> + Send,
{
    fn blocks(&self) -> Box<dyn Iterator<Item = Block> + '_> {
        let collate = &self.collate;
        Box::new(
            (self.source)()
                .into_iter()
                .enumerate()
                .map_while(move |(index, sample)| match collate(sample) {
                    Ok(block) => Some(block),
                    Err(err) => {
                        warn!("adapter source stopped at sample {}: {}", index, err);
                        None
                    }
                }),
        )
    }
}
