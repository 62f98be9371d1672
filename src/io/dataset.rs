use std::collections::BTreeMap;
use std::f64::consts::PI;

use chrono::{DateTime, Utc};
use crossbeam_channel::Receiver;
use ndarray::Array2;

use crate::core::block::offset_timestamp;
use crate::core::{Block, Metadata};
use crate::error::BlockError;

/// Source of blocks in delivery order.
///
/// Implementations may be restartable (each call to `blocks` starts over)
/// or single-shot; the executor treats exhaustion as the end of a run.
pub trait Dataset: Send {
    fn blocks(&self) -> Box<dyn Iterator<Item = Block> + '_>;

    /// Number of blocks, when known up front
    fn len(&self) -> Option<usize> {
        None
    }
}

/// Restartable dataset over an owned list of blocks
#[derive(Debug, Clone, Default)]
pub struct IterableDataset {
    blocks: Vec<Block>,
}

impl IterableDataset {
    pub fn new(blocks: impl IntoIterator<Item = Block>) -> Self {
        Self {
            blocks: blocks.into_iter().collect(),
        }
    }
}

impl Dataset for IterableDataset {
    fn blocks(&self) -> Box<dyn Iterator<Item = Block> + '_> {
        Box::new(self.blocks.iter().cloned())
    }

    fn len(&self) -> Option<usize> {
        Some(self.blocks.len())
    }
}

impl From<Vec<Block>> for IterableDataset {
    fn from(blocks: Vec<Block>) -> Self {
        Self { blocks }
    }
}

/// Zips several named streams in lock-step.
///
/// Each yielded block carries the values, rate and timestamp of the first
/// stream in insertion order and holds every stream's block in its sensor
/// map. Streams are pulled lazily, so live or unbounded sources can be
/// combined; iteration stops as soon as any stream is exhausted.
#[derive(Default)]
pub struct MultiSensorDataset {
    streams: Vec<(String, Box<dyn Dataset>)>,
}

impl MultiSensorDataset {
    pub fn new(streams: Vec<(String, Box<dyn Dataset>)>) -> Self {
        Self { streams }
    }

    /// Appends a stream; the first one added is the primary stream.
    pub fn with_stream(mut self, name: impl Into<String>, dataset: impl Dataset + 'static) -> Self {
        self.streams.push((name.into(), Box::new(dataset)));
        self
    }

    pub fn sensor_names(&self) -> impl Iterator<Item = &str> {
        self.streams.iter().map(|(name, _)| name.as_str())
    }
}

impl Dataset for MultiSensorDataset {
    fn blocks(&self) -> Box<dyn Iterator<Item = Block> + '_> {
        if self.streams.is_empty() {
            return Box::new(std::iter::empty());
        }

        let mut iters: Vec<(&str, Box<dyn Iterator<Item = Block> + '_>)> = self
            .streams
            .iter()
            .map(|(name, dataset)| (name.as_str(), dataset.blocks()))
            .collect();

        Box::new(std::iter::from_fn(move || {
            let mut primary = None;
            let mut sample = BTreeMap::new();
            for (name, iter) in iters.iter_mut() {
                let block = iter.next()?;
                if primary.is_none() {
                    primary = Some(block.clone());
                }
                sample.insert(name.to_string(), block);
            }
            Some(primary?.with_metadata(Metadata::new()).with_sensors(sample))
        }))
    }

    /// Shortest stream length, or `None` if any stream is unbounded.
    fn len(&self) -> Option<usize> {
        if self.streams.is_empty() {
            return Some(0);
        }
        let lens: Option<Vec<usize>> = self.streams.iter().map(|(_, d)| d.len()).collect();
        lens?.into_iter().min()
    }
}

/// Live single-shot source fed from another thread.
///
/// Blocks until the next block arrives; ends once every sender is dropped.
pub struct ChannelDataset {
    rx: Receiver<Block>,
}

impl ChannelDataset {
    pub fn new(rx: Receiver<Block>) -> Self {
        Self { rx }
    }
}

impl Dataset for ChannelDataset {
    fn blocks(&self) -> Box<dyn Iterator<Item = Block> + '_> {
        Box::new(self.rx.iter())
    }
}

/// Synthetic single-channel sine source, continuous in phase across blocks
#[derive(Debug, Clone)]
pub struct SineDataset {
    frequency: f64,
    sample_rate: f64,
    block_size: usize,
    num_blocks: usize,
    amplitude: f64,
    start: DateTime<Utc>,
}

impl SineDataset {
    pub fn new(
        frequency: f64,
        sample_rate: f64,
        block_size: usize,
        num_blocks: usize,
    ) -> Result<Self, BlockError> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(BlockError::InvalidSampleRate(sample_rate));
        }
        if block_size == 0 {
            return Err(BlockError::EmptySamples);
        }
        Ok(Self {
            frequency,
            sample_rate,
            block_size,
            num_blocks,
            amplitude: 1.0,
            start: Utc::now(),
        })
    }

    pub fn with_amplitude(mut self, amplitude: f64) -> Self {
        self.amplitude = amplitude;
        self
    }

    pub fn with_start(mut self, start: DateTime<Utc>) -> Self {
        self.start = start;
        self
    }

    fn block_at(&self, index: usize) -> Result<Block, BlockError> {
        let phase_increment = 2.0 * PI * self.frequency / self.sample_rate;
        let first_sample = index * self.block_size;
        let values = Array2::from_shape_fn((self.block_size, 1), |(i, _)| {
            self.amplitude * ((first_sample + i) as f64 * phase_increment).sin()
        });

        let mut metadata = Metadata::new();
        metadata.insert("block_index".to_string(), index.into());

        let timestamp = offset_timestamp(self.start, first_sample, self.sample_rate);
        Ok(Block::new(values, self.sample_rate, timestamp)?.with_metadata(metadata))
    }
}

impl Dataset for SineDataset {
    fn blocks(&self) -> Box<dyn Iterator<Item = Block> + '_> {
        Box::new((0..self.num_blocks).filter_map(move |idx| self.block_at(idx).ok()))
    }

    fn len(&self) -> Option<usize> {
        Some(self.num_blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn block(rate: f64, value: f64) -> Block {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Block::from_samples(vec![value; 4], rate, ts).unwrap()
    }

    #[test]
    fn test_iterable_dataset_restarts() {
        let dataset = IterableDataset::new(vec![block(10.0, 1.0), block(10.0, 2.0)]);
        assert_eq!(dataset.blocks().count(), 2);
        assert_eq!(dataset.blocks().count(), 2);
        assert_eq!(dataset.len(), Some(2));
    }

    #[test]
    fn test_multi_sensor_stops_at_shortest() {
        let dataset = MultiSensorDataset::default()
            .with_stream("a", IterableDataset::new(vec![block(10.0, 1.0), block(10.0, 2.0)]))
            .with_stream("b", IterableDataset::new(vec![block(20.0, 3.0)]));

        assert_eq!(dataset.len(), Some(1));
        let blocks: Vec<Block> = dataset.blocks().collect();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].sample_rate(), 10.0);
        assert_eq!(blocks[0].sensor("b").unwrap().values()[[0, 0]], 3.0);
    }

    #[test]
    fn test_multi_sensor_primary_follows_insertion_order() {
        let dataset = MultiSensorDataset::default()
            .with_stream("z_main", IterableDataset::new(vec![block(100.0, 1.0)]))
            .with_stream("a_aux", IterableDataset::new(vec![block(10.0, 9.0)]));

        assert_eq!(dataset.sensor_names().collect::<Vec<_>>(), vec!["z_main", "a_aux"]);
        let zipped = dataset.blocks().next().unwrap();
        assert_eq!(zipped.sample_rate(), 100.0);
        assert_eq!(zipped.values()[[0, 0]], 1.0);
        assert!(zipped.metadata().is_empty());
        assert_eq!(zipped.sensor("a_aux").unwrap().values()[[0, 0]], 9.0);
    }

    #[test]
    fn test_multi_sensor_zips_live_channels() {
        let (tx_a, rx_a) = crossbeam_channel::unbounded();
        let (tx_b, rx_b) = crossbeam_channel::unbounded();
        for i in 0..3 {
            tx_a.send(block(10.0, i as f64)).unwrap();
            tx_b.send(block(20.0, 10.0 + i as f64)).unwrap();
        }
        tx_b.send(block(20.0, 13.0)).unwrap();
        drop(tx_a);
        drop(tx_b);

        let dataset = MultiSensorDataset::default()
            .with_stream("a", ChannelDataset::new(rx_a))
            .with_stream("b", ChannelDataset::new(rx_b));
        assert_eq!(dataset.len(), None);

        let pairs: Vec<(f64, f64)> = dataset
            .blocks()
            .map(|b| {
                (
                    b.sensor("a").unwrap().values()[[0, 0]],
                    b.sensor("b").unwrap().values()[[0, 0]],
                )
            })
            .collect();
        assert_eq!(pairs, vec![(0.0, 10.0), (1.0, 11.0), (2.0, 12.0)]);
    }

    #[test]
    fn test_empty_multi_sensor_yields_nothing() {
        let dataset = MultiSensorDataset::default();
        assert_eq!(dataset.len(), Some(0));
        assert_eq!(dataset.blocks().count(), 0);
    }

    #[test]
    fn test_channel_dataset_ends_when_senders_drop() {
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(block(10.0, 1.0)).unwrap();
        tx.send(block(10.0, 2.0)).unwrap();
        drop(tx);

        let dataset = ChannelDataset::new(rx);
        assert_eq!(dataset.blocks().count(), 2);
        assert_eq!(dataset.blocks().count(), 0);
    }

    #[test]
    fn test_sine_blocks_are_contiguous() {
        let dataset = SineDataset::new(1.0, 4.0, 4, 2).unwrap();
        let blocks: Vec<Block> = dataset.blocks().collect();

        assert_eq!(blocks.len(), 2);
        assert!((blocks[0].values()[[1, 0]] - 1.0).abs() < 1e-12);
        assert_eq!(
            blocks[1].timestamp() - blocks[0].timestamp(),
            chrono::Duration::seconds(1)
        );
    }
}
