use crate::core::Block;
use crate::error::PipelineError;

use super::Dataset;

/// Wraps a dataset with truncation and fixed-size re-slicing.
pub struct StreamDataLoader {
    dataset: Box<dyn Dataset>,
    max_blocks: Option<usize>,
    slice_size: Option<usize>,
    drop_last: bool,
}

impl StreamDataLoader {
    pub fn new(dataset: impl Dataset + 'static) -> Self {
        Self {
            dataset: Box::new(dataset),
            max_blocks: None,
            slice_size: None,
            drop_last: false,
        }
    }

    /// Stop after `max_blocks` emitted blocks (slices count individually).
    pub fn max_blocks(mut self, max_blocks: usize) -> Self {
        self.max_blocks = Some(max_blocks);
        self
    }

    /// Cut every source block into consecutive chunks of `slice_size` rows.
    pub fn slice_size(mut self, slice_size: usize) -> Result<Self, PipelineError> {
        if slice_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "slice_size must be positive".to_string(),
            ));
        }
        self.slice_size = Some(slice_size);
        Ok(self)
    }

    /// Drop a trailing chunk shorter than `slice_size`.
    pub fn drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }
}

impl Dataset for StreamDataLoader {
    fn blocks(&self) -> Box<dyn Iterator<Item = Block> + '_> {
        let blocks = self.dataset.blocks();
        let sliced: Box<dyn Iterator<Item = Block> + '_> = match self.slice_size {
            None => blocks,
            Some(size) => {
                let drop_last = self.drop_last;
                Box::new(blocks.flat_map(move |block| {
                    let total = block.block_size();
                    (0..total)
                        .step_by(size)
                        .filter(move |&start| !(drop_last && start + size > total))
                        .filter_map(move |start| block.slice(start..start + size).ok())
                        .collect::<Vec<_>>()
                }))
            }
        };

        match self.max_blocks {
            Some(max) => Box::new(sliced.take(max)),
            None => sliced,
        }
    }

    fn len(&self) -> Option<usize> {
        if self.slice_size.is_some() {
            return None;
        }
        let len = self.dataset.len()?;
        Some(self.max_blocks.map_or(len, |max| len.min(max)))
    }
}

/// Cuts each source block into hopping windows.
///
/// Windows never span source blocks. A window running past the end of a
/// block is shortened, or dropped when `drop_last` is set.
pub struct WindowedStreamDataLoader {
    dataset: Box<dyn Dataset>,
    window_size: usize,
    hop_size: usize,
    max_windows: Option<usize>,
    drop_last: bool,
}

impl WindowedStreamDataLoader {
    pub fn new(
        dataset: impl Dataset + 'static,
        window_size: usize,
        hop_size: Option<usize>,
    ) -> Result<Self, PipelineError> {
        if window_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "window_size must be positive".to_string(),
            ));
        }
        if hop_size == Some(0) {
            return Err(PipelineError::InvalidConfig(
                "hop_size must be positive when provided".to_string(),
            ));
        }
        Ok(Self {
            dataset: Box::new(dataset),
            window_size,
            hop_size: hop_size.unwrap_or(window_size),
            max_windows: None,
            drop_last: false,
        })
    }

    pub fn max_windows(mut self, max_windows: usize) -> Self {
        self.max_windows = Some(max_windows);
        self
    }

    pub fn drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }
}

impl Dataset for WindowedStreamDataLoader {
    fn blocks(&self) -> Box<dyn Iterator<Item = Block> + '_> {
        let (window, hop, drop_last) = (self.window_size, self.hop_size, self.drop_last);
        let windows = self.dataset.blocks().flat_map(move |block| {
            let total = block.block_size();
            (0..total)
                .step_by(hop)
                .take_while(move |&start| !(drop_last && start + window > total))
                .filter_map(move |start| block.slice(start..start + window).ok())
                .collect::<Vec<_>>()
        });

        match self.max_windows {
            Some(max) => Box::new(windows.take(max)),
            None => Box::new(windows),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::IterableDataset;
    use chrono::Utc;

    fn ramp(len: usize) -> Block {
        Block::from_samples((0..len).map(|i| i as f64).collect(), 10.0, Utc::now()).unwrap()
    }

    #[test]
    fn test_slices_keep_short_tail() {
        let loader = StreamDataLoader::new(IterableDataset::new(vec![ramp(10)]))
            .slice_size(4)
            .unwrap();
        let sizes: Vec<usize> = loader.blocks().map(|b| b.block_size()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[test]
    fn test_slices_drop_last() {
        let loader = StreamDataLoader::new(IterableDataset::new(vec![ramp(10)]))
            .slice_size(4)
            .unwrap()
            .drop_last(true);
        let sizes: Vec<usize> = loader.blocks().map(|b| b.block_size()).collect();
        assert_eq!(sizes, vec![4, 4]);
    }

    #[test]
    fn test_zero_slice_size_rejected() {
        let result = StreamDataLoader::new(IterableDataset::default()).slice_size(0);
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn test_windowed_hops_within_block() {
        let loader =
            WindowedStreamDataLoader::new(IterableDataset::new(vec![ramp(10)]), 4, Some(3))
                .unwrap()
                .drop_last(true);
        let starts: Vec<f64> = loader.blocks().map(|b| b.values()[[0, 0]]).collect();
        assert_eq!(starts, vec![0.0, 3.0, 6.0]);
    }
}
