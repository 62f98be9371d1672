use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use ndarray::{s, Array2};
use serde_json::Value;

use crate::error::BlockError;

/// Side-channel information attached to a block (sensor name, scale, slice, ...)
pub type Metadata = BTreeMap<String, Value>;

/// Immutable chunk of time-aligned multi-channel samples.
///
/// `values` is laid out samples x channels. Sample data and sensor maps are
/// shared behind `Arc`, so cloning a block is cheap and never exposes
/// mutable state to another owner.
#[derive(Debug, Clone)]
pub struct Block {
    values: Arc<Array2<f64>>,
    sample_rate: f64,
    timestamp: DateTime<Utc>,
    metadata: Metadata,
    sensors: Option<Arc<BTreeMap<String, Block>>>,
}

impl Block {
    pub fn new(
        values: Array2<f64>,
        sample_rate: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, BlockError> {
        validate(&values, sample_rate)?;
        Ok(Self {
            values: Arc::new(values),
            sample_rate,
            timestamp,
            metadata: Metadata::new(),
            sensors: None,
        })
    }

    /// Naive timestamps are interpreted as UTC.
    pub fn from_naive(
        values: Array2<f64>,
        sample_rate: f64,
        timestamp: NaiveDateTime,
    ) -> Result<Self, BlockError> {
        Self::new(values, sample_rate, timestamp.and_utc())
    }

    /// Single-channel block from a flat sample vector.
    pub fn from_samples(
        samples: Vec<f64>,
        sample_rate: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, BlockError> {
        let rows = samples.len();
        let values = Array2::from_shape_vec((rows, 1), samples)
            .map_err(|_| BlockError::EmptySamples)?;
        Self::new(values, sample_rate, timestamp)
    }

    /// Block from row-major samples; every row must have the same channel count.
    pub fn from_rows(
        rows: Vec<Vec<f64>>,
        sample_rate: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, BlockError> {
        let expected = rows.first().map(Vec::len).ok_or(BlockError::EmptySamples)?;
        for (row, data) in rows.iter().enumerate() {
            if data.len() != expected {
                return Err(BlockError::RaggedRows {
                    row,
                    expected,
                    found: data.len(),
                });
            }
        }

        let n_rows = rows.len();
        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        let values = Array2::from_shape_vec((n_rows, expected), flat)
            .map_err(|_| BlockError::EmptyChannels)?;
        Self::new(values, sample_rate, timestamp)
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_sensors(mut self, sensors: BTreeMap<String, Block>) -> Self {
        self.sensors = Some(Arc::new(sensors));
        self
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Number of samples (rows).
    pub fn block_size(&self) -> usize {
        self.values.nrows()
    }

    pub fn channels(&self) -> usize {
        self.values.ncols()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.block_size() as f64 / self.sample_rate
    }

    pub fn sensors(&self) -> Option<&BTreeMap<String, Block>> {
        self.sensors.as_deref()
    }

    pub fn sensor(&self, name: &str) -> Option<&Block> {
        self.sensors().and_then(|sensors| sensors.get(name))
    }

    /// Copy of this block with replaced values and/or metadata.
    ///
    /// Sample rate and timestamp are kept. The sensor map is carried over
    /// only when the metadata is left untouched.
    pub fn copy_with(
        &self,
        values: Option<Array2<f64>>,
        metadata: Option<Metadata>,
    ) -> Result<Self, BlockError> {
        let values = match values {
            Some(values) => {
                validate(&values, self.sample_rate)?;
                Arc::new(values)
            }
            None => Arc::clone(&self.values),
        };

        let (metadata, sensors) = match metadata {
            Some(metadata) => (metadata, None),
            None => (self.metadata.clone(), self.sensors.clone()),
        };

        Ok(Self {
            values,
            sample_rate: self.sample_rate,
            timestamp: self.timestamp,
            metadata,
            sensors,
        })
    }

    /// Row slice; both bounds are clamped to the block size.
    ///
    /// The timestamp moves forward by `start / sample_rate` and the applied
    /// range is recorded under the `"slice"` metadata key.
    pub fn slice(&self, range: Range<usize>) -> Result<Self, BlockError> {
        let size = self.block_size();
        let start = range.start.min(size);
        let stop = range.end.min(size);
        if stop <= start {
            return Err(BlockError::EmptySlice {
                start: range.start,
                stop: range.end,
            });
        }

        let values = self.values.slice(s![start..stop, ..]).to_owned();
        let mut metadata = self.metadata.clone();
        metadata.insert("slice".to_string(), serde_json::json!([start, stop, 1]));

        Ok(Self {
            values: Arc::new(values),
            sample_rate: self.sample_rate,
            timestamp: offset_timestamp(self.timestamp, start, self.sample_rate),
            metadata,
            sensors: self.sensors.clone(),
        })
    }
}

/// `base + samples / sample_rate`, rounded to the nearest nanosecond.
pub fn offset_timestamp(base: DateTime<Utc>, samples: usize, sample_rate: f64) -> DateTime<Utc> {
    let nanos = (samples as f64 / sample_rate * 1e9).round() as i64;
    base + Duration::nanoseconds(nanos)
}

fn validate(values: &Array2<f64>, sample_rate: f64) -> Result<(), BlockError> {
    if !(sample_rate.is_finite() && sample_rate > 0.0) {
        return Err(BlockError::InvalidSampleRate(sample_rate));
    }
    if values.nrows() == 0 {
        return Err(BlockError::EmptySamples);
    }
    if values.ncols() == 0 {
        return Err(BlockError::EmptyChannels);
    }
    Ok(())
}
