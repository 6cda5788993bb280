//! Columnar sample containers shared by every pipeline stage.
//!
//! Channels are kept as separate `Array1<f64>` columns so the filters can work on
//! whole vectors; rows are only materialised when a table is exported.

use ndarray::Array1;
use serde::ser::{Serialize, Serializer};

use super::{Peak, PhaseBoundary, Sample};

/// Canonical position series before a time grid has been assigned.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CanonicalSeries {
    pub position_raw: Array1<f64>,
    pub position: Array1<f64>,
}

impl CanonicalSeries {
    pub fn new(position_raw: Vec<f64>, position: Vec<f64>) -> Self {
        debug_assert_eq!(position_raw.len(), position.len());
        Self {
            position_raw: Array1::from(position_raw),
            position: Array1::from(position),
        }
    }

    /// Series where `position` starts out identical to `position_raw`.
    pub fn from_raw(position_raw: Vec<f64>) -> Self {
        let position = position_raw.clone();
        Self::new(position_raw, position)
    }

    pub fn len(&self) -> usize {
        self.position_raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.position_raw.is_empty()
    }

    /// Keep the given rows, in the given order, reindexed contiguously.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            position_raw: indices.iter().map(|&i| self.position_raw[i]).collect(),
            position: indices.iter().map(|&i| self.position[i]).collect(),
        }
    }
}

/// One row of the processed-series table.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SeriesRow {
    pub time: f64,
    pub position_raw: f64,
    pub position: f64,
    pub velocity: f64,
}

/// Preprocessed series on a uniform time grid with its velocity channel.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProcessedSeries {
    pub time: Array1<f64>,
    pub position_raw: Array1<f64>,
    pub position: Array1<f64>,
    pub velocity: Array1<f64>,
}

impl ProcessedSeries {
    /// Attach a uniform time grid `i * dt` and a zeroed velocity channel.
    pub fn on_grid(series: CanonicalSeries, dt: f64) -> Self {
        let n = series.len();
        Self {
            time: Array1::from_iter((0..n).map(|i| i as f64 * dt)),
            position_raw: series.position_raw,
            position: series.position,
            velocity: Array1::zeros(n),
        }
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn sample(&self, i: usize) -> Option<Sample> {
        (i < self.len()).then(|| Sample {
            time: self.time[i],
            position_raw: self.position_raw[i],
            position: self.position[i],
        })
    }

    pub fn row(&self, i: usize) -> Option<SeriesRow> {
        (i < self.len()).then(|| SeriesRow {
            time: self.time[i],
            position_raw: self.position_raw[i],
            position: self.position[i],
            velocity: self.velocity[i],
        })
    }

    pub fn rows(&self) -> impl Iterator<Item = SeriesRow> + '_ {
        (0..self.len()).filter_map(move |i| self.row(i))
    }

    /// Mean spacing of the time grid, counting the first sample as one
    /// `fallback` step so a single-sample series still reports a step.
    pub fn mean_dt(&self, fallback: f64) -> f64 {
        let n = self.len();
        if n == 0 {
            return fallback;
        }
        let diffs: f64 = self
            .time
            .windows(2)
            .into_iter()
            .map(|w| w[1] - w[0])
            .sum();
        (fallback + diffs) / n as f64
    }

    /// Peak descriptor for a sample index. Caller guarantees the index is in range.
    pub(crate) fn peak_at(&self, index: usize) -> Peak {
        Peak {
            index,
            time: self.time[index],
            position: self.position[index],
            velocity: self.velocity[index],
        }
    }

    pub(crate) fn boundary_at(&self, index: usize) -> PhaseBoundary {
        PhaseBoundary {
            index,
            time: self.time[index],
            position: self.position[index],
            velocity: self.velocity[index],
        }
    }
}

impl Serialize for ProcessedSeries {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.rows())
    }
}
