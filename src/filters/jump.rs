use crate::types::CanonicalSeries;

/// Drops samples whose raw position jumps implausibly far from the sample
/// just before it in the input. Jumps at least `unwrap_threshold` wide are
/// rotational wraps and are kept.
///
/// The neighbour is the input neighbour, dropped or not: a genuine level shift
/// costs one sample, and an isolated spike costs the spike and the sample that
/// returns from it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JumpFilter {
    pub diff_threshold: f64,
    pub unwrap_threshold: f64,
}

impl Default for JumpFilter {
    fn default() -> Self {
        Self {
            diff_threshold: 5.0,
            unwrap_threshold: 355.0,
        }
    }
}

impl JumpFilter {
    pub fn new(diff_threshold: f64, unwrap_threshold: f64) -> Self {
        Self { diff_threshold, unwrap_threshold }
    }

    fn accepts(&self, delta: f64) -> bool {
        delta <= self.diff_threshold || delta >= self.unwrap_threshold
    }

    /// Indices of the samples that survive, in order. The first sample always does.
    pub fn retained_indices(&self, position_raw: &[f64]) -> Vec<usize> {
        (0..position_raw.len())
            .filter(|&i| i == 0 || self.accepts((position_raw[i] - position_raw[i - 1]).abs()))
            .collect()
    }

    /// Filter the series; returns the survivors (reindexed) and the drop count.
    pub fn apply(&self, series: &CanonicalSeries) -> (CanonicalSeries, usize) {
        let raw = series.position_raw.to_vec();
        let kept = self.retained_indices(&raw);
        let dropped = raw.len() - kept.len();
        if dropped == 0 {
            return (series.clone(), 0);
        }
        (series.select(&kept), dropped)
    }
}
