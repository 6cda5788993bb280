use ndarray::ArrayView1;

/// Single-pass heuristics that strip spurious transitions at the ends of a
/// record. Rules run once, in order, and each needs two remaining peaks.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PeakCleaner {
    /// A first peak below this position is a start-of-record artifact.
    pub start_artifact_position: f64,
    /// Position change between neighbouring peaks above which they cannot
    /// bracket a dwell.
    pub settle_tolerance: f64,
}

impl Default for PeakCleaner {
    fn default() -> Self {
        Self {
            start_artifact_position: 1.0,
            settle_tolerance: 0.1,
        }
    }
}

impl PeakCleaner {
    pub fn clean(&self, position: ArrayView1<f64>, mut peaks: Vec<usize>) -> Vec<usize> {
        if peaks.len() >= 2 && position[peaks[0]] < self.start_artifact_position {
            log::debug!("Dropping start artifact peak at {}", peaks[0]);
            peaks.remove(0);
        }

        // Still moving between the first two peaks: the first was mid-motion.
        if peaks.len() >= 2 && (position[peaks[1]] - position[peaks[0]]).abs() > self.settle_tolerance {
            log::debug!("Dropping leading mid-motion peak at {}", peaks[0]);
            peaks.remove(0);
        }

        let n = peaks.len();
        if n >= 2 && (position[peaks[n - 1]] - position[peaks[n - 2]]).abs() > self.settle_tolerance {
            log::debug!("Dropping trailing mid-motion peak at {}", peaks[n - 1]);
            peaks.pop();
        }

        peaks
    }
}
