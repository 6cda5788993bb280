use ndarray::{Array1, ArrayView1};

/// Median smoothing for differentiated signals.
/// Edges are extended with the nearest sample, like `scipy.ndimage.median_filter(mode="nearest")`.
pub struct MedianSmoother {
    window_size: usize,
}

impl MedianSmoother {
    /// Create a smoother with an odd window size (typically 5)
    pub fn new(window_size: usize) -> Self {
        MedianSmoother { window_size }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Smooth a whole series. Series shorter than the window come back unchanged.
    pub fn apply(&self, values: ArrayView1<f64>) -> Array1<f64> {
        let n = values.len();
        if self.window_size <= 1 || n < self.window_size {
            return values.to_owned();
        }

        let half = (self.window_size / 2) as isize;
        let last = n as isize - 1;
        let mut scratch = vec![0.0; self.window_size];

        Array1::from_iter((0..n as isize).map(|i| {
            for (slot, j) in scratch.iter_mut().zip(i - half..=i + half) {
                *slot = values[j.clamp(0, last) as usize];
            }
            scratch.sort_by(|a, b| a.total_cmp(b));
            scratch[self.window_size / 2]
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_removes_single_spike() {
        let smoother = MedianSmoother::new(5);
        let out = smoother.apply(array![1.0, 1.0, 1.0, 9.0, 1.0, 1.0, 1.0].view());
        assert_eq!(out, array![1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_nearest_edge_padding() {
        let smoother = MedianSmoother::new(5);
        // At index 0 the window is [5, 5, 5, 1, 2] -> median 5
        let out = smoother.apply(array![5.0, 1.0, 2.0, 3.0, 4.0, 4.0].view());
        assert_eq!(out[0], 5.0);
        // Window at the end is [3, 4, 4, 4, 4] -> 4
        assert_eq!(out[5], 4.0);
    }

    #[test]
    fn test_short_series_unchanged() {
        let smoother = MedianSmoother::new(5);
        let input = array![3.0, 1.0, 2.0, 0.0];
        assert_eq!(smoother.apply(input.view()), input);
    }

    #[test]
    fn test_step_edge_preserved() {
        let smoother = MedianSmoother::new(3);
        let out = smoother.apply(array![0.0, 0.0, 0.0, 4.0, 4.0, 4.0].view());
        assert_eq!(out, array![0.0, 0.0, 0.0, 4.0, 4.0, 4.0]);
        assert_eq!(smoother.window_size(), 3);
    }
}
