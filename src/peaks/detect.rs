//! Transition detection on the velocity channel.
//!
//! The search runs on `d = -| |v| - motion_gain * v_th |`, which peaks where the
//! speed crosses the expected in-motion level: once while accelerating into a
//! move and once while decelerating out of it.

use ndarray::{Array1, ArrayView1};

use crate::velocity::max_abs;

/// Constraints a local maximum must satisfy to be reported.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PeakCriteria {
    pub height: Option<f64>,
    /// Minimum index separation between accepted peaks (>= 1).
    pub distance: usize,
    pub prominence: Option<f64>,
}

/// Local maxima; a flat top reports its middle sample (rounded down).
pub fn local_maxima(x: ArrayView1<f64>) -> Vec<usize> {
    let n = x.len();
    let mut peaks = Vec::new();
    if n < 3 {
        return peaks;
    }
    let i_max = n - 1;
    let mut i = 1;
    while i < i_max {
        if x[i - 1] < x[i] {
            let mut ahead = i + 1;
            while ahead < i_max && x[ahead] == x[i] {
                ahead += 1;
            }
            if x[ahead] < x[i] {
                peaks.push((i + ahead - 1) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    peaks
}

/// Greedy separation: visit peaks from highest to lowest and suppress every
/// neighbour closer than `distance`. Ties go to the later peak.
pub fn select_by_distance(x: ArrayView1<f64>, peaks: &[usize], distance: usize) -> Vec<usize> {
    if distance <= 1 || peaks.len() < 2 {
        return peaks.to_vec();
    }
    let mut keep = vec![true; peaks.len()];
    let mut order: Vec<usize> = (0..peaks.len()).collect();
    order.sort_by(|&a, &b| x[peaks[a]].total_cmp(&x[peaks[b]]));

    for &j in order.iter().rev() {
        if !keep[j] {
            continue;
        }
        let mut k = j;
        while k > 0 && peaks[j] - peaks[k - 1] < distance {
            keep[k - 1] = false;
            k -= 1;
        }
        let mut k = j + 1;
        while k < peaks.len() && peaks[k] - peaks[j] < distance {
            keep[k] = false;
            k += 1;
        }
    }

    peaks
        .iter()
        .zip(keep)
        .filter_map(|(&p, kept)| kept.then_some(p))
        .collect()
}

/// Height of a peak above the higher of the two lowest points reachable on
/// each side before meeting a strictly higher sample.
pub fn prominence(x: ArrayView1<f64>, peak: usize) -> f64 {
    let top = x[peak];

    let mut left_min = top;
    let mut i = peak;
    loop {
        if x[i] > top {
            break;
        }
        left_min = left_min.min(x[i]);
        if i == 0 {
            break;
        }
        i -= 1;
    }

    let mut right_min = top;
    for &v in x.iter().skip(peak) {
        if v > top {
            break;
        }
        right_min = right_min.min(v);
    }

    top - left_min.max(right_min)
}

/// Local maxima filtered by height, then distance, then prominence.
pub fn find_peaks(x: ArrayView1<f64>, criteria: &PeakCriteria) -> Vec<usize> {
    let mut peaks = local_maxima(x);

    if let Some(height) = criteria.height {
        peaks.retain(|&p| x[p] >= height);
    }

    peaks = select_by_distance(x, &peaks, criteria.distance.max(1));

    if let Some(min_prominence) = criteria.prominence {
        peaks.retain(|&p| prominence(x, p) >= min_prominence);
    }
    peaks
}

/// Move/stop transition detector tuned by the calibrated noise threshold.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransitionDetector {
    pub motion_gain: f64,
    pub height_gain: f64,
    pub distance_fraction: f64,
    pub prominence_fraction: f64,
}

impl Default for TransitionDetector {
    fn default() -> Self {
        Self {
            motion_gain: 8.0,
            height_gain: 2.0,
            distance_fraction: 0.1,
            prominence_fraction: 0.2,
        }
    }
}

impl TransitionDetector {
    pub fn detection_signal(&self, velocity: ArrayView1<f64>, v_th: f64) -> Array1<f64> {
        let motion_level = self.motion_gain * v_th;
        velocity.mapv(|v| -(v.abs() - motion_level).abs())
    }

    pub fn criteria(&self, velocity: ArrayView1<f64>, v_th: f64, t_stop: f64, dt: f64) -> PeakCriteria {
        let distance = (self.distance_fraction * t_stop / dt).round().max(1.0) as usize;
        PeakCriteria {
            height: Some(-self.height_gain * v_th),
            distance,
            prominence: Some(self.prominence_fraction * max_abs(velocity)),
        }
    }

    /// Ascending sample indices of the candidate transitions. Degenerate input
    /// (no samples, non-positive dt) yields no peaks.
    pub fn detect(&self, velocity: ArrayView1<f64>, v_th: f64, t_stop: f64, dt: f64) -> Vec<usize> {
        if velocity.is_empty() || !(dt > 0.0) {
            log::warn!("Cannot detect transitions: empty velocity or invalid dt ({dt})");
            return Vec::new();
        }
        let signal = self.detection_signal(velocity, v_th);
        let criteria = self.criteria(velocity, v_th, t_stop, dt);
        let peaks = find_peaks(signal.view(), &criteria);
        log::debug!("Found {} raw velocity peaks ({criteria:?})", peaks.len());
        peaks
    }
}
