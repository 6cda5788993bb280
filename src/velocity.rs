//! Velocity estimation and noise-threshold self-calibration.
//!
//! v = median_filter(d position / dt), then `v_th = noise_gain * RMS(v)`.
//! The threshold is returned with the estimate rather than stored anywhere, so
//! a processor can be shared between threads.

use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::smoothing::MedianSmoother;

#[derive(Clone, Debug, PartialEq)]
pub struct VelocityEstimate {
    pub velocity: Array1<f64>,
    /// Self-calibrated noise threshold.
    pub v_th: f64,
    pub rms: f64,
    pub max_abs: f64,
}

/// Velocity above the plausibility bound for the modality.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HighVelocity {
    pub max_abs: f64,
    pub limit: f64,
    pub unit: String,
    /// Times of the offending samples.
    pub times: Vec<f64>,
}

/// Derivative with central differences inside and one-sided differences at the
/// ends (`numpy.gradient` with unit edge order).
pub fn gradient(x: ArrayView1<f64>, dt: f64) -> Array1<f64> {
    let n = x.len();
    let mut g = Array1::zeros(n);
    if n < 2 || dt == 0.0 {
        return g;
    }
    g[0] = (x[1] - x[0]) / dt;
    g[n - 1] = (x[n - 1] - x[n - 2]) / dt;
    for i in 1..n - 1 {
        g[i] = (x[i + 1] - x[i - 1]) / (2.0 * dt);
    }
    g
}

pub fn rms(values: ArrayView1<f64>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    (values.iter().map(|v| v * v).sum::<f64>() / values.len() as f64).sqrt()
}

pub fn max_abs(values: ArrayView1<f64>) -> f64 {
    values.iter().fold(0.0_f64, |m, v| m.max(v.abs()))
}

pub struct VelocityEstimator {
    smoother: MedianSmoother,
    noise_gain: f64,
}

impl VelocityEstimator {
    pub fn new(median_window: usize, noise_gain: f64) -> Self {
        Self {
            smoother: MedianSmoother::new(median_window),
            noise_gain,
        }
    }

    pub fn estimate(&self, position: ArrayView1<f64>, dt: f64) -> VelocityEstimate {
        let velocity = if position.len() < 2 || dt == 0.0 {
            Array1::zeros(position.len())
        } else {
            self.smoother.apply(gradient(position, dt).view())
        };
        let rms = rms(velocity.view());
        let max_abs = max_abs(velocity.view());
        VelocityEstimate {
            v_th: rms * self.noise_gain,
            rms,
            max_abs,
            velocity,
        }
    }
}

/// Sanity check against a physical velocity bound. Non-fatal: the caller
/// records the result as a warning.
pub fn check_velocity_limit(
    time: ArrayView1<f64>,
    velocity: ArrayView1<f64>,
    limit: f64,
    unit: &str,
) -> Option<HighVelocity> {
    let peak = max_abs(velocity);
    if peak <= limit {
        return None;
    }
    let times: Vec<f64> = velocity
        .iter()
        .zip(time.iter())
        .filter(|(v, _)| v.abs() > limit)
        .map(|(_, t)| *t)
        .collect();
    log::warn!("Maximum velocity ({peak:.2} {unit}) exceeds threshold ({limit} {unit})");
    log::debug!("High velocity occurred at times: {times:?}");
    Some(HighVelocity {
        max_abs: peak,
        limit,
        unit: unit.to_string(),
        times,
    })
}
