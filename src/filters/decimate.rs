//! Anti-aliased downsampling of the position channel.
//!
//! Low-pass: Hamming-windowed sinc FIR, `20 * q + 1` taps, cutoff at `1/q` of
//! Nyquist, unit DC gain. It is applied centred on each output sample, so the
//! result has no phase lag, and only every `q`-th output is computed.

use std::f64::consts::PI;
use std::time::Instant;

use ndarray::{s, Array1, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::types::CanonicalSeries;

/// Outcome of the downsampling stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Decimation {
    /// Factor 1: stage disabled.
    Passthrough,
    Decimated {
        factor: usize,
        len_before: usize,
        len_after: usize,
    },
    /// Decimation failed; the unfiltered series was passed on.
    Degraded { factor: usize, reason: String },
}

impl Decimation {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Decimation::Degraded { .. })
    }

    /// Factor actually applied to the series.
    pub fn effective_factor(&self) -> usize {
        match self {
            Decimation::Decimated { factor, .. } => *factor,
            _ => 1,
        }
    }
}

fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        (PI * x).sin() / (PI * x)
    }
}

/// FIR low-pass taps for a decimation factor.
pub fn lowpass_taps(factor: usize) -> Vec<f64> {
    let numtaps = 20 * factor + 1;
    let cutoff = 1.0 / factor as f64;
    let m = (numtaps - 1) as f64;

    let mut taps: Vec<f64> = (0..numtaps)
        .map(|k| {
            let k = k as f64;
            let window = 0.54 - 0.46 * (2.0 * PI * k / m).cos();
            cutoff * sinc(cutoff * (k - m / 2.0)) * window
        })
        .collect();

    let sum: f64 = taps.iter().sum();
    if sum != 0.0 {
        taps.iter_mut().for_each(|t| *t /= sum);
    }
    taps
}

/// Zero-phase filter-and-decimate. Output length is `ceil(n / factor)`;
/// samples outside the signal count as zero.
pub fn decimate(signal: ArrayView1<f64>, factor: usize) -> Array1<f64> {
    let n = signal.len();
    if factor <= 1 {
        return signal.to_owned();
    }
    let taps = lowpass_taps(factor);
    let half = (taps.len() / 2) as isize;
    let out_len = (n + factor - 1) / factor;

    (0..out_len)
        .map(|m| {
            let centre = (m * factor) as isize + half;
            taps.iter()
                .enumerate()
                .filter_map(|(k, h)| {
                    let j = centre - k as isize;
                    (j >= 0 && (j as usize) < n).then(|| h * signal[j as usize])
                })
                .sum()
        })
        .collect()
}

/// Decimate `series` by `factor`, degrading to a pass-through on failure.
pub fn downsample(series: CanonicalSeries, factor: usize) -> (CanonicalSeries, Decimation) {
    if factor <= 1 {
        return (series, Decimation::Passthrough);
    }

    let start = Instant::now();
    match try_downsample(&series, factor) {
        Ok(decimated) => {
            log::info!(
                "Downsampling took {:.4} s, length {} -> {}",
                start.elapsed().as_secs_f64(),
                series.len(),
                decimated.len()
            );
            let outcome = Decimation::Decimated {
                factor,
                len_before: series.len(),
                len_after: decimated.len(),
            };
            (decimated, outcome)
        }
        Err(reason) => {
            log::error!("Error during downsampling: {reason}. Passing the series through unfiltered");
            (series, Decimation::Degraded { factor, reason })
        }
    }
}

fn try_downsample(series: &CanonicalSeries, factor: usize) -> Result<CanonicalSeries, String> {
    let n = series.len();
    if n == 0 {
        return Err("empty series".into());
    }

    let filtered = decimate(series.position.view(), factor);
    if filtered.is_empty() {
        return Err("filter produced no samples".into());
    }
    if let Some(i) = filtered.iter().position(|v| !v.is_finite()) {
        return Err(format!("non-finite filter output at sample {i}"));
    }

    // Index grid decimated the same way so rows stay aligned with the filtered signal.
    let ramp = Array1::from_iter((0..n).map(|i| i as f64));
    let rows: Vec<usize> = decimate(ramp.view(), factor)
        .iter()
        .map(|&v| (v.trunc() as i64).clamp(0, n as i64 - 1) as usize)
        .collect();

    let len = filtered.len().min(rows.len());
    let mut out = series.select(&rows[..len]);
    out.position = filtered.slice(s![..len]).to_owned();
    Ok(out)
}
