use ndarray::{Array1, ArrayView1};

use crate::types::CanonicalSeries;

pub const FULL_TURN_DEG: f64 = 360.0;

/// Remove discontinuities larger than half a period by adding multiples of
/// `period`, numpy `unwrap` style.
pub fn unwrap_period(values: ArrayView1<f64>, period: f64) -> Array1<f64> {
    let half = period / 2.0;
    let mut out = values.to_owned();
    let mut correction = 0.0;

    for i in 1..values.len() {
        let dd = values[i] - values[i - 1];
        let mut ddmod = (dd + half).rem_euclid(period) - half;
        if ddmod == -half && dd > 0.0 {
            ddmod = half;
        }
        if dd.abs() >= half {
            correction += ddmod - dd;
        }
        out[i] = values[i] + correction;
    }
    out
}

/// Rotational preprocessing: move a series that starts above 180° onto the
/// negative branch (raw channel included), then unwrap into `position`.
pub fn unwrap_rotational(series: &mut CanonicalSeries) {
    if series.is_empty() {
        return;
    }
    if series.position_raw[0] > FULL_TURN_DEG / 2.0 {
        series.position_raw.mapv_inplace(|v| v - FULL_TURN_DEG);
    }
    series.position = unwrap_period(series.position_raw.view(), FULL_TURN_DEG);
    log::debug!("Unwrapped {} rotational samples", series.len());
}
