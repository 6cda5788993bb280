//! Linearity and step-size checks on a sequence of dwell positions.

use nalgebra::{Matrix2, Vector2};
use serde::{Deserialize, Serialize};

use crate::types::Stillstand;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineFit {
    pub slope: f64,
    pub intercept: f64,
    pub points: usize,
}

impl LineFit {
    pub fn at(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// How step deviations are expressed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviationMode {
    /// Same unit as the positions.
    #[default]
    Absolute,
    /// Percent of the expected step.
    Relative,
}

pub fn stillstand_positions(stillstands: &[Stillstand]) -> Vec<f64> {
    stillstands.iter().map(|s| s.avg_position).collect()
}

/// Nominal travel `j * step` of each dwell.
pub fn nominal_travel(count: usize, step: f64) -> Vec<f64> {
    (0..count).map(|j| j as f64 * step).collect()
}

/// Dwell positions with the ideal staircase and the remaining mean removed.
/// Non-finite entries stay non-finite and are left out of the mean.
pub fn linearity_residuals(averages: &[f64], step: f64) -> Vec<f64> {
    let mut residuals: Vec<f64> = averages
        .iter()
        .zip(nominal_travel(averages.len(), step))
        .map(|(a, x)| a - x)
        .collect();

    let finite: Vec<f64> = residuals.iter().copied().filter(|r| r.is_finite()).collect();
    if !finite.is_empty() {
        let mean = finite.iter().sum::<f64>() / finite.len() as f64;
        residuals.iter_mut().for_each(|r| *r -= mean);
    }
    residuals
}

/// Least-squares line through the finite `(x, y)` pairs.
pub fn fit_line(x: &[f64], y: &[f64]) -> Option<LineFit> {
    let mut normal = Matrix2::<f64>::zeros();
    let mut rhs = Vector2::<f64>::zeros();
    let mut points = 0;

    for (&xi, &yi) in x.iter().zip(y) {
        if !(xi.is_finite() && yi.is_finite()) {
            continue;
        }
        let row = Vector2::new(xi, 1.0);
        normal += row * row.transpose();
        rhs += row * yi;
        points += 1;
    }
    if points < 2 {
        return None;
    }

    let Some(inv) = normal.try_inverse() else {
        log::warn!("Line fit is singular ({points} points share one x value)");
        return None;
    };
    let coeffs = inv * rhs;
    Some(LineFit {
        slope: coeffs[0],
        intercept: coeffs[1],
        points,
    })
}

/// Difference between each consecutive position delta and the expected step.
pub fn step_deviation(positions: &[f64], expected_step: f64, mode: DeviationMode) -> Vec<f64> {
    positions
        .windows(2)
        .map(|w| {
            let actual = w[1] - w[0];
            match mode {
                DeviationMode::Absolute => actual - expected_step,
                DeviationMode::Relative => 100.0 * (actual - expected_step) / expected_step,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::{process_signal, ProcessorConfig};
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use std::f64::consts::PI;

    /// Eleven 0.25 moves with S-curve ramps between 100-sample dwells.
    fn forward_staircase() -> Vec<f64> {
        let mut out = vec![0.0; 100];
        let mut level = 0.0;
        for _ in 0..11 {
            out.extend((1..=50).map(|j| level + 0.25 * (1.0 - (PI * j as f64 / 50.0).cos()) / 2.0));
            level += 0.25;
            out.extend(std::iter::repeat(level).take(100));
        }
        out
    }

    #[test]
    fn test_residuals_of_ideal_staircase_vanish() {
        let averages = [3.0, 3.5, 4.0, 4.5];
        for r in linearity_residuals(&averages, 0.5) {
            assert_relative_eq!(r, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_residuals_skip_nan_in_mean() {
        let averages = [1.0, f64::NAN, 3.0];
        let r = linearity_residuals(&averages, 1.0);
        assert_relative_eq!(r[0], 0.0, epsilon = 1e-12);
        assert!(r[1].is_nan());
        assert_relative_eq!(r[2], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_fit_line() {
        let x = [0.0, 1.0, 2.0, 3.0, f64::NAN];
        let y = [1.0, 3.0, 5.0, 7.0, 100.0];
        let fit = fit_line(&x, &y).unwrap();
        assert_relative_eq!(fit.slope, 2.0, epsilon = 1e-9);
        assert_relative_eq!(fit.intercept, 1.0, epsilon = 1e-9);
        assert_eq!(fit.points, 4);
        assert_relative_eq!(fit.at(10.0), 21.0, epsilon = 1e-9);
    }

    #[test]
    fn test_fit_line_degenerate() {
        assert!(fit_line(&[1.0], &[2.0]).is_none());
        assert!(fit_line(&[1.0, 1.0, 1.0], &[2.0, 3.0, 4.0]).is_none());
    }

    #[test]
    fn test_step_deviation() {
        let positions = [0.0, 0.26, 0.5];
        let abs = step_deviation(&positions, 0.25, DeviationMode::Absolute);
        assert_relative_eq!(abs[0], 0.01, epsilon = 1e-12);
        assert_relative_eq!(abs[1], -0.01, epsilon = 1e-12);
        let rel = step_deviation(&positions, 0.25, DeviationMode::Relative);
        assert_relative_eq!(rel[0], 4.0, epsilon = 1e-9);
        assert!(step_deviation(&[1.0], 0.25, DeviationMode::Absolute).is_empty());
    }

    #[test]
    fn test_nominal_travel() {
        assert_eq!(nominal_travel(4, 0.5), vec![0.0, 0.5, 1.0, 1.5]);
        assert!(nominal_travel(0, 0.5).is_empty());
    }

    #[test]
    fn test_step_deviation_of_processed_staircase() {
        let config = ProcessorConfig { t_start: 0.02, t_stop: 0.02, ..ProcessorConfig::default() };
        let out = process_signal(forward_staircase(), config).unwrap();

        let positions = stillstand_positions(&out.stillstands);
        assert_eq!(positions.len(), 10);
        assert_abs_diff_eq!(positions[0], 0.25, epsilon = 1e-3);

        let deviation = step_deviation(&positions, 0.25, DeviationMode::Absolute);
        assert_eq!(deviation.len(), 9);
        for d in deviation {
            assert_abs_diff_eq!(d, 0.0, epsilon = 2e-3);
        }

        let travel = nominal_travel(positions.len(), 0.25);
        let fit = fit_line(&travel, &positions).unwrap();
        assert_abs_diff_eq!(fit.slope, 1.0, epsilon = 1e-2);
        assert_abs_diff_eq!(fit.intercept, 0.25, epsilon = 1e-2);
        for r in linearity_residuals(&positions, 0.25) {
            assert_abs_diff_eq!(r, 0.0, epsilon = 2e-3);
        }
    }
}
