//! Window averaging that does not depend on transition detection: a fixed
//! timing schedule, or a standard-deviation based stagnation search.

use serde::{Deserialize, Serialize};

/// Fixed move/dwell timing of a scripted measurement (all times in seconds).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WindowSchedule {
    /// Start of the first window.
    pub offset: f64,
    pub window: f64,
    /// Movement time between two windows.
    pub movement: f64,
    pub count: usize,
}

impl WindowSchedule {
    pub fn cycle(&self) -> f64 {
        self.window + self.movement
    }

    pub fn window_start(&self, j: usize) -> f64 {
        self.offset + j as f64 * self.cycle()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScheduledAverages {
    pub centers: Vec<f64>,
    /// Window means with the common mean removed; `None` where a window held no samples.
    pub averages: Vec<Option<f64>>,
}

/// Average `values` (sampled at `sampling_rate` Hz from t = 0) inside each
/// scheduled window `[start, start + window)`.
pub fn average_scheduled_windows(values: &[f64], schedule: &WindowSchedule, sampling_rate: f64) -> ScheduledAverages {
    let mut centers = Vec::with_capacity(schedule.count);
    let mut averages = Vec::with_capacity(schedule.count);

    for j in 0..schedule.count {
        let start = schedule.window_start(j);
        let end = start + schedule.window;
        centers.push(start + schedule.window / 2.0);

        let (sum, n) = values
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                let t = *i as f64 / sampling_rate;
                t >= start && t < end
            })
            .fold((0.0, 0usize), |(s, n), (_, v)| (s + v, n + 1));
        averages.push((n > 0).then(|| sum / n as f64));
    }

    let present: Vec<f64> = averages.iter().flatten().copied().collect();
    if !present.is_empty() {
        let mean = present.iter().sum::<f64>() / present.len() as f64;
        for a in averages.iter_mut().flatten() {
            *a -= mean;
        }
    }

    ScheduledAverages { centers, averages }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StagnationParams {
    pub window_ms: f64,
    pub std_dev_threshold: f64,
    pub wait_ms: f64,
    pub averaging_ms: f64,
}

impl Default for StagnationParams {
    fn default() -> Self {
        Self {
            window_ms: 1000.0,
            std_dev_threshold: 0.1,
            wait_ms: 50.0,
            averaging_ms: 200.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StagnantWindow {
    pub start_time: f64,
    pub end_time: f64,
    pub average: Option<f64>,
}

fn sample_std(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    Some(var.sqrt())
}

fn median_step(times: &[f64]) -> Option<f64> {
    let mut steps: Vec<f64> = times.windows(2).map(|w| w[1] - w[0]).collect();
    if steps.is_empty() {
        return None;
    }
    steps.sort_by(f64::total_cmp);
    let mid = steps.len() / 2;
    Some(if steps.len() % 2 == 0 {
        (steps[mid - 1] + steps[mid]) / 2.0
    } else {
        steps[mid]
    })
}

/// Number of samples covered by a `window_ms` sliding window.
pub fn window_samples(times_ms: &[f64], window_ms: f64) -> usize {
    match median_step(times_ms) {
        Some(step) if step > 0.0 => ((window_ms / step) as usize).max(1),
        Some(_) => 1,
        None => 10,
    }
}

/// Every sliding window whose sample standard deviation stays below the
/// threshold, averaged over `averaging_ms` after a `wait_ms` pause.
///
/// Overlapping windows are reported individually. `times_ms` must be sorted.
pub fn find_stagnant_windows(times_ms: &[f64], values: &[f64], params: &StagnationParams) -> Vec<StagnantWindow> {
    let n = times_ms.len().min(values.len());
    if n == 0 {
        return Vec::new();
    }
    let (times_ms, values) = (&times_ms[..n], &values[..n]);
    let size = window_samples(times_ms, params.window_ms);
    if size > n {
        return Vec::new();
    }

    let mut out = Vec::new();
    for i in 0..=n - size {
        let quiet = sample_std(&values[i..i + size]).is_some_and(|sd| sd < params.std_dev_threshold);
        if !quiet {
            continue;
        }
        let start_time = times_ms[i];
        let end_time = times_ms[i + size - 1];

        let avg_start = end_time + params.wait_ms;
        let avg_end = avg_start + params.averaging_ms;
        let Some(first) = times_ms.iter().position(|&t| t >= avg_start) else {
            continue;
        };
        let Some(last) = times_ms.iter().rposition(|&t| t <= avg_end) else {
            continue;
        };
        let average = (first <= last).then(|| {
            let slice = &values[first..=last];
            slice.iter().sum::<f64>() / slice.len() as f64
        });
        out.push(StagnantWindow { start_time, end_time, average });
    }
    log::debug!("Found {} stagnant windows of {size} samples", out.len());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_scheduled_windows() {
        // 10 Hz; windows [0.0, 0.5), [1.0, 1.5), [2.0, 2.5)
        let values: Vec<f64> = (0..30).map(|i| (i / 10) as f64).collect();
        let schedule = WindowSchedule { offset: 0.0, window: 0.5, movement: 0.5, count: 3 };
        let out = average_scheduled_windows(&values, &schedule, 10.0);
        assert_eq!(out.centers, vec![0.25, 1.25, 2.25]);
        let avgs: Vec<f64> = out.averages.iter().map(|a| a.unwrap()).collect();
        assert_abs_diff_eq!(avgs[0], -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(avgs[1], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(avgs[2], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_scheduled_window_past_end_is_empty() {
        let values = vec![1.0; 10];
        let schedule = WindowSchedule { offset: 0.0, window: 0.5, movement: 0.5, count: 2 };
        let out = average_scheduled_windows(&values, &schedule, 10.0);
        assert_eq!(out.averages, vec![Some(0.0), None]);
    }

    #[test]
    fn test_window_samples() {
        let times: Vec<f64> = (0..20).map(|i| i as f64 * 2.0).collect();
        assert_eq!(window_samples(&times, 10.0), 5);
        assert_eq!(window_samples(&times, 1.0), 1);
        assert_eq!(window_samples(&[3.0], 10.0), 10);
    }

    #[test]
    fn test_stagnant_windows() {
        // 1 ms steps: ramp for 10 ms, flat at 4.0 for 30 ms
        let times: Vec<f64> = (0..40).map(|i| i as f64).collect();
        let values: Vec<f64> = (0..40).map(|i| if i < 10 { i as f64 * 0.4 } else { 4.0 }).collect();
        let params = StagnationParams { window_ms: 5.0, std_dev_threshold: 0.01, wait_ms: 2.0, averaging_ms: 5.0 };
        let windows = find_stagnant_windows(&times, &values, &params);

        // Windows starting at 10..=35 are flat; the last two have nothing after the wait
        assert_eq!(windows.len(), 24);
        assert_eq!(windows[0].start_time, 10.0);
        assert_eq!(windows[0].end_time, 14.0);
        assert_eq!(windows[0].average, Some(4.0));
        assert!(windows.iter().all(|w| w.end_time + 2.0 <= 39.0));
    }

    #[test]
    fn test_single_sample_window_never_stagnant() {
        let times = vec![0.0, 10.0, 20.0];
        let values = vec![1.0, 1.0, 1.0];
        let params = StagnationParams { window_ms: 5.0, ..StagnationParams::default() };
        assert!(find_stagnant_windows(&times, &values, &params).is_empty());
    }
}
