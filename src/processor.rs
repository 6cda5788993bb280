// processor.rs: pure computation layer for stage dwell analysis
//
// Everything in this module is independent of:
//   - file formats (CSV / JSON / gzip)
//   - the command-line frontend and report writing
//
// It takes a raw position recording in and produces the processed series,
// the detected transitions, the stillstand table and a list of events out.
// A `StageProcessor` holds only its configuration; per-run calibration is
// returned with the output, so one processor can serve many threads.

use serde::{Deserialize, Serialize};

use crate::error::{ProcessingError, Result};
use crate::filters::{downsample, unwrap_rotational, Decimation, JumpFilter};
use crate::ingest::{normalize, RawInput};
use crate::peaks::{PeakCleaner, TransitionDetector};
use crate::segmentation::{segment, SegmenterConfig, SkippedWindow};
use crate::types::{CanonicalSeries, Modality, Peak, ProcessedSeries, Stillstand};
use crate::velocity::{check_velocity_limit, HighVelocity, VelocityEstimator};

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    // ── Acquisition ──
    pub sampling_rate_hz: f64,
    pub downsample_factor: usize,
    pub modality: Modality,

    // ── Calibration ──
    /// Reported as `v_th` until the estimator has run.
    pub v_th_seed: f64,
    pub median_window: usize,
    pub noise_gain: f64,

    // ── Settle margins (s) ──
    pub t_start: f64,
    pub t_stop: f64,

    // ── Jump rejection ──
    pub diff_threshold: f64,
    pub unwrap_threshold: f64,

    // ── Transition detection ──
    pub motion_gain: f64,
    pub height_gain: f64,
    pub distance_fraction: f64,
    pub prominence_fraction: f64,

    // ── Transition cleanup ──
    pub start_artifact_position: f64,
    pub settle_tolerance: f64,

    // ── Classification ──
    pub reference_tolerance: f64,
    pub overtravels_per_repetition: u32,

    // ── Sanity limits ──
    pub linear_velocity_limit: f64,
    pub rotational_velocity_limit: f64,

    /// Series at or below this length skip the pipeline.
    pub short_series_len: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            sampling_rate_hz: 520.833_333_33,
            downsample_factor: 1,
            modality: Modality::Linear,

            v_th_seed: 15.0,
            median_window: 5,
            noise_gain: 0.2,

            t_start: 0.05,
            t_stop: 0.05,

            diff_threshold: 5.0,
            unwrap_threshold: 355.0,

            motion_gain: 8.0,
            height_gain: 2.0,
            distance_fraction: 0.1,
            prominence_fraction: 0.2,

            start_artifact_position: 1.0,
            settle_tolerance: 0.1,

            reference_tolerance: 0.1,
            overtravels_per_repetition: 3,

            linear_velocity_limit: 3000.0,
            rotational_velocity_limit: 180.0,

            short_series_len: 7,
        }
    }
}

impl ProcessorConfig {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(ProcessingError::InvalidConfig(msg));

        if !(self.sampling_rate_hz.is_finite() && self.sampling_rate_hz > 0.0) {
            return invalid(format!("sampling_rate_hz must be positive, got {}", self.sampling_rate_hz));
        }
        if self.downsample_factor == 0 {
            return invalid("downsample_factor must be at least 1".into());
        }
        for (name, value) in [("t_start", self.t_start), ("t_stop", self.t_stop)] {
            if !(value.is_finite() && value >= 0.0) {
                return invalid(format!("{name} must be a non-negative number of seconds, got {value}"));
            }
        }
        if self.median_window == 0 || self.median_window % 2 == 0 {
            return invalid(format!("median_window must be odd, got {}", self.median_window));
        }
        if self.overtravels_per_repetition == 0 {
            return invalid("overtravels_per_repetition must be at least 1".into());
        }
        if self.diff_threshold < 0.0 || self.unwrap_threshold < 0.0 {
            return invalid("jump thresholds must be non-negative".into());
        }
        Ok(())
    }

    /// Sample interval before downsampling.
    pub fn base_interval(&self) -> f64 {
        1.0 / self.sampling_rate_hz
    }

    pub fn velocity_limit(&self) -> f64 {
        match self.modality {
            Modality::Linear => self.linear_velocity_limit,
            Modality::Rotational => self.rotational_velocity_limit,
        }
    }

    pub fn jump_filter(&self) -> JumpFilter {
        JumpFilter::new(self.diff_threshold, self.unwrap_threshold)
    }

    pub fn velocity_estimator(&self) -> VelocityEstimator {
        VelocityEstimator::new(self.median_window, self.noise_gain)
    }

    pub fn transition_detector(&self) -> TransitionDetector {
        TransitionDetector {
            motion_gain: self.motion_gain,
            height_gain: self.height_gain,
            distance_fraction: self.distance_fraction,
            prominence_fraction: self.prominence_fraction,
        }
    }

    pub fn peak_cleaner(&self) -> PeakCleaner {
        PeakCleaner {
            start_artifact_position: self.start_artifact_position,
            settle_tolerance: self.settle_tolerance,
        }
    }

    pub fn segmenter_config(&self) -> SegmenterConfig {
        SegmenterConfig {
            t_start: self.t_start,
            t_stop: self.t_stop,
            reference_tolerance: self.reference_tolerance,
            overtravels_per_repetition: self.overtravels_per_repetition,
        }
    }
}

// ─── Events ──────────────────────────────────────────────────────────────────

/// Non-fatal conditions met while processing a recording.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProcessingEvent {
    EmptyInput,
    ShortSeries { len: usize, min_len: usize },
    DecimationDegraded { factor: usize, reason: String },
    SamplesDropped { dropped: usize, retained: usize },
    EmptyAfterPreprocessing,
    TooFewSamples { len: usize },
    HighVelocity(HighVelocity),
    NonPositiveDt { dt: f64 },
    PeaksCleaned { detected: usize, kept: usize },
    WindowSkipped(SkippedWindow),
}

// ─── Output ──────────────────────────────────────────────────────────────────

/// Per-run calibration values.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Effective sample interval (s).
    pub dt: f64,
    pub v_th: f64,
    pub v_th_seed: f64,
    /// RMS of the smoothed velocity; zero when the estimator did not run.
    pub rms_velocity: f64,
    pub self_calibrated: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProcessingOutput {
    pub series: ProcessedSeries,
    pub peaks: Vec<Peak>,
    pub stillstands: Vec<Stillstand>,
    pub calibration: Calibration,
    pub decimation: Decimation,
    pub events: Vec<ProcessingEvent>,
}

impl ProcessingOutput {
    pub fn has_event(&self, pred: impl Fn(&ProcessingEvent) -> bool) -> bool {
        self.events.iter().any(pred)
    }
}

// ─── The processor ───────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct StageProcessor {
    config: ProcessorConfig,
}

/// Mutable state of a single `process` call.
struct Run {
    calibration: Calibration,
    decimation: Decimation,
    events: Vec<ProcessingEvent>,
}

impl Run {
    fn finish(self, series: ProcessedSeries, peaks: Vec<Peak>, stillstands: Vec<Stillstand>) -> ProcessingOutput {
        ProcessingOutput {
            series,
            peaks,
            stillstands,
            calibration: self.calibration,
            decimation: self.decimation,
            events: self.events,
        }
    }

    fn bail(self, series: ProcessedSeries) -> ProcessingOutput {
        self.finish(series, Vec::new(), Vec::new())
    }
}

impl StageProcessor {
    pub fn new(config: ProcessorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Run the full pipeline on one recording.
    ///
    /// Only malformed records are errors. Everything else that prevents a
    /// complete analysis (too few samples, failed decimation, no transitions)
    /// is reported through `events` with whatever partial output exists.
    pub fn process(&self, input: impl Into<RawInput>) -> Result<ProcessingOutput> {
        let input = input.into();
        let base_dt = self.config.base_interval();
        let mut run = Run {
            calibration: Calibration {
                dt: base_dt,
                v_th: self.config.v_th_seed,
                v_th_seed: self.config.v_th_seed,
                rms_velocity: 0.0,
                self_calibrated: false,
            },
            decimation: Decimation::Passthrough,
            events: Vec::new(),
        };

        if input.is_empty() {
            log::error!("No position samples in input");
            run.events.push(ProcessingEvent::EmptyInput);
            return Ok(run.bail(ProcessedSeries::default()));
        }

        let canonical = normalize(input)?;
        if canonical.len() <= self.config.short_series_len {
            log::warn!(
                "Only {} samples (need more than {}); skipping analysis",
                canonical.len(),
                self.config.short_series_len
            );
            run.events.push(ProcessingEvent::ShortSeries {
                len: canonical.len(),
                min_len: self.config.short_series_len + 1,
            });
            return Ok(run.bail(ProcessedSeries::on_grid(canonical, base_dt)));
        }

        let mut series = self.preprocess(canonical, &mut run);
        if series.is_empty() {
            log::error!("No samples left after preprocessing");
            run.events.push(ProcessingEvent::EmptyAfterPreprocessing);
            return Ok(run.bail(series));
        }
        let dt = run.calibration.dt;

        if series.len() <= 1 {
            log::warn!("Not enough samples to estimate velocity");
            run.events.push(ProcessingEvent::TooFewSamples { len: series.len() });
            return Ok(run.bail(series));
        }

        // ── Velocity and self-calibration ──
        let estimate = self.config.velocity_estimator().estimate(series.position.view(), dt);
        series.velocity = estimate.velocity;
        run.calibration.v_th = estimate.v_th;
        run.calibration.rms_velocity = estimate.rms;
        run.calibration.self_calibrated = true;
        log::info!("Calibrated v_th = {:.4} {}", estimate.v_th, self.config.modality.velocity_unit());

        if let Some(high) = check_velocity_limit(
            series.time.view(),
            series.velocity.view(),
            self.config.velocity_limit(),
            self.config.modality.velocity_unit(),
        ) {
            run.events.push(ProcessingEvent::HighVelocity(high));
        }

        if !(dt > 0.0) {
            log::warn!("Non-positive sample interval {dt}; skipping transition detection");
            run.events.push(ProcessingEvent::NonPositiveDt { dt });
            return Ok(run.bail(series));
        }

        // ── Transitions ──
        let detected = self.config.transition_detector().detect(
            series.velocity.view(),
            estimate.v_th,
            self.config.t_stop,
            dt,
        );
        let detected_count = detected.len();
        let transitions = self.config.peak_cleaner().clean(series.position.view(), detected);
        if transitions.len() != detected_count {
            run.events.push(ProcessingEvent::PeaksCleaned {
                detected: detected_count,
                kept: transitions.len(),
            });
        }

        // ── Stillstands ──
        let (stillstands, skipped) = segment(&series, &transitions, dt, self.config.segmenter_config());
        run.events.extend(skipped.into_iter().map(ProcessingEvent::WindowSkipped));

        log::info!(
            "Processed {} samples: {} transitions, {} stillstands",
            series.len(),
            transitions.len(),
            stillstands.len()
        );

        let peaks = transitions.iter().map(|&i| series.peak_at(i)).collect();
        Ok(run.finish(series, peaks, stillstands))
    }

    /// Downsample, reject jumps, unwrap, then attach the time grid. Sets the
    /// effective `dt` on the run's calibration.
    fn preprocess(&self, canonical: CanonicalSeries, run: &mut Run) -> ProcessedSeries {
        let (canonical, decimation) = downsample(canonical, self.config.downsample_factor);
        if let Decimation::Degraded { factor, reason } = &decimation {
            run.events.push(ProcessingEvent::DecimationDegraded {
                factor: *factor,
                reason: reason.clone(),
            });
        }
        let dt_eff = self.config.base_interval() * decimation.effective_factor() as f64;
        run.decimation = decimation;

        let (mut canonical, dropped) = self.config.jump_filter().apply(&canonical);
        if dropped > 0 {
            log::info!("Dropped {dropped} samples with implausible jumps");
            run.events.push(ProcessingEvent::SamplesDropped {
                dropped,
                retained: canonical.len(),
            });
        }

        if self.config.modality.is_rotational() {
            unwrap_rotational(&mut canonical);
        }

        let series = ProcessedSeries::on_grid(canonical, dt_eff);
        run.calibration.dt = series.mean_dt(dt_eff);
        series
    }
}

// ─── Utility ─────────────────────────────────────────────────────────────────

/// One-shot convenience wrapper around [`StageProcessor`].
pub fn process_signal(input: impl Into<RawInput>, config: ProcessorConfig) -> Result<ProcessingOutput> {
    StageProcessor::new(config)?.process(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::PositionRecord;
    use crate::types::Direction;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    const DWELL: usize = 100;
    const RAMP: usize = 50;
    const STEP: f64 = 0.25;

    /// Dwell, then one S-curve move per sign, each followed by another dwell.
    fn staircase(signs: &[f64], base: f64) -> Vec<f64> {
        let mut out = vec![base; DWELL];
        let mut level = base;
        for &sign in signs {
            let step = STEP * sign;
            for j in 1..=RAMP {
                out.push(level + step * (1.0 - (PI * j as f64 / RAMP as f64).cos()) / 2.0);
            }
            level += step;
            out.extend(std::iter::repeat(level).take(DWELL));
        }
        out
    }

    /// `dwells` flat levels joined by constant-velocity ramps.
    fn linear_staircase(dwells: usize) -> Vec<f64> {
        let mut out = vec![0.0; DWELL];
        let mut level = 0.0;
        for _ in 1..dwells {
            out.extend((1..=RAMP).map(|j| level + STEP * j as f64 / RAMP as f64));
            level += STEP;
            out.extend(std::iter::repeat(level).take(DWELL));
        }
        out
    }

    fn tight_margins() -> ProcessorConfig {
        ProcessorConfig { t_start: 0.02, t_stop: 0.02, ..ProcessorConfig::default() }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(ProcessorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_configs_rejected() {
        let bad = [
            ProcessorConfig { sampling_rate_hz: 0.0, ..ProcessorConfig::default() },
            ProcessorConfig { downsample_factor: 0, ..ProcessorConfig::default() },
            ProcessorConfig { t_start: -0.1, ..ProcessorConfig::default() },
            ProcessorConfig { t_stop: f64::NAN, ..ProcessorConfig::default() },
            ProcessorConfig { median_window: 4, ..ProcessorConfig::default() },
            ProcessorConfig { overtravels_per_repetition: 0, ..ProcessorConfig::default() },
        ];
        for config in bad {
            assert!(matches!(StageProcessor::new(config), Err(ProcessingError::InvalidConfig(_))));
        }
    }

    #[test]
    fn test_partial_config_json_uses_defaults() {
        let config: ProcessorConfig =
            serde_json::from_str(r#"{"modality": "rotational", "t_start": 0.1}"#).unwrap();
        assert_eq!(config.modality, Modality::Rotational);
        assert_eq!(config.t_start, 0.1);
        assert_eq!(config.t_stop, 0.05);
        assert_eq!(config.velocity_limit(), 180.0);
    }

    #[test]
    fn test_empty_input() {
        let out = process_signal(Vec::<f64>::new(), ProcessorConfig::default()).unwrap();
        assert!(out.series.is_empty());
        assert!(out.peaks.is_empty());
        assert!(out.stillstands.is_empty());
        assert_eq!(out.events, vec![ProcessingEvent::EmptyInput]);
    }

    #[test]
    fn test_short_series_skips_pipeline() {
        let config = ProcessorConfig { v_th_seed: 12.0, ..ProcessorConfig::default() };
        let out = process_signal(vec![1.0, 2.0, 3.0, 4.0, 5.0], config).unwrap();
        assert_eq!(out.series.len(), 5);
        assert_abs_diff_eq!(out.series.time[1], 1.0 / 520.833_333_33, epsilon = 1e-12);
        assert!(out.series.velocity.iter().all(|v| *v == 0.0));
        assert_eq!(out.calibration.v_th, 12.0);
        assert!(!out.calibration.self_calibrated);
        assert!(out.peaks.is_empty());
        assert!(out.stillstands.is_empty());
        assert!(out.has_event(|e| matches!(e, ProcessingEvent::ShortSeries { len: 5, .. })));
    }

    #[test]
    fn test_missing_position_is_an_error() {
        let records = vec![PositionRecord::position(1.0), PositionRecord::default()];
        let err = process_signal(records, ProcessorConfig::default()).unwrap_err();
        assert!(matches!(err, ProcessingError::MissingPosition { index: 1 }));
    }

    #[test]
    fn test_constant_input_has_no_transitions() {
        let out = process_signal(vec![3.0; 500], ProcessorConfig::default()).unwrap();
        assert_eq!(out.calibration.v_th, 0.0);
        assert!(out.calibration.self_calibrated);
        assert!(out.peaks.is_empty());
        assert!(out.stillstands.is_empty());
    }

    #[test]
    fn test_time_grid_is_uniform() {
        let out = process_signal(staircase(&[1.0, 1.0], 0.0), ProcessorConfig::default()).unwrap();
        let dt = out.calibration.dt;
        assert_abs_diff_eq!(dt, 1.0 / 520.833_333_33, epsilon = 1e-12);
        for w in out.series.time.windows(2) {
            assert!(w[1] > w[0]);
            assert_abs_diff_eq!(w[1] - w[0], dt, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_spikes_are_dropped() {
        let mut signal = vec![2.0; 40];
        signal[10] = 50.0;
        let out = process_signal(signal, ProcessorConfig::default()).unwrap();
        // The spike and the sample returning from it
        assert_eq!(out.series.len(), 38);
        assert!(out.series.position_raw.iter().all(|p| *p == 2.0));
        assert!(out.has_event(|e| *e == ProcessingEvent::SamplesDropped { dropped: 2, retained: 38 }));
    }

    #[test]
    fn test_high_velocity_reported() {
        let config = ProcessorConfig { sampling_rate_hz: 1000.0, ..ProcessorConfig::default() };
        let ramp: Vec<f64> = (0..200).map(|i| i as f64 * 4.0).collect();
        let out = process_signal(ramp, config).unwrap();
        assert!(out.has_event(|e| matches!(e, ProcessingEvent::HighVelocity(h) if h.max_abs > 3000.0)));
    }

    #[test]
    fn test_forward_staircase() {
        let out = process_signal(staircase(&[1.0; 11], 0.0), tight_margins()).unwrap();

        // The leading transition sits below the start-artifact position
        assert_eq!(out.peaks.len(), 20);
        assert!(out.has_event(|e| *e == ProcessingEvent::PeaksCleaned { detected: 22, kept: 20 }));
        assert_eq!(out.stillstands.len(), 10);

        for (k, s) in out.stillstands.iter().enumerate() {
            assert_abs_diff_eq!(s.avg_position, STEP * (k + 1) as f64, epsilon = 1e-3);
            assert_abs_diff_eq!(s.duration, DWELL as f64 * out.calibration.dt, epsilon = 0.01);
            assert_eq!(s.direction, Direction::Forward);
            assert_eq!(s.repetition, 1);
            assert!(!s.is_overtravel);
            assert_eq!(s.is_reference, k == 1);
            assert!(s.move_end.index < s.start_idx);
            assert!(s.end_idx < s.move_start.index);
        }
    }

    #[test]
    fn test_linear_ramps_lose_most_dwells() {
        // Velocity corners at both ends of every ramp break the pairing of
        // move ends with move starts, so most dwells are lost.
        for config in [ProcessorConfig::default(), tight_margins()] {
            let out = process_signal(linear_staircase(10), config).unwrap();
            assert!(out.stillstands.len() >= 3);
            assert!(out.stillstands.len() < 10);

            for (s, expected) in out.stillstands.iter().zip([0.75, 1.25, 1.75]) {
                assert_abs_diff_eq!(s.avg_position, expected, epsilon = 0.01);
            }
            for s in &out.stillstands {
                let level = s.avg_position / STEP;
                assert_abs_diff_eq!(level, level.round(), epsilon = 0.05);
                assert_eq!(s.direction, Direction::Forward);
            }
        }
    }

    #[test]
    fn test_reversals_count_repetitions() {
        let signs = [1.0, 1.0, -1.0, -1.0, 1.0, 1.0, -1.0, -1.0, 1.0, 1.0, -1.0];
        let out = process_signal(staircase(&signs, 10.0), tight_margins()).unwrap();
        assert_eq!(out.stillstands.len(), 10);

        use Direction::*;
        let directions: Vec<Direction> = out.stillstands.iter().map(|s| s.direction).collect();
        assert_eq!(
            directions,
            vec![Forward, Overtravel, Backward, Overtravel, Forward, Overtravel, Backward, Overtravel, Forward, Overtravel]
        );

        let repetitions: Vec<u32> = out.stillstands.iter().map(|s| s.repetition).collect();
        assert_eq!(repetitions, vec![1, 1, 1, 1, 1, 2, 2, 2, 2, 2]);

        let references: Vec<usize> = out
            .stillstands
            .iter()
            .enumerate()
            .filter_map(|(k, s)| s.is_reference.then_some(k))
            .collect();
        assert_eq!(references, vec![1, 5, 9]);
    }

    #[test]
    fn test_rotational_wraparound() {
        let config = ProcessorConfig { modality: Modality::Rotational, ..tight_margins() };
        let wrapped: Vec<f64> = staircase(&[1.0; 11], 359.5)
            .into_iter()
            .map(|v| v.rem_euclid(360.0))
            .collect();
        let out = process_signal(wrapped, config).unwrap();

        assert_abs_diff_eq!(out.series.position_raw[0], -0.5, epsilon = 1e-12);
        for w in out.series.position.windows(2) {
            assert!((w[1] - w[0]).abs() < 1.0);
        }
        assert!(!out.has_event(|e| matches!(e, ProcessingEvent::HighVelocity(_))));
        assert_eq!(out.stillstands.len(), 10);
        for (k, s) in out.stillstands.iter().enumerate() {
            assert_abs_diff_eq!(s.avg_position, -0.25 + STEP * k as f64, epsilon = 1e-3);
            assert_eq!(s.direction, Direction::Forward);
        }
    }

    #[test]
    fn test_downsampled_up_and_down() {
        let config = ProcessorConfig { downsample_factor: 2, ..tight_margins() };
        let mut signs = vec![1.0; 6];
        signs.extend([-1.0; 6]);
        let out = process_signal(staircase(&signs, 0.0), config).unwrap();

        assert_eq!(
            out.decimation,
            Decimation::Decimated { factor: 2, len_before: 1900, len_after: 950 }
        );
        assert_abs_diff_eq!(out.calibration.dt, 2.0 / 520.833_333_33, epsilon = 1e-9);
        assert_eq!(out.stillstands.len(), 11);

        let directions: Vec<Direction> = out.stillstands.iter().map(|s| s.direction).collect();
        assert_eq!(&directions[..5], &[Direction::Forward; 5]);
        assert_eq!(directions[5], Direction::Overtravel);
        assert_eq!(&directions[6..], &[Direction::Backward; 5]);
        assert_abs_diff_eq!(out.stillstands[5].avg_position, 1.5, epsilon = 5e-3);
        assert!(out.stillstands[1].is_reference);
        assert!(out.stillstands[9].is_reference);
    }

    #[test]
    fn test_processor_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<StageProcessor>();

        let processor = std::sync::Arc::new(StageProcessor::new(tight_margins()).unwrap());
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let p = processor.clone();
                std::thread::spawn(move || p.process(staircase(&[1.0; 11], 0.0)).unwrap().stillstands.len())
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), 10);
        }
    }
}
