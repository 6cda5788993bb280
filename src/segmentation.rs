//! Stillstand segmentation: turns the cleaned transition list into dwell
//! windows with statistics and direction/repetition/reference classification.
//!
//! Transitions alternate between "motion ended" and "next motion started".
//! Instead of relying on even/odd positions in the peak list, a small phase
//! machine consumes them one at a time:
//!
//!   Moving --(peak: motion ended)--> Settling --(peak: motion starts)--> Moving
//!                                                 |
//!                                                 +-- dwell window closed
//!
//! Each closed dwell is trimmed by the settle margins and either emitted or
//! skipped when nothing valid is left.

use serde::{Deserialize, Serialize};

use crate::types::{Direction, ProcessedSeries, Stillstand};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SegmenterConfig {
    /// Settle-in margin before the next move (s).
    pub t_start: f64,
    /// Settle-out margin after the previous move (s).
    pub t_stop: f64,
    pub reference_tolerance: f64,
    /// Overtravel windows that make up one repetition.
    pub overtravels_per_repetition: u32,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            t_start: 0.05,
            t_stop: 0.05,
            reference_tolerance: 0.1,
            overtravels_per_repetition: 3,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegmenterPhase {
    /// Waiting for the transition that ends the current move.
    Moving,
    /// The stage has stopped after `move_end`; waiting for the next move.
    Settling { move_end: usize },
}

/// A bracketed dwell that produced no valid window.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SkippedWindow {
    pub pair: usize,
    pub move_end: usize,
    pub move_start: usize,
    pub start_idx: i64,
    pub end_idx: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SegmentOutcome {
    Emitted(Stillstand),
    Skipped(SkippedWindow),
}

pub struct StillstandSegmenter<'a> {
    series: &'a ProcessedSeries,
    dt: f64,
    config: SegmenterConfig,
    phase: SegmenterPhase,
    pair: usize,
    repetition: u32,
    overtravel_count: u32,
    ref_position: Option<f64>,
}

impl<'a> StillstandSegmenter<'a> {
    pub fn new(series: &'a ProcessedSeries, dt: f64, config: SegmenterConfig) -> Self {
        Self {
            series,
            dt,
            config,
            phase: SegmenterPhase::Moving,
            pair: 0,
            repetition: 1,
            overtravel_count: 0,
            ref_position: None,
        }
    }

    pub fn phase(&self) -> SegmenterPhase {
        self.phase
    }

    pub fn repetition(&self) -> u32 {
        self.repetition
    }

    pub fn overtravel_count(&self) -> u32 {
        self.overtravel_count
    }

    pub fn ref_position(&self) -> Option<f64> {
        self.ref_position
    }

    /// Consume the next transition (ascending index order).
    pub fn feed(&mut self, peak: usize) -> Option<SegmentOutcome> {
        match self.phase {
            SegmenterPhase::Moving => {
                self.phase = SegmenterPhase::Settling { move_end: peak };
                None
            }
            SegmenterPhase::Settling { move_end } => {
                self.phase = SegmenterPhase::Moving;
                let pair = self.pair;
                self.pair += 1;
                Some(self.close_dwell(pair, move_end, peak))
            }
        }
    }

    /// Settle-trimmed window `[start, end)` between two transitions.
    fn window(&self, move_end: usize, move_start: usize) -> (i64, i64) {
        let start = (move_end as f64 + self.config.t_stop / self.dt).trunc() as i64;
        let end = (move_start as f64 - self.config.t_start / self.dt).trunc() as i64;
        (start, end)
    }

    fn close_dwell(&mut self, pair: usize, move_end: usize, move_start: usize) -> SegmentOutcome {
        let (start, end) = self.window(move_end, move_start);
        let len = self.series.len() as i64;
        if start < 0 || start >= end || end >= len || move_start >= self.series.len() {
            log::debug!(
                "Skipping invalid stillstand window: pair {pair} ({move_end} -> {move_start}) -> [{start}:{end}] (len={len})"
            );
            return SegmentOutcome::Skipped(SkippedWindow {
                pair,
                move_end,
                move_start,
                start_idx: start,
                end_idx: end,
            });
        }
        let (start, end) = (start as usize, end as usize);

        let positions = self.series.position.slice(ndarray::s![start..end]);
        let velocities = self.series.velocity.slice(ndarray::s![start..end]);
        let count = positions.len() as f64;
        let avg_position = positions.sum() / count;
        let variance = positions.iter().map(|p| (p - avg_position).powi(2)).sum::<f64>() / count;
        let avg_velocity = velocities.sum() / count;

        let before = self.series.boundary_at(move_end);
        let after = self.series.boundary_at(move_start);
        let direction = Direction::from_velocities(before.velocity, after.velocity);

        if direction.is_overtravel() {
            self.overtravel_count += 1;
            if self.overtravel_count >= self.config.overtravels_per_repetition {
                self.repetition += 1;
                self.overtravel_count = 0;
                log::debug!("New repetition: {}", self.repetition);
            }
        }

        let is_reference = if pair == 1 {
            self.ref_position = Some(median(positions.iter().copied()));
            true
        } else {
            self.ref_position
                .map(|r| (avg_position - r).abs() < self.config.reference_tolerance)
                .unwrap_or(false)
        };
        if is_reference {
            log::debug!("Stillstand at {:.4} s marked as reference", self.series.time[start]);
        }

        SegmentOutcome::Emitted(Stillstand {
            start_idx: start,
            end_idx: end,
            time_start: self.series.time[start],
            time_end: self.series.time[end],
            duration: self.series.time[end] - self.series.time[start],
            avg_position,
            std_dev_position: variance.sqrt(),
            avg_velocity,
            move_end: before,
            move_start: after,
            analysis_duration: after.time - before.time,
            direction,
            repetition: self.repetition,
            is_overtravel: direction.is_overtravel(),
            is_reference,
        })
    }
}

fn median(values: impl Iterator<Item = f64>) -> f64 {
    let mut sorted: Vec<f64> = values.collect();
    if sorted.is_empty() {
        return f64::NAN;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Run the segmenter over a full transition list. Returns the emitted
/// stillstands and the windows that had to be skipped.
pub fn segment(
    series: &ProcessedSeries,
    peaks: &[usize],
    dt: f64,
    config: SegmenterConfig,
) -> (Vec<Stillstand>, Vec<SkippedWindow>) {
    let mut stillstands = Vec::new();
    let mut skipped = Vec::new();
    if peaks.len() < 2 {
        log::warn!("Not enough peaks to determine stillstand periods");
        return (stillstands, skipped);
    }

    let mut segmenter = StillstandSegmenter::new(series, dt, config);
    for &peak in peaks {
        match segmenter.feed(peak) {
            Some(SegmentOutcome::Emitted(s)) => stillstands.push(s),
            Some(SegmentOutcome::Skipped(w)) => skipped.push(w),
            None => {}
        }
    }
    (stillstands, skipped)
}
