pub mod series;

pub use series::*;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProcessingError;

/// How the position channel should be interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    #[default]
    Linear,
    /// Degrees on a 360° circle; enables the unwrapper.
    Rotational,
}

impl Modality {
    pub fn is_rotational(self) -> bool {
        matches!(self, Modality::Rotational)
    }

    pub fn velocity_unit(self) -> &'static str {
        match self {
            Modality::Linear => "mm/s",
            Modality::Rotational => "deg/s",
        }
    }
}

impl FromStr for Modality {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(Modality::Linear),
            "rotational" | "rotary" => Ok(Modality::Rotational),
            other => Err(ProcessingError::InvalidConfig(format!(
                "unknown modality '{other}' (expected linear or rotational)"
            ))),
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Modality::Linear => write!(f, "linear"),
            Modality::Rotational => write!(f, "rotational"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time: f64,
    pub position_raw: f64,
    pub position: f64,
}

/// Candidate motion-boundary event.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    pub index: usize,
    pub time: f64,
    pub position: f64,
    pub velocity: f64,
}

/// Direction of travel around a dwell, serialized as +1 / -1 / 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum Direction {
    Forward,
    Backward,
    Overtravel,
}

impl Direction {
    /// Classify from the velocity at the peaks bounding a dwell.
    /// Anything other than two strictly same-signed velocities is overtravel.
    pub fn from_velocities(before: f64, after: f64) -> Self {
        if before > 0.0 && after > 0.0 {
            Direction::Forward
        } else if before < 0.0 && after < 0.0 {
            Direction::Backward
        } else {
            Direction::Overtravel
        }
    }

    pub fn is_overtravel(self) -> bool {
        matches!(self, Direction::Overtravel)
    }
}

impl From<Direction> for i8 {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Forward => 1,
            Direction::Backward => -1,
            Direction::Overtravel => 0,
        }
    }
}

impl TryFrom<i8> for Direction {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Direction::Forward),
            -1 => Ok(Direction::Backward),
            0 => Ok(Direction::Overtravel),
            other => Err(format!("invalid direction code {other}")),
        }
    }
}

/// Movement-phase descriptor at one of the peaks bounding a dwell.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhaseBoundary {
    pub index: usize,
    pub time: f64,
    pub position: f64,
    pub velocity: f64,
}

/// Dwell (stillstand) descriptor.
///
/// `start_idx..end_idx` is the half-open window the statistics were taken over;
/// `move_end` and `move_start` are the peaks that ended the previous move and
/// started the next one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stillstand {
    pub start_idx: usize,
    pub end_idx: usize,
    pub time_start: f64,
    pub time_end: f64,
    pub duration: f64,
    pub avg_position: f64,
    pub std_dev_position: f64,
    pub avg_velocity: f64,
    pub move_end: PhaseBoundary,
    pub move_start: PhaseBoundary,
    pub analysis_duration: f64,
    pub direction: Direction,
    pub repetition: u32,
    #[serde(rename = "overtravel_pos_bool")]
    pub is_overtravel: bool,
    #[serde(rename = "reference_pos_bool")]
    pub is_reference: bool,
}
