use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::filters::Decimation;
use crate::processor::{Calibration, ProcessingEvent, ProcessingOutput, ProcessorConfig};
use crate::types::{Peak, ProcessedSeries, Stillstand};

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct RunCounts {
    pub samples: usize,
    pub transitions: usize,
    pub stillstands: usize,
    pub references: usize,
    pub overtravels: usize,
    /// Highest repetition reached (0 without stillstands).
    pub repetitions: u32,
    pub events: usize,
}

impl RunCounts {
    pub fn from_output(output: &ProcessingOutput) -> Self {
        Self {
            samples: output.series.len(),
            transitions: output.peaks.len(),
            stillstands: output.stillstands.len(),
            references: output.stillstands.iter().filter(|s| s.is_reference).count(),
            overtravels: output.stillstands.iter().filter(|s| s.is_overtravel).count(),
            repetitions: output.stillstands.iter().map(|s| s.repetition).max().unwrap_or(0),
            events: output.events.len(),
        }
    }
}

/// Everything one run produced, as written by the `stage_dwell` binary.
#[derive(Serialize, Clone, Debug)]
pub struct RunReport {
    pub source: String,
    pub generated_at: String,
    pub config: ProcessorConfig,
    pub calibration: Calibration,
    pub decimation: Decimation,
    pub counts: RunCounts,
    pub series: ProcessedSeries,
    pub peaks: Vec<Peak>,
    pub stillstands: Vec<Stillstand>,
    pub events: Vec<ProcessingEvent>,
}

impl RunReport {
    pub fn new(source: impl Into<String>, config: ProcessorConfig, output: ProcessingOutput) -> Self {
        Self {
            source: source.into(),
            generated_at: current_timestamp(),
            counts: RunCounts::from_output(&output),
            config,
            calibration: output.calibration,
            decimation: output.decimation,
            series: output.series,
            peaks: output.peaks,
            stillstands: output.stillstands,
            events: output.events,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = self.to_json()?;
        fs::write(path, json)?;
        Ok(())
    }
}

pub fn current_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
