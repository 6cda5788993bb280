//! File formats around the processor: CSV column extraction, JSON(.gz) input
//! and CSV export of the three output tables.

use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};

use crate::error::{ProcessingError, Result};
use crate::ingest::RawInput;
use crate::processor::ProcessingOutput;
use crate::types::{Peak, ProcessedSeries, Stillstand};

/// CSV column chosen by header name or zero-based position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ColumnSelector {
    Name(String),
    Index(usize),
}

impl FromStr for ColumnSelector {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim().parse::<usize>() {
            Ok(i) => ColumnSelector::Index(i),
            Err(_) => ColumnSelector::Name(s.trim().to_string()),
        })
    }
}

impl std::fmt::Display for ColumnSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnSelector::Name(name) => write!(f, "'{name}'"),
            ColumnSelector::Index(i) => write!(f, "#{i}"),
        }
    }
}

/// Read one numeric column from CSV with a header row.
///
/// Header names are compared after trimming whitespace. Bytes that are not
/// UTF-8 (instrument exports are often Windows-1252) are decoded lossily, so
/// such headers are easier to select by index. Blank cells are skipped.
pub fn read_csv_column<R: Read>(reader: R, column: &ColumnSelector) -> Result<Vec<f64>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = reader
        .byte_headers()?
        .iter()
        .map(|h| String::from_utf8_lossy(h).trim().to_string())
        .collect();

    let col = match column {
        ColumnSelector::Index(i) if *i < headers.len() => *i,
        ColumnSelector::Name(name) => headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| ProcessingError::InvalidInput(format!("no column named '{name}' (have {headers:?})")))?,
        ColumnSelector::Index(i) => {
            return Err(ProcessingError::InvalidInput(format!(
                "column {i} out of range ({} columns)",
                headers.len()
            )))
        }
    };

    let mut values = Vec::new();
    for (row, record) in reader.byte_records().enumerate() {
        let record = record?;
        let Some(cell) = record.get(col) else {
            continue;
        };
        let cell = String::from_utf8_lossy(cell);
        let cell = cell.trim();
        if cell.is_empty() {
            continue;
        }
        let value = cell.parse::<f64>().map_err(|_| {
            ProcessingError::InvalidInput(format!("row {}: cannot parse '{cell}' in column {column}", row + 1))
        })?;
        values.push(value);
    }
    log::debug!("Read {} values from column {column}", values.len());
    Ok(values)
}

pub fn read_csv_file(path: &Path, column: &ColumnSelector) -> Result<Vec<f64>> {
    read_csv_column(BufReader::new(File::open(path)?), column)
}

pub fn read_json_reader<R: Read>(reader: R) -> Result<RawInput> {
    let value: serde_json::Value = serde_json::from_reader(reader)?;
    RawInput::from_json(&value)
}

/// Load a `.json` or `.json.gz` recording.
pub fn read_json_input(path: &Path) -> Result<RawInput> {
    let file = File::open(path)?;
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        read_json_reader(BufReader::new(GzDecoder::new(file)))
    } else {
        read_json_reader(BufReader::new(file))
    }
}

// ─── Table export ────────────────────────────────────────────────────────────

/// Flat stillstand row with the column names downstream tooling expects.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StillstandRow {
    pub still_start_idx: usize,
    pub still_end_idx: usize,
    pub still_time_start: f64,
    pub still_time_end: f64,
    pub still_duration: f64,
    pub avg_position: f64,
    pub std_dev_pos: f64,
    pub avg_velocity: f64,
    pub analysis_start_idx: usize,
    pub analysis_end_idx: usize,
    pub analysis_start_pos: f64,
    pub analysis_end_pos: f64,
    pub analysis_start_vel: f64,
    pub analysis_end_vel: f64,
    pub analysis_start_time: f64,
    pub analysis_end_time: f64,
    pub analysis_duration: f64,
    pub direction: i8,
    pub repetition: u32,
    pub overtravel_pos_bool: bool,
    pub reference_pos_bool: bool,
}

impl From<&Stillstand> for StillstandRow {
    fn from(s: &Stillstand) -> Self {
        Self {
            still_start_idx: s.start_idx,
            still_end_idx: s.end_idx,
            still_time_start: s.time_start,
            still_time_end: s.time_end,
            still_duration: s.duration,
            avg_position: s.avg_position,
            std_dev_pos: s.std_dev_position,
            avg_velocity: s.avg_velocity,
            analysis_start_idx: s.move_end.index,
            analysis_end_idx: s.move_start.index,
            analysis_start_pos: s.move_end.position,
            analysis_end_pos: s.move_start.position,
            analysis_start_vel: s.move_end.velocity,
            analysis_end_vel: s.move_start.velocity,
            analysis_start_time: s.move_end.time,
            analysis_end_time: s.move_start.time,
            analysis_duration: s.analysis_duration,
            direction: s.direction.into(),
            repetition: s.repetition,
            overtravel_pos_bool: s.is_overtravel,
            reference_pos_bool: s.is_reference,
        }
    }
}

fn write_rows<W: Write, T: Serialize>(writer: W, rows: impl IntoIterator<Item = T>) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_series_csv<W: Write>(writer: W, series: &ProcessedSeries) -> Result<()> {
    write_rows(writer, series.rows())
}

pub fn write_peaks_csv<W: Write>(writer: W, peaks: &[Peak]) -> Result<()> {
    write_rows(writer, peaks)
}

pub fn write_stillstands_csv<W: Write>(writer: W, stillstands: &[Stillstand]) -> Result<()> {
    write_rows(writer, stillstands.iter().map(StillstandRow::from))
}

/// Write `<stem>_series.csv`, `<stem>_peaks.csv` and `<stem>_stillstands.csv`
/// into `dir`, creating it if needed.
pub fn write_tables(dir: &Path, stem: &str, output: &ProcessingOutput) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let series_path = dir.join(format!("{stem}_series.csv"));
    let peaks_path = dir.join(format!("{stem}_peaks.csv"));
    let stillstands_path = dir.join(format!("{stem}_stillstands.csv"));

    write_series_csv(File::create(&series_path)?, &output.series)?;
    write_peaks_csv(File::create(&peaks_path)?, &output.peaks)?;
    write_stillstands_csv(File::create(&stillstands_path)?, &output.stillstands)?;

    log::info!("Wrote tables to {}", dir.display());
    Ok(vec![series_path, peaks_path, stillstands_path])
}
