//! Stillstand (dwell) extraction for precision positioning stages.
//!
//! A raw position recording runs through preprocessing (decimation, jump
//! rejection, rotational unwrap), velocity estimation with a self-calibrated
//! noise threshold, transition detection and cleanup, and finally dwell
//! segmentation. [`StageProcessor`] drives the whole chain; the stage modules
//! are public for callers that need a single step.

pub mod analysis;
pub mod error;
pub mod filters;
pub mod ingest;
pub mod io;
pub mod peaks;
pub mod processor;
pub mod report;
pub mod segmentation;
pub mod smoothing;
pub mod types;
pub mod velocity;

pub use error::{ProcessingError, Result};
pub use ingest::{PositionRecord, RawInput};
pub use processor::{process_signal, Calibration, ProcessingEvent, ProcessingOutput, ProcessorConfig, StageProcessor};
pub use report::RunReport;
pub use types::{Direction, Modality, Peak, ProcessedSeries, Stillstand};
