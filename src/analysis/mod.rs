//! Post-processing of dwell positions: schedule-based window averages and
//! linearity/step-error checks.

pub mod linearity;
pub mod windows;

pub use linearity::{fit_line, linearity_residuals, step_deviation, stillstand_positions, DeviationMode, LineFit};
pub use windows::{average_scheduled_windows, find_stagnant_windows, StagnationParams, WindowSchedule};
