//! Motion/dwell transition detection and cleanup.

pub mod clean;
pub mod detect;

pub use clean::PeakCleaner;
pub use detect::{find_peaks, PeakCriteria, TransitionDetector};
