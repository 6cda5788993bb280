//! Preprocessing filters applied to the canonical series before velocity
//! estimation: decimation, jump rejection and rotational unwrapping.

pub mod decimate;
pub mod jump;
pub mod unwrap;

pub use decimate::{downsample, Decimation};
pub use jump::JumpFilter;
pub use unwrap::{unwrap_period, unwrap_rotational};
