//! Closed-loop pointing for the two-axis laser mount.
//!
//! Builds on the `hardware::mount` driver:
//!
//! - [`session`]: locate and open the mount
//! - [`alignment`]: drive it to a target orientation and stop once both axes
//!   are within tolerance
//! - [`manual`]: open-loop step commands, sweep test, and calibration presets
//! - [`settle`]: injectable settle delays

pub mod alignment;
pub mod manual;
pub mod session;
pub mod settle;

pub use alignment::{
    AlignmentController, AlignmentError, AlignmentReport, AlignmentState, Backoff, CancelToken,
    CycleOutcome, RetryPolicy, ALIGNMENT_TOLERANCE_DEG,
};
pub use hardware::mount::Orientation;
pub use session::{connect_serial, start_session};
pub use settle::{RecordingSleeper, Sleeper, ThreadSleeper};
