//! Settle delays.
//!
//! Waiting for steppers to finish moving or a board to come out of reset is
//! routed through [`Sleeper`] so control loops can be run in tests without
//! real time passing.

use std::time::Duration;

/// Blocks the current control loop for a fixed duration.
pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

/// Sleeps the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Records requested delays instead of sleeping.
#[derive(Debug, Default, Clone)]
pub struct RecordingSleeper {
    pub sleeps: Vec<Duration>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of all recorded delays.
    pub fn total(&self) -> Duration {
        self.sleeps.iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&mut self, duration: Duration) {
        self.sleeps.push(duration);
    }
}
