//! Closed-loop alignment of the laser mount.
//!
//! The controller repeatedly samples the mount's orientation and, until both
//! axes are within [`ALIGNMENT_TOLERANCE_DEG`] of the target, republishes the
//! absolute target and waits for the steppers to settle:
//!
//! ```text
//!            no sample
//!           ┌─────────┐
//!           ▼         │
//!  ──► Measuring ─────┘
//!           │ sample
//!           ▼
//!      Evaluating ──── both axes < 0.5° ───► Aligned
//!           │ otherwise
//!           ▼
//!      Correcting ── send target, settle ──► Measuring
//! ```
//!
//! The controller never computes steps or deltas. The firmware turns the
//! target into motor steps, so each correction carries exactly the same line.
//!
//! Failed samples (timeouts, garbled lines) keep the loop in `Measuring`.
//! How often that may happen and how long to wait between attempts is set by
//! [`RetryPolicy`]; the default retries immediately and forever. A
//! [`CancelToken`] is checked at the top of every measuring cycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hardware::mount::{LineTransport, MountDevice, MountError, Orientation, Reading};
use thiserror::Error;
use tracing::{debug, info};

use crate::settle::{Sleeper, ThreadSleeper};

/// Maximum per-axis error, in degrees, for the mount to count as aligned.
pub const ALIGNMENT_TOLERANCE_DEG: f64 = 0.5;

/// Time given to the steppers after each correction.
pub const CORRECTION_SETTLE: Duration = Duration::from_secs(1);

/// Errors that end an alignment run without reaching the target.
#[derive(Error, Debug)]
pub enum AlignmentError {
    /// Transport failure mid-session. The controller does not reconnect.
    #[error("Mount communication failed: {0}")]
    Mount(#[from] MountError),

    /// The cancel token was tripped.
    #[error("Alignment cancelled after {cycles} cycles")]
    Cancelled { cycles: u64 },

    /// Too many consecutive reads without a valid sample.
    #[error("No valid sample after {attempts} attempts (last: {last:?})")]
    RetriesExhausted { attempts: u32, last: Reading },
}

/// Shared flag for stopping a running alignment from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Wait inserted after a failed read.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Backoff {
    /// Retry immediately.
    #[default]
    None,
    /// Wait the same time after every failure.
    Fixed(Duration),
    /// Double the wait after each consecutive failure, up to `max`.
    Exponential { initial: Duration, max: Duration },
}

impl Backoff {
    /// Delay before the next read after `failures` consecutive failures.
    pub fn delay(&self, failures: u32) -> Option<Duration> {
        match *self {
            Backoff::None => None,
            Backoff::Fixed(delay) => Some(delay),
            Backoff::Exponential { initial, max } => {
                let factor = 1u32
                    .checked_shl(failures.saturating_sub(1))
                    .unwrap_or(u32::MAX);
                Some(initial.saturating_mul(factor).min(max))
            }
        }
    }
}

/// What to do when a read yields no valid sample.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RetryPolicy {
    /// Give up after this many consecutive failed reads; `None` retries forever
    pub max_attempts: Option<u32>,
    /// Wait between failed reads
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Retry forever without waiting.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Give up after `max_attempts` consecutive failed reads.
    ///
    /// Every cycle performs at least one read, so 0 is raised to 1.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts.max(1));
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    fn exhausted(&self, failures: u32) -> bool {
        self.max_attempts.is_some_and(|max| failures >= max)
    }
}

/// Controller states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignmentState {
    Measuring,
    Evaluating,
    Correcting,
    Aligned,
}

/// Per-axis error of one sample against the target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub yaw_error: f64,
    pub pitch_error: f64,
}

impl Evaluation {
    pub fn new(measured: &Orientation, target: &Orientation) -> Self {
        let (yaw_error, pitch_error) = measured.abs_error(target);
        Self {
            yaw_error,
            pitch_error,
        }
    }

    /// True only when both axes are inside the tolerance.
    pub fn is_aligned(&self) -> bool {
        self.yaw_error < ALIGNMENT_TOLERANCE_DEG && self.pitch_error < ALIGNMENT_TOLERANCE_DEG
    }
}

/// Result of one measuring cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The read produced no sample; nothing was evaluated or sent.
    NoSample(Reading),
    /// Out of tolerance; the target was sent and the settle delay observed.
    Corrected {
        measured: Orientation,
        evaluation: Evaluation,
    },
    /// Both axes inside tolerance.
    Aligned { measured: Orientation },
}

/// Mutable state of one alignment run.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentSession {
    target: Orientation,
    state: AlignmentState,
    measured: Option<Orientation>,
    aligned: bool,
    cycles: u64,
    corrections: u64,
    failed_reads: u64,
    consecutive_failures: u32,
}

impl AlignmentSession {
    fn new(target: Orientation) -> Self {
        Self {
            target,
            state: AlignmentState::Measuring,
            measured: None,
            aligned: false,
            cycles: 0,
            corrections: 0,
            failed_reads: 0,
            consecutive_failures: 0,
        }
    }

    pub fn target(&self) -> Orientation {
        self.target
    }

    pub fn state(&self) -> AlignmentState {
        self.state
    }

    /// Most recent valid sample.
    pub fn measured(&self) -> Option<Orientation> {
        self.measured
    }

    pub fn is_aligned(&self) -> bool {
        self.aligned
    }

    /// Measuring cycles started, including failed reads.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Correction commands sent.
    pub fn corrections(&self) -> u64 {
        self.corrections
    }

    /// Reads that produced no valid sample.
    pub fn failed_reads(&self) -> u64 {
        self.failed_reads
    }

    /// Failed reads since the last valid sample.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

/// Summary of a completed alignment.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentReport {
    pub target: Orientation,
    pub final_orientation: Orientation,
    pub cycles: u64,
    pub corrections: u64,
    pub failed_reads: u64,
}

/// Drives the mount toward a fixed target until both axes are in tolerance.
///
/// # Example
///
/// ```no_run
/// use hardware::mount::{MountDevice, Orientation, SerialConnection, BAUD_RATE, RESET_SETTLE};
/// use pointing::alignment::{AlignmentController, CancelToken};
/// use std::time::Duration;
///
/// let conn = SerialConnection::open("/dev/ttyACM0", BAUD_RATE, Duration::ZERO)?;
/// std::thread::sleep(RESET_SETTLE);
///
/// let mut controller = AlignmentController::new(MountDevice::new(conn), Orientation::new(0.0, 0.0));
/// let report = controller.run(&CancelToken::new())?;
/// println!("Aligned at {} after {} corrections", report.final_orientation, report.corrections);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct AlignmentController<T, S = ThreadSleeper> {
    device: MountDevice<T>,
    session: AlignmentSession,
    retry: RetryPolicy,
    settle: Duration,
    sleeper: S,
}

impl<T: LineTransport> AlignmentController<T> {
    /// Controller with the default retry policy and a real-time settle delay.
    pub fn new(device: MountDevice<T>, target: Orientation) -> Self {
        Self::with_sleeper(device, target, ThreadSleeper)
    }
}

impl<T: LineTransport, S: Sleeper> AlignmentController<T, S> {
    pub fn with_sleeper(device: MountDevice<T>, target: Orientation, sleeper: S) -> Self {
        Self {
            device,
            session: AlignmentSession::new(target),
            retry: RetryPolicy::default(),
            settle: CORRECTION_SETTLE,
            sleeper,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Override the post-correction settle delay.
    pub fn with_settle_delay(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn session(&self) -> &AlignmentSession {
        &self.session
    }

    pub fn device(&self) -> &MountDevice<T> {
        &self.device
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    /// Release the device.
    pub fn into_device(self) -> MountDevice<T> {
        self.device
    }

    /// Run one measuring cycle.
    ///
    /// Once aligned this returns [`CycleOutcome::Aligned`] again without
    /// touching the transport.
    ///
    /// # Errors
    ///
    /// Only transport failures are errors; a missing or malformed sample is
    /// [`CycleOutcome::NoSample`].
    pub fn step(&mut self) -> Result<CycleOutcome, MountError> {
        if self.session.aligned {
            if let Some(measured) = self.session.measured {
                return Ok(CycleOutcome::Aligned { measured });
            }
        }

        self.session.state = AlignmentState::Measuring;
        self.session.cycles += 1;

        let reading = self.device.read_orientation()?;
        let measured = match reading.orientation() {
            Some(measured) => measured,
            None => {
                self.session.failed_reads += 1;
                self.session.consecutive_failures += 1;
                return Ok(CycleOutcome::NoSample(reading));
            }
        };

        self.session.consecutive_failures = 0;
        self.session.measured = Some(measured);
        self.session.state = AlignmentState::Evaluating;
        info!("Current yaw: {}°, pitch: {}°", measured.yaw, measured.pitch);

        let evaluation = Evaluation::new(&measured, &self.session.target);
        if evaluation.is_aligned() {
            self.session.state = AlignmentState::Aligned;
            self.session.aligned = true;
            info!("Laser aligned at {measured}");
            return Ok(CycleOutcome::Aligned { measured });
        }

        self.session.state = AlignmentState::Correcting;
        debug!(
            "Off target by yaw={:.3}°, pitch={:.3}°, sending {}",
            evaluation.yaw_error, evaluation.pitch_error, self.session.target
        );
        self.device.send_target(&self.session.target)?;
        self.session.corrections += 1;
        self.sleeper.sleep(self.settle);
        self.session.state = AlignmentState::Measuring;

        Ok(CycleOutcome::Corrected {
            measured,
            evaluation,
        })
    }

    /// Loop until aligned.
    ///
    /// # Errors
    ///
    /// - [`AlignmentError::Cancelled`] if `cancel` is tripped
    /// - [`AlignmentError::RetriesExhausted`] if the retry policy gives up
    /// - [`AlignmentError::Mount`] on transport failure
    pub fn run(&mut self, cancel: &CancelToken) -> Result<AlignmentReport, AlignmentError> {
        info!("Aligning to {}", self.session.target);

        loop {
            if cancel.is_cancelled() {
                info!("Alignment cancelled");
                return Err(AlignmentError::Cancelled {
                    cycles: self.session.cycles,
                });
            }

            match self.step()? {
                CycleOutcome::Aligned { measured } => {
                    return Ok(AlignmentReport {
                        target: self.session.target,
                        final_orientation: measured,
                        cycles: self.session.cycles,
                        corrections: self.session.corrections,
                        failed_reads: self.session.failed_reads,
                    });
                }
                CycleOutcome::Corrected { .. } => {}
                CycleOutcome::NoSample(reading) => {
                    let failures = self.session.consecutive_failures;
                    if self.retry.exhausted(failures) {
                        return Err(AlignmentError::RetriesExhausted {
                            attempts: failures,
                            last: reading,
                        });
                    }
                    if let Some(delay) = self.retry.backoff.delay(failures) {
                        self.sleeper.sleep(delay);
                    }
                }
            }
        }
    }
}
