//! High-level driver for the two-axis laser mount.
//!
//! Wraps a [`LineTransport`] and exposes the mount's commands as typed
//! methods. Orientation reads never fail because of bad data: a timeout or a
//! garbled line comes back as a [`Reading`] variant, and only transport
//! failures are reported as errors.

use tracing::{debug, warn};

use super::error::{MountError, MountResult};
use super::protocol::{
    correction_command, is_pong, parse_sample, step_command, Orientation, SampleError, GET_MPU,
    PING,
};
use super::transport::LineTransport;

/// Outcome of one orientation request.
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    /// A well-formed `MPU:` sample.
    Valid(Orientation),
    /// Nothing arrived before the read timed out.
    NoData,
    /// Something arrived but it was not a valid sample.
    Malformed(SampleError),
}

impl Reading {
    /// Classify one received line.
    pub fn from_line(line: &str) -> Self {
        if line.trim().is_empty() {
            return Reading::NoData;
        }
        match parse_sample(line) {
            Ok(orientation) => Reading::Valid(orientation),
            Err(e) => Reading::Malformed(e),
        }
    }

    /// The sample, if this reading carried one.
    pub fn orientation(&self) -> Option<Orientation> {
        match self {
            Reading::Valid(orientation) => Some(*orientation),
            _ => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Reading::Valid(_))
    }
}

/// The laser mount controller on the far side of a line transport.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use hardware::mount::{MountDevice, Orientation, SerialConnection, BAUD_RATE, RESET_SETTLE};
///
/// let conn = SerialConnection::open("/dev/ttyACM0", BAUD_RATE, Duration::from_secs(1))?;
/// std::thread::sleep(RESET_SETTLE);
///
/// let mut mount = MountDevice::new(conn);
/// if let Some(orientation) = mount.read_orientation()?.orientation() {
///     println!("Pointing at {orientation}");
/// }
/// mount.send_target(&Orientation::new(0.0, 0.0))?;
/// # Ok::<(), hardware::mount::MountError>(())
/// ```
pub struct MountDevice<T> {
    transport: T,
}

impl<T: LineTransport> MountDevice<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Request one orientation sample.
    ///
    /// # Errors
    ///
    /// Only transport I/O failures are errors. Timeouts and garbled replies
    /// are returned as [`Reading::NoData`] and [`Reading::Malformed`].
    pub fn read_orientation(&mut self) -> MountResult<Reading> {
        self.transport.write_line(GET_MPU)?;
        let line = self.transport.read_line()?;
        let reading = Reading::from_line(&line);

        match &reading {
            Reading::Valid(orientation) => debug!("Sample: {orientation}"),
            Reading::NoData => debug!("No sample before timeout"),
            Reading::Malformed(e) => warn!("Discarding sample: {e}"),
        }
        Ok(reading)
    }

    /// Send an absolute target orientation.
    ///
    /// The firmware converts the target into step counts itself; no reply is
    /// expected.
    pub fn send_target(&mut self, target: &Orientation) -> MountResult<()> {
        self.transport.write_line(&correction_command(target))
    }

    /// Send raw step counts for both steppers. No reply is expected.
    pub fn send_steps(&mut self, stepper1_steps: i32, stepper2_steps: i32) -> MountResult<()> {
        self.transport
            .write_line(&step_command(stepper1_steps, stepper2_steps))
    }

    /// Send the `PING` probe and require an exact `PONG` reply.
    ///
    /// # Errors
    ///
    /// Returns [`MountError::HandshakeFailed`] with whatever was received
    /// (possibly empty) if the reply is not `PONG`.
    pub fn ping(&mut self) -> MountResult<()> {
        self.transport.write_line(PING)?;
        let reply = self.transport.read_line()?;
        if is_pong(&reply) {
            debug!("Handshake OK");
            Ok(())
        } else {
            Err(MountError::HandshakeFailed { reply })
        }
    }

    /// Borrow the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Consume the driver and return the transport.
    pub fn into_inner(self) -> T {
        self.transport
    }
}
