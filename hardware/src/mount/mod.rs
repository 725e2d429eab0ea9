//! Two-axis laser mount driven by an Arduino-class controller over USB serial.
//!
//! The controller runs two steppers (yaw and pitch) and reads an MPU-6050
//! inertial sensor. The host talks to it with a newline-framed ASCII protocol
//! at 9600 baud; see [`protocol`] for the message set.
//!
//! Layers, lowest first:
//!
//! - [`locator`]: find the controller's port by its description
//! - [`transport`]: open the port and exchange lines
//! - [`device`]: typed commands and orientation reads
//!
//! # Example
//!
//! ```no_run
//! use hardware::mount::{
//!     find_device, MountConfig, MountDevice, SerialConnection, SystemPorts,
//! };
//!
//! let config = MountConfig::default();
//! let port = find_device(&SystemPorts, &config.signatures)?;
//! let conn = SerialConnection::open(&port.device, config.baud_rate, config.handshake_timeout())?;
//! std::thread::sleep(config.reset_settle());
//!
//! let mut mount = MountDevice::new(conn);
//! mount.ping()?;
//! println!("{:?}", mount.read_orientation()?);
//! # Ok::<(), hardware::mount::MountError>(())
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod locator;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod protocol;
pub mod transport;

pub use config::{ConfigError, MountConfig};
pub use device::{MountDevice, Reading};
pub use error::{MountError, MountResult};
pub use locator::{find_device, PortEnumerator, PortInfo, SystemPorts, DEFAULT_SIGNATURES};
pub use protocol::{Orientation, SampleError, BAUD_RATE};
pub use transport::{LineTransport, SerialConnection, MAX_LINE_LEN, RESET_SETTLE};
