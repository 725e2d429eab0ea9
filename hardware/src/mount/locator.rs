//! Serial port discovery for the mount's microcontroller.
//!
//! The mount shows up as a generic USB serial device, so the only stable way
//! to find it is by the description the OS reports for the port. Boards with
//! the genuine ATmega16U2 bridge report `Arduino ...`; CH340 clones
//! report `USB-SERIAL CH340`.

use serialport::{SerialPortInfo, SerialPortType};
use tracing::{debug, info};

use super::error::{MountError, MountResult};

/// Description substrings that identify the mount controller.
pub const DEFAULT_SIGNATURES: &[&str] = &["Arduino", "USB-SERIAL"];

/// One enumerated serial port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Device path or name to open (e.g. `/dev/ttyACM0`, `COM3`)
    pub device: String,
    /// Human-readable description
    pub description: String,
}

impl PortInfo {
    pub fn new(device: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            description: description.into(),
        }
    }

    /// True if the description contains any of the given signatures.
    pub fn matches<S: AsRef<str>>(&self, signatures: &[S]) -> bool {
        signatures
            .iter()
            .any(|sig| self.description.contains(sig.as_ref()))
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let description = match &info.port_type {
            SerialPortType::UsbPort(usb) => usb
                .product
                .clone()
                .or_else(|| usb.manufacturer.clone())
                .unwrap_or_else(|| info.port_name.clone()),
            _ => info.port_name.clone(),
        };
        Self {
            device: info.port_name,
            description,
        }
    }
}

/// Source of serial port listings.
///
/// Abstracts OS enumeration so discovery can be tested without hardware.
pub trait PortEnumerator {
    fn ports(&self) -> MountResult<Vec<PortInfo>>;
}

/// Enumerates the ports the OS currently exposes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPorts;

impl PortEnumerator for SystemPorts {
    fn ports(&self) -> MountResult<Vec<PortInfo>> {
        let ports = serialport::available_ports()
            .map_err(|e| MountError::Enumeration(e.to_string()))?;
        Ok(ports.into_iter().map(PortInfo::from).collect())
    }
}

impl PortEnumerator for Vec<PortInfo> {
    fn ports(&self) -> MountResult<Vec<PortInfo>> {
        Ok(self.clone())
    }
}

/// Find the first port whose description contains any of `signatures`.
///
/// Ports are checked in enumeration order, so the result is stable for a
/// stable port list.
///
/// # Errors
///
/// Returns [`MountError::DeviceNotFound`] if nothing matches, or
/// [`MountError::Enumeration`] if the port list could not be read.
///
/// # Example
///
/// ```
/// use hardware::mount::{find_device, PortInfo, DEFAULT_SIGNATURES};
///
/// let ports = vec![
///     PortInfo::new("/dev/ttyS0", "ttyS0"),
///     PortInfo::new("/dev/ttyACM0", "Arduino Uno"),
/// ];
/// let port = find_device(&ports, DEFAULT_SIGNATURES).unwrap();
/// assert_eq!(port.device, "/dev/ttyACM0");
/// ```
pub fn find_device<E, S>(enumerator: &E, signatures: &[S]) -> MountResult<PortInfo>
where
    E: PortEnumerator + ?Sized,
    S: AsRef<str>,
{
    let ports = enumerator.ports()?;
    debug!("Enumerated {} serial ports", ports.len());

    let ports_seen = ports.len();
    match ports.into_iter().find(|port| port.matches(signatures)) {
        Some(port) => {
            info!("Found mount on {} ({})", port.device, port.description);
            Ok(port)
        }
        None => Err(MountError::DeviceNotFound {
            signatures: signatures.iter().map(|s| s.as_ref().to_string()).collect(),
            ports_seen,
        }),
    }
}
