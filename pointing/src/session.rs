//! Session start: find the mount, open it, wait for it to come out of reset.
//!
//! Failures here are the only ones an operator has to act on (plug the board
//! in, close the other program holding the port). Nothing in this module
//! retries.

use std::time::Duration;

use hardware::mount::{
    find_device, LineTransport, MountConfig, MountDevice, MountResult, PortEnumerator, PortInfo,
    SerialConnection, SystemPorts,
};
use tracing::info;

use crate::settle::Sleeper;

/// Locate the mount, open it with `open`, and wait `reset_settle`.
///
/// `open` is only called once a port has matched, so a
/// [`DeviceNotFound`](hardware::mount::MountError::DeviceNotFound) result
/// guarantees no port was touched.
pub fn start_session<E, S, T, F>(
    enumerator: &E,
    signatures: &[S],
    open: F,
    reset_settle: Duration,
    sleeper: &mut impl Sleeper,
) -> MountResult<MountDevice<T>>
where
    E: PortEnumerator + ?Sized,
    S: AsRef<str>,
    T: LineTransport,
    F: FnOnce(&PortInfo) -> MountResult<T>,
{
    let port = find_device(enumerator, signatures)?;
    let transport = open(&port)?;

    info!("Waiting {:?} for {} to reset", reset_settle, port.device);
    sleeper.sleep(reset_settle);

    Ok(MountDevice::new(transport))
}

/// Open the real serial mount described by `config`.
///
/// If `port` is given discovery is skipped and that device is opened
/// directly.
pub fn connect_serial(
    config: &MountConfig,
    port: Option<&str>,
    timeout: Duration,
    sleeper: &mut impl Sleeper,
) -> MountResult<MountDevice<SerialConnection>> {
    let open = |port: &PortInfo| SerialConnection::open(&port.device, config.baud_rate, timeout);

    match port {
        Some(device) => {
            let explicit = vec![PortInfo::new(device, device)];
            start_session(&explicit, &[device], open, config.reset_settle(), sleeper)
        }
        None => start_session(
            &SystemPorts,
            &config.signatures,
            open,
            config.reset_settle(),
            sleeper,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settle::RecordingSleeper;
    use hardware::mount::mock::ScriptedTransport;
    use hardware::mount::{MountError, DEFAULT_SIGNATURES};

    #[test]
    fn test_opens_matching_port_and_settles() {
        let ports = vec![
            PortInfo::new("/dev/ttyS0", "ttyS0"),
            PortInfo::new("/dev/ttyACM0", "Arduino Mega 2560"),
        ];
        let mut sleeper = RecordingSleeper::new();
        let mut opened = Vec::new();

        let device = start_session(
            &ports,
            DEFAULT_SIGNATURES,
            |port| {
                opened.push(port.device.clone());
                Ok(ScriptedTransport::new())
            },
            Duration::from_secs(2),
            &mut sleeper,
        );

        assert!(device.is_ok());
        assert_eq!(opened, vec!["/dev/ttyACM0"]);
        assert_eq!(sleeper.sleeps, vec![Duration::from_secs(2)]);
    }

    #[test]
    fn test_open_failure_skips_settle() {
        let ports = vec![PortInfo::new("/dev/ttyACM0", "Arduino Uno")];
        let mut sleeper = RecordingSleeper::new();

        let result: MountResult<MountDevice<ScriptedTransport>> = start_session(
            &ports,
            DEFAULT_SIGNATURES,
            |port| {
                Err(MountError::Connection {
                    device: port.device.clone(),
                    reason: "Device or resource busy".to_string(),
                })
            },
            Duration::from_secs(2),
            &mut sleeper,
        );

        assert!(matches!(result, Err(MountError::Connection { .. })));
        assert!(sleeper.sleeps.is_empty());
    }

    #[test]
    fn test_explicit_port_skips_signature_match() {
        let config = MountConfig {
            reset_settle_ms: 0,
            ..MountConfig::default()
        };
        let mut sleeper = RecordingSleeper::new();
        let result = connect_serial(
            &config,
            Some("/dev/this-port-does-not-exist"),
            Duration::ZERO,
            &mut sleeper,
        );
        assert!(matches!(result, Err(MountError::Connection { .. })));
    }
}
