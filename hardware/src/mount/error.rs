use thiserror::Error;

/// Errors that can occur while finding, opening, or talking to the mount.
///
/// Malformed or missing orientation samples are not errors; see
/// [`Reading`](super::Reading).
#[derive(Error, Debug)]
pub enum MountError {
    /// Port enumeration itself failed.
    #[error("Failed to enumerate serial ports: {0}")]
    Enumeration(String),

    /// No enumerated port matched any known device signature.
    #[error("No serial port matching {signatures:?} (saw {ports_seen} ports)")]
    DeviceNotFound {
        signatures: Vec<String>,
        ports_seen: usize,
    },

    /// The port could not be opened (missing, busy, permissions).
    #[error("Failed to open {device}: {reason}")]
    Connection { device: String, reason: String },

    /// Read or write failure on an open connection.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The device answered the handshake probe with something other than `PONG`.
    #[error("Handshake failed, got {reply:?}")]
    HandshakeFailed { reply: String },
}

/// Result type for mount operations.
pub type MountResult<T> = Result<T, MountError>;
