//! Connection settings for the laser mount.
//!
//! Settings can be loaded from a JSON file; any field left out of the file
//! keeps its default. The alignment tolerance is fixed in the controller and
//! has no setting here.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::locator::DEFAULT_SIGNATURES;
use super::protocol::BAUD_RATE;

/// Errors loading a [`MountConfig`] file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Serial and timing settings for talking to the mount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    /// Serial baud rate
    pub baud_rate: u32,
    /// Read timeout during alignment; 0 polls without blocking
    pub read_timeout_ms: u64,
    /// Read timeout used for the PING/PONG handshake
    pub handshake_timeout_ms: u64,
    /// Wait after opening the port for the controller to come out of reset
    pub reset_settle_ms: u64,
    /// Wait after each correction command for the steppers to move
    pub correction_settle_ms: u64,
    /// Port description substrings that identify the controller
    pub signatures: Vec<String>,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            baud_rate: BAUD_RATE,
            read_timeout_ms: 0,
            handshake_timeout_ms: 2000,
            reset_settle_ms: 2000,
            correction_settle_ms: 1000,
            signatures: DEFAULT_SIGNATURES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl MountConfig {
    /// Load settings from a JSON file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn reset_settle(&self) -> Duration {
        Duration::from_millis(self.reset_settle_ms)
    }

    pub fn correction_settle(&self) -> Duration {
        Duration::from_millis(self.correction_settle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_firmware() {
        let config = MountConfig::default();
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.read_timeout(), Duration::ZERO);
        assert_eq!(config.reset_settle(), Duration::from_secs(2));
        assert_eq!(config.correction_settle(), Duration::from_secs(1));
        assert_eq!(config.signatures, vec!["Arduino", "USB-SERIAL"]);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"read_timeout_ms": 250, "signatures": ["CP210x"]}}"#).unwrap();

        let config = MountConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.read_timeout(), Duration::from_millis(250));
        assert_eq!(config.signatures, vec!["CP210x"]);
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.correction_settle_ms, 1000);
    }

    #[test]
    fn test_missing_file() {
        let result = MountConfig::load_from_file(Path::new("/nonexistent/mount.json"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_invalid_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "baud_rate = 9600").unwrap();
        assert!(matches!(
            MountConfig::load_from_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_round_trips_through_json() {
        let config = MountConfig {
            handshake_timeout_ms: 500,
            ..MountConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let restored: MountConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, config);
    }
}
