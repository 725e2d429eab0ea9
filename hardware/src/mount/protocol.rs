//! Line protocol spoken by the mount's microcontroller
//!
//! Every message is a single ASCII line terminated with LF (0x0A). The host
//! drives the exchange; the controller only speaks when asked, except that
//! position and step commands get no reply at all.
//!
//! | Direction | Line | Meaning |
//! |-----------|------|---------|
//! | host → mount | `GET_MPU` | Request an orientation sample |
//! | mount → host | `MPU:<yaw>,<pitch>` | Orientation sample in degrees |
//! | host → mount | `<yaw>,<pitch>` | Absolute target orientation in degrees |
//! | host → mount | `<steps1>,<steps2>` | Raw step counts for both steppers |
//! | host → mount | `PING` | Handshake probe |
//! | mount → host | `PONG` | Handshake reply |
//!
//! Target and step commands share the same two-field framing.

use std::fmt;

use thiserror::Error;

/// Serial baud rate of the mount firmware.
pub const BAUD_RATE: u32 = 9600;

/// Request for one orientation sample.
pub const GET_MPU: &str = "GET_MPU";

/// Prefix of an orientation sample reply.
pub const MPU_PREFIX: &str = "MPU:";

/// Handshake probe.
pub const PING: &str = "PING";

/// Expected reply to [`PING`].
pub const PONG: &str = "PONG";

/// Field separator shared by samples and commands.
const FIELD_SEPARATOR: char = ',';

/// Yaw/pitch pair in degrees.
///
/// Used both for targets and for measured samples. No unit conversion or
/// angle wrapping is performed anywhere in the driver.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Orientation {
    /// Rotation about the vertical axis (compass heading), degrees
    pub yaw: f64,
    /// Rotation about the lateral axis (elevation), degrees
    pub pitch: f64,
}

impl Orientation {
    pub fn new(yaw: f64, pitch: f64) -> Self {
        Self { yaw, pitch }
    }

    /// Absolute per-axis error `(|Δyaw|, |Δpitch|)` against a target.
    pub fn abs_error(&self, target: &Orientation) -> (f64, f64) {
        (
            (self.yaw - target.yaw).abs(),
            (self.pitch - target.pitch).abs(),
        )
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "yaw={}°, pitch={}°", self.yaw, self.pitch)
    }
}

/// Why a line could not be read as an orientation sample.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SampleError {
    /// Line did not begin with `MPU:`.
    #[error("missing MPU: prefix in {0:?}")]
    MissingPrefix(String),

    /// Wrong number of comma-separated fields after the prefix.
    #[error("expected 2 fields, got {0}")]
    FieldCount(usize),

    /// A field was not a finite floating point number.
    #[error("invalid number {0:?}")]
    InvalidNumber(String),
}

/// Parse an `MPU:<yaw>,<pitch>` reply.
///
/// Surrounding whitespace (including a trailing CR) is ignored, as is
/// whitespace around each field.
///
/// # Example
///
/// ```
/// use hardware::mount::protocol::{parse_sample, Orientation};
///
/// let sample = parse_sample("MPU:12.0,3.5\n").unwrap();
/// assert_eq!(sample, Orientation::new(12.0, 3.5));
/// assert!(parse_sample("12.0,3.5").is_err());
/// ```
pub fn parse_sample(line: &str) -> Result<Orientation, SampleError> {
    let line = line.trim();
    let body = line
        .strip_prefix(MPU_PREFIX)
        .ok_or_else(|| SampleError::MissingPrefix(line.to_string()))?;
    let (yaw, pitch) = parse_pair(body)?;
    Ok(Orientation { yaw, pitch })
}

/// Split a `<a>,<b>` line into two finite floats.
///
/// This is the field-splitting rule shared by samples and commands, so a
/// formatted [`correction_command`] can be read back with it.
pub fn parse_pair(body: &str) -> Result<(f64, f64), SampleError> {
    let fields: Vec<&str> = body.trim().split(FIELD_SEPARATOR).collect();
    if fields.len() != 2 {
        return Err(SampleError::FieldCount(fields.len()));
    }

    let parse_field = |field: &str| -> Result<f64, SampleError> {
        let field = field.trim();
        field
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| SampleError::InvalidNumber(field.to_string()))
    };

    Ok((parse_field(fields[0])?, parse_field(fields[1])?))
}

/// Format a float so that it always carries a fractional part.
///
/// Rust's `Display` for `f64` is shortest-round-trip, so parsing the output
/// gives back the exact same value.
fn format_degrees(value: f64) -> String {
    if value.fract() == 0.0 && value.is_finite() {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

/// Build the absolute-target command line, `"<yaw>,<pitch>\n"`.
///
/// ```
/// use hardware::mount::protocol::{correction_command, Orientation};
///
/// assert_eq!(correction_command(&Orientation::new(0.0, 0.0)), "0.0,0.0\n");
/// assert_eq!(correction_command(&Orientation::new(184.25, -3.75)), "184.25,-3.75\n");
/// ```
pub fn correction_command(target: &Orientation) -> String {
    format!(
        "{}{FIELD_SEPARATOR}{}\n",
        format_degrees(target.yaw),
        format_degrees(target.pitch)
    )
}

/// Build a raw stepper command line, `"<steps1>,<steps2>\n"`.
pub fn step_command(stepper1_steps: i32, stepper2_steps: i32) -> String {
    format!("{stepper1_steps}{FIELD_SEPARATOR}{stepper2_steps}\n")
}

/// True if a handshake reply is exactly `PONG` (after trimming).
pub fn is_pong(reply: &str) -> bool {
    reply.trim() == PONG
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_parse_well_formed_sample() {
        let sample = parse_sample("MPU:12.0,3.5\n").unwrap();
        assert_relative_eq!(sample.yaw, 12.0);
        assert_relative_eq!(sample.pitch, 3.5);
    }

    #[test]
    fn test_parse_is_repeatable() {
        let first = parse_sample("MPU:12.0,3.5\n").unwrap();
        for _ in 0..5 {
            assert_eq!(parse_sample("MPU:12.0,3.5\n").unwrap(), first);
        }
    }

    #[test]
    fn test_parse_tolerates_cr_and_spaces() {
        let sample = parse_sample("MPU: -45.5 , 10\r\n").unwrap();
        assert_eq!(sample, Orientation::new(-45.5, 10.0));
    }

    #[test]
    fn test_parse_rejects_missing_prefix() {
        assert!(matches!(
            parse_sample("12.0,3.5"),
            Err(SampleError::MissingPrefix(_))
        ));
        assert!(matches!(
            parse_sample("PONG"),
            Err(SampleError::MissingPrefix(_))
        ));
        assert!(matches!(
            parse_sample("mpu:1,2"),
            Err(SampleError::MissingPrefix(_))
        ));
        assert!(matches!(parse_sample(""), Err(SampleError::MissingPrefix(_))));
    }

    #[test]
    fn test_parse_rejects_wrong_field_count() {
        assert_eq!(parse_sample("MPU:1.0"), Err(SampleError::FieldCount(1)));
        assert_eq!(
            parse_sample("MPU:1.0,2.0,3.0"),
            Err(SampleError::FieldCount(3))
        );
    }

    #[test]
    fn test_parse_rejects_non_numeric_fields() {
        assert_eq!(
            parse_sample("MPU:abc,2.0"),
            Err(SampleError::InvalidNumber("abc".to_string()))
        );
        assert_eq!(
            parse_sample("MPU:1.0,"),
            Err(SampleError::InvalidNumber(String::new()))
        );
        assert_eq!(
            parse_sample("MPU:NaN,1.0"),
            Err(SampleError::InvalidNumber("NaN".to_string()))
        );
    }

    #[test]
    fn test_correction_command_round_trip() {
        let target = Orientation::new(184.25, -3.75);
        let line = correction_command(&target);
        assert_eq!(line, "184.25,-3.75\n");

        let (yaw, pitch) = parse_pair(line.trim_end()).unwrap();
        assert_eq!(yaw, 184.25);
        assert_eq!(pitch, -3.75);
    }

    #[test]
    fn test_correction_command_keeps_fraction_for_whole_degrees() {
        assert_eq!(correction_command(&Orientation::new(0.0, 0.0)), "0.0,0.0\n");
        assert_eq!(correction_command(&Orientation::new(90.0, -15.0)), "90.0,-15.0\n");
    }

    #[test]
    fn test_step_command() {
        assert_eq!(step_command(500, 250), "500,250\n");
        assert_eq!(step_command(-10, 0), "-10,0\n");
    }

    #[test]
    fn test_is_pong() {
        assert!(is_pong("PONG"));
        assert!(is_pong("PONG\r\n"));
        assert!(!is_pong("PONG!"));
        assert!(!is_pong(""));
    }

    #[test]
    fn test_abs_error() {
        let measured = Orientation::new(5.0, -0.2);
        let (yaw_err, pitch_err) = measured.abs_error(&Orientation::new(0.0, 0.0));
        assert_relative_eq!(yaw_err, 5.0);
        assert_relative_eq!(pitch_err, 0.2);
    }
}
