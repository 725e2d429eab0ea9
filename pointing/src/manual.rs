//! Open-loop stepper commands for bring-up and calibration.
//!
//! None of this reads the MPU; it sends raw step counts and trusts the
//! firmware to execute them.

use std::time::Duration;

use hardware::mount::{LineTransport, MountDevice, MountResult};
use strum::{Display, EnumIter, EnumString};
use tracing::info;

use crate::settle::Sleeper;

/// Step counts sent by the stepper sweep test, in order.
pub const STEPPER_TEST_SEQUENCE: [(i32, i32); 4] = [(200, 200), (400, 400), (600, 600), (800, 800)];

/// Wait after each step command of the sweep test.
pub const STEPPER_TEST_SETTLE: Duration = Duration::from_secs(2);

/// Fixed reference positions used to calibrate the steppers by eye.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, EnumString, clap::ValueEnum)]
pub enum CalibrationPreset {
    #[strum(serialize = "reference-point-1")]
    #[value(name = "reference-point-1")]
    ReferencePoint1,
    #[strum(serialize = "reference-point-2")]
    #[value(name = "reference-point-2")]
    ReferencePoint2,
}

impl CalibrationPreset {
    /// `(stepper1, stepper2)` step counts for this preset.
    pub fn steps(&self) -> (i32, i32) {
        match self {
            CalibrationPreset::ReferencePoint1 => (500, 250),
            CalibrationPreset::ReferencePoint2 => (250, 500),
        }
    }
}

/// Send one raw step command.
pub fn send_steps<T: LineTransport>(
    device: &mut MountDevice<T>,
    stepper1_steps: i32,
    stepper2_steps: i32,
) -> MountResult<()> {
    device.send_steps(stepper1_steps, stepper2_steps)?;
    info!("Command sent: Stepper 1 = {stepper1_steps} steps, Stepper 2 = {stepper2_steps} steps");
    Ok(())
}

/// Drive both steppers through [`STEPPER_TEST_SEQUENCE`], settling after each.
///
/// Returns the number of commands sent.
pub fn run_stepper_test<T: LineTransport>(
    device: &mut MountDevice<T>,
    sleeper: &mut impl Sleeper,
) -> MountResult<usize> {
    for (stepper1, stepper2) in STEPPER_TEST_SEQUENCE {
        send_steps(device, stepper1, stepper2)?;
        sleeper.sleep(STEPPER_TEST_SETTLE);
    }
    info!("Stepper movement test completed");
    Ok(STEPPER_TEST_SEQUENCE.len())
}

/// Move to a calibration preset.
pub fn apply_preset<T: LineTransport>(
    device: &mut MountDevice<T>,
    preset: CalibrationPreset,
) -> MountResult<()> {
    let (stepper1, stepper2) = preset.steps();
    info!("Setting steppers to {preset} ({stepper1}, {stepper2})");
    send_steps(device, stepper1, stepper2)
}
