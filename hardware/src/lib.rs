//! Hardware drivers for the laser pointing mount.
//!
//! Each driver is feature-gated for optional compilation.
//!
//! # Features
//!
//! - `laser-mount` - Two-axis stepper mount with MPU-6050 feedback over USB
//!   serial (enabled by default)

#[cfg(feature = "laser-mount")]
pub mod mount;
