//! Command line tool for the two-axis laser mount.
//!
//! Subcommands:
//! - `ports`: List serial ports and which ones look like the mount
//! - `ping`: PING/PONG handshake check
//! - `read`: Take one orientation sample
//! - `align`: Run the closed loop until the mount is on target
//! - `steps`: Send raw step counts
//! - `stepper-test`: Sweep both steppers through a fixed sequence
//! - `preset`: Move to a calibration reference point

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use hardware::mount::{
    MountConfig, MountDevice, Orientation, PortEnumerator, Reading, SerialConnection, SystemPorts,
};
use pointing::alignment::{AlignmentController, AlignmentError, Backoff, CancelToken, RetryPolicy};
use pointing::manual::{apply_preset, run_stepper_test, send_steps, CalibrationPreset};
use pointing::session::connect_serial;
use pointing::settle::ThreadSleeper;
use tracing::{info, warn};

/// Laser Mount Control Tool
#[derive(Parser, Debug)]
#[command(name = "mount_tool")]
#[command(about = "Control and align the two-axis laser mount")]
#[command(version)]
struct Args {
    /// Serial device to use instead of auto-detecting the mount
    #[arg(long, global = true)]
    port: Option<String>,

    /// JSON file with connection settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the alignment read timeout in milliseconds (0 = non-blocking)
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List serial ports and signature matches
    Ports,

    /// Check that the mount answers PING with PONG
    Ping,

    /// Take a single orientation sample
    Read,

    /// Drive the mount to a target orientation
    Align {
        /// Target yaw in degrees
        #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
        yaw: f64,

        /// Target pitch in degrees
        #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
        pitch: f64,

        /// Give up after this many consecutive reads without a sample
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        max_attempts: Option<u32>,

        /// Wait between failed reads in milliseconds (doubles on each failure)
        #[arg(long)]
        backoff_ms: Option<u64>,

        /// Upper bound for the backoff wait in milliseconds
        #[arg(long, default_value = "1000")]
        max_backoff_ms: u64,
    },

    /// Send raw step counts to both steppers
    Steps {
        /// Steps for stepper 1
        #[arg(allow_hyphen_values = true)]
        stepper1: i32,

        /// Steps for stepper 2
        #[arg(allow_hyphen_values = true)]
        stepper2: i32,
    },

    /// Sweep both steppers through 200, 400, 600, 800 steps
    StepperTest,

    /// Move to a calibration reference point
    Preset {
        #[arg(value_enum)]
        preset: CalibrationPreset,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => MountConfig::load_from_file(path)?,
        None => MountConfig::default(),
    };
    if let Some(timeout_ms) = args.timeout_ms {
        config.read_timeout_ms = timeout_ms;
    }
    let port = args.port.as_deref();

    match args.command {
        Command::Ports => cmd_ports(&config),
        Command::Ping => cmd_ping(&config, port),
        Command::Read => cmd_read(&config, port),
        Command::Align {
            yaw,
            pitch,
            max_attempts,
            backoff_ms,
            max_backoff_ms,
        } => {
            let mut retry = RetryPolicy::unbounded();
            if let Some(max) = max_attempts {
                retry = retry.with_max_attempts(max);
            }
            if let Some(initial) = backoff_ms {
                retry = retry.with_backoff(Backoff::Exponential {
                    initial: Duration::from_millis(initial),
                    max: Duration::from_millis(max_backoff_ms.max(initial)),
                });
            }
            cmd_align(&config, port, Orientation::new(yaw, pitch), retry)
        }
        Command::Steps { stepper1, stepper2 } => {
            let mut mount = open_for_commands(&config, port)?;
            send_steps(&mut mount, stepper1, stepper2)?;
            Ok(())
        }
        Command::StepperTest => {
            let mut mount = open_for_commands(&config, port)?;
            run_stepper_test(&mut mount, &mut ThreadSleeper)?;
            Ok(())
        }
        Command::Preset { preset } => {
            let mut mount = open_for_commands(&config, port)?;
            apply_preset(&mut mount, preset)?;
            Ok(())
        }
    }
}

/// Open the mount with the handshake timeout for one-shot commands.
fn open_for_commands(
    config: &MountConfig,
    port: Option<&str>,
) -> Result<MountDevice<SerialConnection>> {
    let mount = connect_serial(config, port, config.handshake_timeout(), &mut ThreadSleeper)
        .context("Mount not available. Check the USB connection.")?;
    Ok(mount)
}

// ==================== Ports Command ====================

fn cmd_ports(config: &MountConfig) -> Result<()> {
    let ports = SystemPorts.ports()?;
    if ports.is_empty() {
        info!("No serial ports found");
        return Ok(());
    }

    for port in ports {
        let marker = if port.matches(&config.signatures) {
            "  <- mount"
        } else {
            ""
        };
        println!("{:<20} {}{}", port.device, port.description, marker);
    }
    Ok(())
}

// ==================== Ping Command ====================

fn cmd_ping(config: &MountConfig, port: Option<&str>) -> Result<()> {
    let mut mount = open_for_commands(config, port)?;
    mount
        .ping()
        .context("Mount detected but not responding. Check connections.")?;
    info!(
        "Mount connected and responding on {}",
        mount.transport().device()
    );
    Ok(())
}

// ==================== Read Command ====================

fn cmd_read(config: &MountConfig, port: Option<&str>) -> Result<()> {
    let mut mount = open_for_commands(config, port)?;
    match mount.read_orientation()? {
        Reading::Valid(orientation) => {
            println!("Yaw: {}°, Pitch: {}°", orientation.yaw, orientation.pitch)
        }
        Reading::NoData => bail!("No reply to GET_MPU"),
        Reading::Malformed(e) => bail!("Malformed reply: {e}"),
    }
    Ok(())
}

// ==================== Align Command ====================

fn cmd_align(
    config: &MountConfig,
    port: Option<&str>,
    target: Orientation,
    retry: RetryPolicy,
) -> Result<()> {
    let mount = connect_serial(config, port, config.read_timeout(), &mut ThreadSleeper)
        .context("Failed to start alignment session")?;

    if config.read_timeout().is_zero() && retry.backoff == Backoff::None {
        warn!("Non-blocking reads with no backoff: the loop will spin while waiting for samples");
    }

    let cancel = CancelToken::new();
    spawn_ctrl_c_watcher(cancel.clone())?;

    let mut controller = AlignmentController::new(mount, target)
        .with_retry_policy(retry)
        .with_settle_delay(config.correction_settle());

    info!("Starting alignment (Ctrl+C to stop)...");
    match controller.run(&cancel) {
        Ok(report) => {
            info!(
                "Laser is aligned at {} ({} cycles, {} corrections, {} failed reads)",
                report.final_orientation, report.cycles, report.corrections, report.failed_reads
            );
            Ok(())
        }
        Err(AlignmentError::Cancelled { cycles }) => {
            let session = controller.session();
            match session.measured() {
                Some(last) => info!("Stopped after {cycles} cycles, last sample {last}"),
                None => info!("Stopped after {cycles} cycles, no valid sample received"),
            }
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Trip `cancel` when the process receives Ctrl+C.
fn spawn_ctrl_c_watcher(cancel: CancelToken) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build signal runtime")?;

    std::thread::spawn(move || {
        runtime.block_on(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    warn!("Ctrl+C received, stopping");
                    cancel.cancel();
                }
                Err(e) => warn!("Cannot listen for Ctrl+C: {e}"),
            }
        });
    });
    Ok(())
}
