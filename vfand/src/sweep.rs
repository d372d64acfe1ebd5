//! Duty sweep diagnostic
//!
//! Ramps the duty of one or all channels from 0 to full and back, over and
//! over, while echoing whatever the firmware prints. Useful to check wiring
//! and firmware without the kernel driver loaded.

use std::time::Duration;

use anyhow::{bail, Result};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use vfan_core::{duty_to_percent, protocol, MAX_PWM};
use vfan_hardware::{CommandSink, StatusSource};

use crate::hardware::BridgeHardware;

/// One full period of the sweep: 0 → 255 → 0 in `step` increments
///
/// Both ends are always included.
pub fn sweep_duties(step: u8) -> Vec<u8> {
    let step = step.max(1) as usize;
    let mut up: Vec<u8> = (0..=MAX_PWM).step_by(step).collect();
    if up.last() != Some(&MAX_PWM) {
        up.push(MAX_PWM);
    }
    let down: Vec<u8> = up.iter().rev().skip(1).copied().collect();
    up.extend(down);
    up
}

/// Sweep settings
#[derive(Debug, Clone)]
pub struct SweepOptions {
    /// Channels to drive
    pub fans: Vec<String>,
    /// PWM increment per command
    pub step: u8,
    /// Delay between steps
    pub interval: Duration,
}

/// Run the sweep until `shutdown` is cancelled or the link fails
pub async fn run_sweep<H: BridgeHardware>(
    hardware: &H,
    options: &SweepOptions,
    shutdown: &CancellationToken,
) -> Result<()> {
    let Some(port) = hardware.find_serial_device()? else {
        bail!("Serial device not found");
    };
    info!(
        "Sweeping {:?} on {} (step {}, every {:?})",
        options.fans, port, options.step, options.interval
    );

    let mut link = hardware.open(&port)?;
    let cancel = shutdown.child_token();
    let sink = link.sink.as_mut();
    let source = link.source.as_mut();

    let ramp = async {
        let result = drive_ramp(sink, options, &cancel).await;
        cancel.cancel();
        result
    };
    let echo = async {
        let result = echo_feedback(source, &cancel).await;
        cancel.cancel();
        result
    };
    let (ramp_result, echo_result) = tokio::join!(ramp, echo);
    link.close();

    ramp_result?;
    echo_result?;
    Ok(())
}

async fn drive_ramp(
    sink: &mut dyn CommandSink,
    options: &SweepOptions,
    cancel: &CancellationToken,
) -> vfan_core::Result<()> {
    let duties = sweep_duties(options.step);
    let mut pass = 0u64;

    loop {
        pass += 1;
        debug!("Sweep pass {}", pass);

        for &duty in &duties {
            if cancel.is_cancelled() {
                return Ok(());
            }

            let percent = duty_to_percent(duty);
            for fan in &options.fans {
                sink.send_line(&protocol::encode_duty_command(fan, percent)?)
                    .await?;
            }

            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = sleep(options.interval) => {}
            }
        }
    }
}

async fn echo_feedback(
    source: &mut dyn StatusSource,
    cancel: &CancellationToken,
) -> vfan_core::Result<()> {
    loop {
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            line = source.read_line() => line?,
        };
        let line = line.trim();
        if !line.is_empty() {
            info!("Device: {}", line);
        }
    }
}
