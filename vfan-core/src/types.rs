//! Core types and data structures for the bridge

use crate::board::{MAX_DUTY_PERCENT, MAX_PWM};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Convert a host PWM value (0-255) to the firmware's duty percentage (0-100)
///
/// Integer arithmetic, truncating toward zero. Neighbouring PWM values can
/// map to the same percentage; the poller compares raw PWM values, so this
/// only costs an occasional redundant command.
/// - 0 → 0
/// - 128 → 50
/// - 255 → 100
#[inline]
pub fn duty_to_percent(duty: u8) -> u8 {
    ((duty as u32 * MAX_DUTY_PERCENT as u32) / MAX_PWM as u32) as u8
}

/// Extract the numeric suffix of a channel id (`"fan12"` → `12`)
pub fn channel_number(id: &str) -> Option<u32> {
    let digits_start = id
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)?;
    id[digits_start..].parse().ok()
}

/// Path of the RPM input file for a device-reported channel id
///
/// Returns `None` when the id has no numeric suffix.
pub fn rpm_input_path(hwmon_root: &Path, id: &str) -> Option<PathBuf> {
    channel_number(id).map(|n| hwmon_root.join(format!("fan{}_input", n)))
}

/// One bridged fan channel
///
/// `last_known_duty` belongs to the PWM poller. A fresh set of channels is
/// built for every connection, so the first poll after a (re)connect always
/// sends a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanChannel {
    /// Channel id as understood by the firmware (e.g. `fan1`)
    pub id: String,
    /// hwmon PWM control file (read)
    pub pwm_path: PathBuf,
    /// hwmon RPM input file (written)
    pub rpm_path: PathBuf,
    /// Last duty successfully sent to the device
    pub last_known_duty: Option<u8>,
}

impl FanChannel {
    /// Create the channel at 0-based `position` under `hwmon_root`
    pub fn new(id: impl Into<String>, position: usize, hwmon_root: &Path) -> Self {
        let n = position + 1;
        Self {
            id: id.into(),
            pwm_path: hwmon_root.join(format!("pwm{}", n)),
            rpm_path: hwmon_root.join(format!("fan{}_input", n)),
            last_known_duty: None,
        }
    }

    /// Build the channel set for one connection
    pub fn from_ids<S: AsRef<str>>(ids: &[S], hwmon_root: &Path) -> Vec<Self> {
        ids.iter()
            .enumerate()
            .map(|(position, id)| Self::new(id.as_ref(), position, hwmon_root))
            .collect()
    }

    /// Whether `duty` must be sent to the device
    pub fn needs_update(&self, duty: u8) -> bool {
        self.last_known_duty != Some(duty)
    }
}

/// Outbound duty-set command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DutyCommand {
    /// Channel id
    pub fan: String,
    /// Duty in percent (0-100)
    pub set_duty: u8,
}

/// One entry of a device status line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Channel id
    #[serde(rename = "id")]
    pub fan_id: String,
    /// Measured tachometer speed
    pub rpm: u32,
    /// Duty currently applied by the firmware, in percent; 0 when not reported
    #[serde(default)]
    pub duty: u32,
}
