//! Static configuration loaded once at startup
//!
//! This configuration is read-only after the daemon starts. Every section
//! and every field falls back to its default, so an empty file (or no file
//! at all) yields a working configuration for the default board.

use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::board::{BoardConfig, DefaultBoard};
use crate::error::{Result, VfanError};

/// Serial link configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Explicit serial device path, bypassing USB discovery
    pub device: Option<String>,
    /// USB vendor id of the microcontroller
    pub usb_vid: u16,
    /// Serial baud rate
    pub baud_rate: u32,
    /// Timeout handed to the serial port builder, in milliseconds
    pub timeout_ms: u64,
    /// Directory of stable serial device symlinks
    pub by_id_dir: PathBuf,
    /// Name fragments identifying the board under `by_id_dir`
    pub by_id_patterns: Vec<String>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: None,
            usb_vid: DefaultBoard::USB_VID,
            baud_rate: DefaultBoard::BAUD_RATE,
            timeout_ms: DefaultBoard::DEFAULT_TIMEOUT_MS,
            by_id_dir: PathBuf::from("/dev/serial/by-id"),
            by_id_patterns: DefaultBoard::BY_ID_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

/// Kernel hwmon side configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HwmonConfig {
    /// Directory searched for `hwmon*` entries
    pub search_root: PathBuf,
    /// Substring expected in `<hwmon>/device/marker`
    pub marker: String,
    /// Channel ids, in `pwmN` / `fanN_input` order
    pub channels: Vec<String>,
}

impl Default for HwmonConfig {
    fn default() -> Self {
        Self {
            search_root: PathBuf::from("/sys/class/hwmon"),
            marker: DefaultBoard::DRIVER_MARKER.to_string(),
            channels: DefaultBoard::CHANNELS.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Loop periods and retry delays
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// PWM poll period in milliseconds
    pub poll_interval_ms: u64,
    /// Delay between discovery attempts in seconds
    pub probe_interval_secs: u64,
    /// Delay after tearing down a connection in seconds
    pub cooldown_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 200,
            probe_interval_secs: 3,
            cooldown_secs: 2,
        }
    }
}

impl TimingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Static configuration for the vfan daemon.
///
/// Located at `~/.config/vfan/config.toml` by default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticConfig {
    /// Serial link settings
    pub serial: SerialConfig,

    /// hwmon discovery and channel layout
    pub hwmon: HwmonConfig,

    /// Poll, probe and cool-down periods
    pub timing: TimingConfig,
}

impl StaticConfig {
    /// Parse StaticConfig from TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Serialize StaticConfig to TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| VfanError::Config(e.to_string()))
    }

    /// Load and validate the configuration at `path`.
    ///
    /// A missing file is not an error: the defaults are returned.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        let config = match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content)?,
            Err(e) if e.kind() == ErrorKind::NotFound => Self::default(),
            Err(e) => {
                return Err(VfanError::Config(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the bridge cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.hwmon.channels.is_empty() {
            return Err(VfanError::Config(
                "hwmon.channels must name at least one channel".to_string(),
            ));
        }
        if let Some(id) = self.hwmon.channels.iter().find(|id| id.trim().is_empty()) {
            return Err(VfanError::Config(format!("Invalid channel id: {:?}", id)));
        }
        if self.hwmon.marker.is_empty() {
            return Err(VfanError::Config("hwmon.marker must not be empty".to_string()));
        }
        for (name, value) in [
            ("timing.poll_interval_ms", self.timing.poll_interval_ms),
            ("timing.probe_interval_secs", self.timing.probe_interval_secs),
            ("timing.cooldown_secs", self.timing.cooldown_secs),
        ] {
            if value == 0 {
                return Err(VfanError::Config(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }
        if self.serial.baud_rate == 0 {
            return Err(VfanError::Config(
                "serial.baud_rate must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
