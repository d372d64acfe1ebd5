//! Board definitions
//!
//! The bridge talks to one family of microcontroller boards and one virtual
//! hwmon driver. Their fixed characteristics live behind the `BoardConfig`
//! trait so the defaults in [`crate::config`] and the serial driver agree on
//! them at compile time.
//!
//! Note: Actual hardware I/O is in the `vfan-hardware` crate. This module only
//! contains board specifications.

/// Hardware board configuration trait
///
/// # Example
///
/// ```
/// use vfan_core::board::{BoardConfig, PicoFanBoard};
///
/// const VID: u16 = PicoFanBoard::USB_VID;
/// const BAUD: u32 = PicoFanBoard::BAUD_RATE;
/// assert_eq!(VID, 0x2E8A);
/// assert_eq!(BAUD, 115200);
/// ```
pub trait BoardConfig: Send + Sync + 'static {
    /// Human-readable board name
    const NAME: &'static str;

    /// USB Vendor ID for device detection
    const USB_VID: u16;

    /// Serial communication baud rate
    const BAUD_RATE: u32;

    /// Default serial timeout in milliseconds
    const DEFAULT_TIMEOUT_MS: u64;

    /// Substring identifying the bridged driver in `<hwmon>/device/marker`
    const DRIVER_MARKER: &'static str;

    /// Fan channel ids driven by the board, in hwmon index order
    const CHANNELS: &'static [&'static str];

    /// Substrings matched against `/dev/serial/by-id` entry names
    const BY_ID_PATTERNS: &'static [&'static str];
}

/// Raspberry Pi Pico (RP2040) running the fan firmware
///
/// - USB VID: 0x2E8A (Raspberry Pi Foundation)
/// - 115200 baud, 8N1
/// - three fan channels, `fan1`..`fan3`
pub struct PicoFanBoard;

impl BoardConfig for PicoFanBoard {
    const NAME: &'static str = "Pico fan board";
    const USB_VID: u16 = 0x2E8A;
    const BAUD_RATE: u32 = 115200;
    const DEFAULT_TIMEOUT_MS: u64 = 1000;
    const DRIVER_MARKER: &'static str = "vFanByTk";
    const CHANNELS: &'static [&'static str] = &["fan1", "fan2", "fan3"];
    const BY_ID_PATTERNS: &'static [&'static str] = &["Pico", "Raspberry_Pi"];
}

/// Board used when none is specified
pub type DefaultBoard = PicoFanBoard;

/// Maximum host-side PWM value (hwmon `pwmN` range is 0-255)
pub const MAX_PWM: u8 = 255;

/// Maximum duty percentage accepted by the firmware
pub const MAX_DUTY_PERCENT: u8 = 100;
