//! Line-oriented JSON protocol spoken by the fan firmware
//!
//! Host → device, one object per line:
//!
//! ```text
//! {"fan":"fan1","set_duty":50}
//! ```
//!
//! Device → host, one array per line:
//!
//! ```text
//! [{"id":"fan1","rpm":1200,"duty":50},{"id":"fan2","rpm":0,"duty":0}]
//! ```
//!
//! Framing relies entirely on `\n`; there is no versioning or checksum.

use crate::error::Result;
use crate::types::{DutyCommand, StatusReport};

/// Line terminator used in both directions
pub const LINE_TERMINATOR: char = '\n';

/// First character of every status line
pub const STATUS_FRAME_START: char = '[';

/// Encode a duty-set command, including the trailing newline
pub fn encode_duty_command(fan: &str, percent: u8) -> Result<String> {
    let command = DutyCommand {
        fan: fan.to_string(),
        set_duty: percent,
    };
    let mut line = serde_json::to_string(&command)?;
    line.push(LINE_TERMINATOR);
    Ok(line)
}

/// Whether a trimmed line looks like a status array
///
/// Anything else (boot banners, debug prints, half-received lines) is noise.
pub fn is_status_frame(line: &str) -> bool {
    line.starts_with(STATUS_FRAME_START)
}

/// Decode a trimmed status line into its reports
pub fn decode_status(line: &str) -> Result<Vec<StatusReport>> {
    Ok(serde_json::from_str(line)?)
}
