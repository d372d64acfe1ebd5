//! vfan-hardware
//!
//! Hardware access crate: the serial link to the fan microcontroller and the
//! discovery helpers that find it and the matching kernel hwmon directory.
//!
//! Public API:
//! - `serial_driver::SerialDriver`: opens the device and splits it into a `SerialLink`
//! - `serial_driver::{CommandSink, StatusSource}`: direction-specific halves of the link
//! - `discovery::{find_serial_device, find_hwmon_root}`: hardware lookup

pub mod discovery;
pub mod serial_driver;

pub use discovery::{find_hwmon_root, find_serial_device};
pub use serial_driver::{
    is_disconnect_error, CommandSink, SerialDriver, SerialLink, StatusSource,
};
