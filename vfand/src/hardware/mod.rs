//! Hardware access for the bridge
//!
//! The connection manager only sees the [`BridgeHardware`] trait, so the
//! whole reconnect cycle can run against fakes in tests. [`SystemHardware`]
//! is the real implementation backed by `vfan_hardware`.

mod connection_manager;

pub use connection_manager::ConnectionManager;

use std::path::PathBuf;

use tracing::debug;
use vfan_core::{HwmonConfig, Result, SerialConfig, StaticConfig};
use vfan_hardware::{discovery, SerialDriver, SerialLink};

/// Discovery and connection primitives used by the connection manager
///
/// The two `find_*` methods are queries: `Ok(None)` means "not there yet"
/// and is the normal state while the board is unplugged or the driver is
/// not loaded.
pub trait BridgeHardware: Send + Sync {
    /// Locate the microcontroller's serial port
    fn find_serial_device(&self) -> Result<Option<String>>;

    /// Locate the marked hwmon directory
    fn find_hwmon_root(&self) -> Result<Option<PathBuf>>;

    /// Open the serial port found by [`Self::find_serial_device`]
    fn open(&self, port: &str) -> Result<SerialLink>;
}

/// Real serial ports and the real sysfs tree
pub struct SystemHardware {
    serial: SerialConfig,
    hwmon: HwmonConfig,
    debug_uart: bool,
}

impl SystemHardware {
    pub fn new(config: &StaticConfig, debug_uart: bool) -> Self {
        Self {
            serial: config.serial.clone(),
            hwmon: config.hwmon.clone(),
            debug_uart,
        }
    }
}

impl BridgeHardware for SystemHardware {
    fn find_serial_device(&self) -> Result<Option<String>> {
        discovery::find_serial_device(&self.serial)
    }

    fn find_hwmon_root(&self) -> Result<Option<PathBuf>> {
        discovery::find_hwmon_root(&self.hwmon.search_root, &self.hwmon.marker)
    }

    fn open(&self, port: &str) -> Result<SerialLink> {
        debug!("Connecting to {} at {} baud", port, self.serial.baud_rate);
        Ok(SerialDriver::new(port, &self.serial, self.debug_uart)?.into_link())
    }
}
