//! Device discovery
//!
//! Two independent queries, both returning `Ok(None)` when the hardware is
//! simply not there yet:
//! - the serial port of the microcontroller
//! - the hwmon directory exposed by the virtual fan driver
//!
//! When several candidates match, the lexicographically first path wins.

use std::env;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use vfan_core::{Result, SerialConfig, VfanError};

/// Environment variable overriding serial discovery
pub const PORT_ENV_VAR: &str = "VFAN_PORT";

/// Prefix of kernel hwmon device directories
pub const HWMON_PREFIX: &str = "hwmon";

/// Locate the microcontroller's serial port
///
/// Tries, in order:
/// 1. `serial.device` from the configuration
/// 2. the `VFAN_PORT` environment variable
/// 3. USB ports whose vendor id matches `serial.usb_vid`
/// 4. `/dev/serial/by-id` entries whose name contains a configured pattern
pub fn find_serial_device(config: &SerialConfig) -> Result<Option<String>> {
    if let Some(device) = &config.device {
        return Ok(existing_path(device));
    }

    if let Ok(device) = env::var(PORT_ENV_VAR) {
        debug!("Using port from {}: {}", PORT_ENV_VAR, device);
        return Ok(existing_path(&device));
    }

    if let Some(port) = find_usb_port(config.usb_vid)? {
        return Ok(Some(port));
    }

    let by_id = find_by_id(&config.by_id_dir, &config.by_id_patterns)?;
    Ok(by_id.map(|p| p.to_string_lossy().into_owned()))
}

fn existing_path(device: &str) -> Option<String> {
    if Path::new(device).exists() {
        Some(device.to_string())
    } else {
        debug!("Configured serial device {} does not exist yet", device);
        None
    }
}

/// Find a USB serial port by vendor id
pub fn find_usb_port(usb_vid: u16) -> Result<Option<String>> {
    debug!("Searching for USB serial port with VID:0x{:04X}", usb_vid);

    let ports = tokio_serial::available_ports().map_err(|e| {
        warn!("Failed to enumerate serial ports: {}", e);
        VfanError::Hardware(format!("Failed to enumerate ports: {}", e))
    })?;

    let candidates = ports.into_iter().filter_map(|port| match port.port_type {
        tokio_serial::SerialPortType::UsbPort(info) => {
            debug!(
                "  USB Device {} - VID:{:04X} PID:{:04X}",
                port.port_name, info.vid, info.pid
            );
            Some((port.port_name, info.vid))
        }
        _ => None,
    });

    Ok(select_usb_port(candidates, usb_vid))
}

/// Pick the first (by path) candidate whose vendor id matches
pub fn select_usb_port<I>(candidates: I, usb_vid: u16) -> Option<String>
where
    I: IntoIterator<Item = (String, u16)>,
{
    let mut matching: Vec<String> = candidates
        .into_iter()
        .filter(|(_, vid)| *vid == usb_vid)
        .map(|(name, _)| name)
        .collect();
    matching.sort();

    if matching.len() > 1 {
        warn!(
            "{} serial ports match VID:0x{:04X}, using {}",
            matching.len(),
            usb_vid,
            matching[0]
        );
    }
    matching.into_iter().next()
}

/// Find a stable by-id symlink whose name contains one of `patterns`
pub fn find_by_id<S: AsRef<str>>(dir: &Path, patterns: &[S]) -> Result<Option<PathBuf>> {
    let mut names = match sorted_entries(dir) {
        Ok(names) => names,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    names.retain(|name| patterns.iter().any(|p| name.contains(p.as_ref())));

    Ok(names.first().map(|name| {
        debug!("Found serial device by id: {}", name);
        dir.join(name)
    }))
}

/// Locate the hwmon directory whose `device/marker` contains `marker`
///
/// Walks `search_root` depth-first in lexicographic order and stops at the
/// first match. Symlinked directories (which is what `/sys/class/hwmon`
/// holds) are checked but never descended into.
pub fn find_hwmon_root(search_root: &Path, marker: &str) -> Result<Option<PathBuf>> {
    match walk_hwmon(search_root, marker) {
        Ok(found) => Ok(found),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("hwmon search root {} does not exist", search_root.display());
            Ok(None)
        }
        Err(e) => Err(VfanError::Hardware(format!(
            "Failed to scan {}: {}",
            search_root.display(),
            e
        ))),
    }
}

fn walk_hwmon(dir: &Path, marker: &str) -> std::io::Result<Option<PathBuf>> {
    for name in sorted_entries(dir)? {
        let path = dir.join(&name);

        if name.starts_with(HWMON_PREFIX) && has_marker(&path, marker) {
            debug!("Found marked hwmon directory: {}", path.display());
            return Ok(Some(path));
        }

        let is_real_dir = fs::symlink_metadata(&path)
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if is_real_dir {
            match walk_hwmon(&path, marker) {
                Ok(Some(found)) => return Ok(Some(found)),
                Ok(None) => {}
                Err(e) => debug!("Skipping unreadable {}: {}", path.display(), e),
            }
        }
    }
    Ok(None)
}

fn has_marker(hwmon_dir: &Path, marker: &str) -> bool {
    let marker_file = hwmon_dir.join("device").join("marker");
    match fs::read_to_string(&marker_file) {
        Ok(content) => content.contains(marker),
        Err(_) => false,
    }
}

fn sorted_entries(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        names.push(entry?.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}
