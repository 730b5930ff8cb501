//! RFCOMM serial transport
//!
//! Serial-port-profile sensors show up on the host as RFCOMM tty bindings
//! (`/dev/rfcomm0` and so on, or a COM port on Windows). [`RfcommAdapter`]
//! maps configured Bluetooth addresses to those ports and opens them with
//! `tokio-serial`.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

use crate::address::DeviceAddress;
use crate::error::ResolutionError;
use crate::radio::{BoxTransport, DeviceConnector, DeviceHandle, RadioAdapter};

/// Default baud rate for RFCOMM bindings (ignored by most kernels)
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Where the kernel lists Bluetooth host controllers
#[cfg(target_os = "linux")]
const CONTROLLER_DIR: &str = "/sys/class/bluetooth";

/// Persisted mapping from a sensor address to its serial port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RfcommBinding {
    /// Bluetooth address of the sensor
    pub address: DeviceAddress,
    /// Serial port bound to that address
    pub port: String,
    /// Display name; defaults to the address
    #[serde(default)]
    pub label: Option<String>,
}

/// Radio adapter backed by RFCOMM serial bindings
#[derive(Debug, Clone)]
pub struct RfcommAdapter {
    bindings: HashMap<String, RfcommBinding>,
    baud_rate: u32,
}

impl RfcommAdapter {
    /// Build an adapter from bindings; malformed addresses are skipped
    pub fn new(bindings: impl IntoIterator<Item = RfcommBinding>, baud_rate: u32) -> Self {
        let mut map = HashMap::new();
        for binding in bindings {
            match binding.address.canonical() {
                Ok(key) => {
                    debug!("RFCOMM binding {} -> {}", key, binding.port);
                    map.insert(key, binding);
                }
                Err(e) => warn!("Ignoring RFCOMM binding for {}: {}", binding.port, e),
            }
        }
        Self {
            bindings: map,
            baud_rate,
        }
    }

    /// Number of usable bindings
    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }
}

impl RadioAdapter for RfcommAdapter {
    fn is_enabled(&self) -> bool {
        host_has_controller()
    }

    fn lookup_device(&self, address: &DeviceAddress) -> Result<DeviceHandle, ResolutionError> {
        let key = address.canonical()?;
        let binding = self
            .bindings
            .get(&key)
            .ok_or_else(|| ResolutionError::UnknownDevice(address.to_string()))?;

        let label = binding.label.clone().unwrap_or_else(|| key.clone());
        let connector = SerialConnector::new(binding.port.clone(), self.baud_rate);
        Ok(DeviceHandle::new(address.clone(), label, Arc::new(connector)))
    }
}

#[cfg(target_os = "linux")]
fn host_has_controller() -> bool {
    let entries = match std::fs::read_dir(CONTROLLER_DIR) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Cannot read {}: {}", CONTROLLER_DIR, e);
            return false;
        }
    };

    entries
        .filter_map(Result::ok)
        .any(|entry| entry.file_name().to_string_lossy().starts_with("hci"))
}

#[cfg(not(target_os = "linux"))]
fn host_has_controller() -> bool {
    true
}

/// Opens one serial port
#[derive(Debug, Clone)]
pub struct SerialConnector {
    port: String,
    baud_rate: u32,
}

impl SerialConnector {
    /// Create a connector for `port`
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
        }
    }

    /// Port this connector opens
    pub fn port(&self) -> &str {
        &self.port
    }
}

impl DeviceConnector for SerialConnector {
    fn open(&self) -> io::Result<BoxTransport> {
        info!("Opening {} at {} baud", self.port, self.baud_rate);
        let stream = tokio_serial::new(&self.port, self.baud_rate)
            .timeout(Duration::from_millis(100))
            .open_native_async()
            .map_err(io::Error::from)?;
        Ok(Box::new(stream))
    }
}

/// Serial ports that look like RFCOMM bindings
pub fn available_rfcomm_ports() -> Vec<String> {
    match tokio_serial::available_ports() {
        Ok(ports) => ports
            .into_iter()
            .map(|p| p.port_name)
            .filter(|name| name.contains("rfcomm"))
            .collect(),
        Err(e) => {
            warn!("Failed to enumerate serial ports: {}", e);
            Vec::new()
        }
    }
}
