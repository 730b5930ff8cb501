//! Simulated radio adapter
//!
//! Implements [`RadioAdapter`] over a set of virtual straps. Opening a device
//! creates an in-memory duplex link and spawns the strap's task on the
//! runtime the adapter was created in.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use sensor_link::{
    BoxTransport, DeviceAddress, DeviceConnector, DeviceHandle, RadioAdapter, ResolutionError,
};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::device::{VirtualHxm, VirtualHxmConfig};
use crate::device_task::{run_virtual_device_task, VirtualDeviceCommand};
use crate::error::SimError;

const LINK_BUFFER: usize = 4096;
const COMMAND_CAPACITY: usize = 16;

/// Control channels of currently linked straps, keyed by canonical address
type Controls = Arc<Mutex<HashMap<String, mpsc::Sender<VirtualDeviceCommand>>>>;

/// Radio adapter whose devices are virtual straps
#[derive(Debug)]
pub struct SimulatedRadio {
    enabled: AtomicBool,
    devices: HashMap<String, VirtualHxmConfig>,
    controls: Controls,
    runtime: Handle,
}

impl SimulatedRadio {
    /// Create an adapter bound to the current tokio runtime
    pub fn new() -> Result<Self, SimError> {
        let runtime = Handle::try_current().map_err(|_| SimError::NoRuntime)?;
        Ok(Self {
            enabled: AtomicBool::new(true),
            devices: HashMap::new(),
            controls: Arc::new(Mutex::new(HashMap::new())),
            runtime,
        })
    }

    /// Create an adapter with the given straps
    pub fn with_devices(
        configs: impl IntoIterator<Item = VirtualHxmConfig>,
    ) -> Result<Self, SimError> {
        let mut radio = Self::new()?;
        for config in configs {
            radio.add_device(config)?;
        }
        Ok(radio)
    }

    /// Register a strap
    pub fn add_device(&mut self, config: VirtualHxmConfig) -> Result<(), SimError> {
        let key = DeviceAddress::new(config.address.as_str()).canonical()?;
        if self.devices.contains_key(&key) {
            return Err(SimError::DuplicateDevice(key));
        }
        info!("Registered virtual strap {} at {}", config.label, key);
        self.devices.insert(key, config);
        Ok(())
    }

    /// Number of registered straps
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Switch the simulated radio on or off
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Control channel of the strap at `address`, if it is currently linked
    pub fn controller(&self, address: &DeviceAddress) -> Option<mpsc::Sender<VirtualDeviceCommand>> {
        let key = address.canonical().ok()?;
        let controls = self.controls.lock().unwrap_or_else(PoisonError::into_inner);
        controls.get(&key).filter(|tx| !tx.is_closed()).cloned()
    }
}

impl RadioAdapter for SimulatedRadio {
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn lookup_device(&self, address: &DeviceAddress) -> Result<DeviceHandle, ResolutionError> {
        let key = address.canonical()?;
        let config = self
            .devices
            .get(&key)
            .ok_or_else(|| ResolutionError::UnknownDevice(address.to_string()))?;

        let connector = SimulatedConnector {
            key,
            config: config.clone(),
            controls: Arc::clone(&self.controls),
            runtime: self.runtime.clone(),
        };
        Ok(DeviceHandle::new(
            address.clone(),
            config.label.clone(),
            Arc::new(connector),
        ))
    }
}

/// Opens an in-memory link to one virtual strap
struct SimulatedConnector {
    key: String,
    config: VirtualHxmConfig,
    controls: Controls,
    runtime: Handle,
}

impl DeviceConnector for SimulatedConnector {
    fn open(&self) -> io::Result<BoxTransport> {
        let (local, remote) = tokio::io::duplex(LINK_BUFFER);
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CAPACITY);
        let device = VirtualHxm::from_config(self.config.clone());
        let label = self.config.label.clone();

        self.controls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(self.key.clone(), cmd_tx);

        self.runtime.spawn(async move {
            match run_virtual_device_task(remote, device, cmd_rx).await {
                Ok(exit) => debug!("Virtual strap {} exited: {:?}", label, exit),
                Err(e) => warn!("Virtual strap {} failed: {}", label, e),
            }
        });

        debug!("Opened simulated link to {}", self.key);
        Ok(Box::new(local))
    }
}
