//! Sensor Simulation Library
//!
//! This crate provides a simulation layer for running the connection
//! supervisor without a physical strap or Bluetooth radio. It includes:
//!
//! - **VirtualHxm**: Simulates a Zephyr HxM strap with protocol-accurate frames
//! - **SimulatedRadio**: A radio adapter whose devices are virtual straps
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use sensor_sim::{VirtualHxm, VirtualHxmConfig};
//!
//! let mut strap = VirtualHxm::from_config(VirtualHxmConfig::default());
//!
//! // One frame per simulated second
//! let frame = strap.next_frame(Duration::from_secs(1));
//! let sample = sensor_protocol::decode(&frame).unwrap();
//! println!("{} bpm", sample.heart_rate_bpm);
//! ```

pub mod adapter;
pub mod device;
pub mod device_task;
pub mod error;

pub use adapter::SimulatedRadio;
pub use device::{VirtualHxm, VirtualHxmConfig};
pub use device_task::{run_virtual_device_task, DeviceExit, VirtualDeviceCommand};
pub use error::SimError;
