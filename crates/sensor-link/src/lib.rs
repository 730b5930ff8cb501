//! Sensor Connection Supervisor
//!
//! This crate manages the lifecycle of one connection to a streaming
//! Bluetooth sensor and exposes the latest decoded reading under a freshness
//! policy.
//!
//! # Architecture
//!
//! - [`PlatformRadio`] owns the host radio adapter on a dedicated thread and
//!   hands it out through a bounded request/response wait
//! - [`DeviceConnectionWorker`] opens the device in its own task, decodes
//!   frames and reports everything as [`LifecycleEvent`]s
//! - [`ConnectionSupervisor`] owns at most one worker, applies its events in
//!   order and answers queries
//!
//! Every event carries the [`Generation`] of the worker that produced it.
//! Starting a connection stops and joins the previous worker first, so an
//! old worker's event can never be mistaken for the new one's.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use sensor_link::{
//!     ConnectionSupervisor, DeviceAddress, MonotonicClock, PlatformRadio, RfcommAdapter,
//!     RfcommBinding, SupervisorConfig,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let binding = RfcommBinding {
//!     address: DeviceAddress::new("00:07:80:12:34:56"),
//!     port: "/dev/rfcomm0".to_string(),
//!     label: Some("HXM012345".to_string()),
//! };
//! let radio = PlatformRadio::with_adapter(Arc::new(RfcommAdapter::new([binding], 115_200)))?;
//! let (notify_tx, _notify_rx) = tokio::sync::mpsc::unbounded_channel();
//!
//! let mut supervisor = ConnectionSupervisor::new(
//!     radio,
//!     Arc::new(MonotonicClock::new()),
//!     SupervisorConfig::default(),
//!     notify_tx,
//! )
//! .await;
//!
//! supervisor.start(DeviceAddress::new("00:07:80:12:34:56")).await?;
//! let event = supervisor.next_event().await;
//! println!("{:?}, fresh: {}", event, supervisor.is_reading_fresh(Duration::from_secs(5)));
//! supervisor.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod actor;
pub mod address;
pub mod clock;
pub mod error;
pub mod events;
pub mod radio;
pub mod serial;
pub mod state;
pub mod supervisor;
pub mod worker;

// Re-export actor types
pub use actor::{run_supervisor_actor, spawn_supervisor, SupervisorCommand, SupervisorHandle};

pub use address::DeviceAddress;
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use error::{LinkError, ResolutionError};
pub use events::{Generation, LifecycleEvent, Notification, WorkerFault, WorkerMessage};
pub use radio::{
    AdapterFactory, BoxTransport, DeviceConnector, DeviceHandle, PlatformRadio, RadioAdapter,
    DEFAULT_RESOLVE_TIMEOUT,
};
pub use serial::{available_rfcomm_ports, RfcommAdapter, RfcommBinding, SerialConnector};
pub use state::{ConnectionState, SensorReading, MAX_READING_AGE, MAX_READING_AGE_MS};
pub use supervisor::{ConnectionSupervisor, SupervisorConfig};
pub use worker::{DeviceConnectionWorker, WorkerConfig, DEFAULT_READ_TIMEOUT};
