//! Lifecycle events and user notifications
//!
//! Workers report everything, including failures, as [`LifecycleEvent`]s on
//! a single ordered channel. The supervisor is the only consumer and the
//! only mutator of connection state.

use sensor_protocol::DecodeError;
use thiserror::Error;

use crate::address::DeviceAddress;
use crate::state::SensorReading;

/// Monotonically increasing tag of a connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(pub u64);

impl Generation {
    /// The generation after this one
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Get the raw generation number
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Failure reported by a worker
#[derive(Debug, Error, Clone, PartialEq)]
pub enum WorkerFault {
    /// The connection could not be opened
    #[error("failed to open connection to {label}: {reason}")]
    OpenFailed {
        /// Device label
        label: String,
        /// Underlying error message
        reason: String,
    },

    /// A frame failed to decode
    #[error("malformed frame: {0}")]
    Decode(#[from] DecodeError),
}

impl WorkerFault {
    /// Whether the connection cannot continue after this fault
    pub fn is_unrecoverable(&self) -> bool {
        match self {
            WorkerFault::OpenFailed { .. } => true,
            WorkerFault::Decode(_) => false,
        }
    }
}

/// Event emitted by a connection worker
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    /// Connection attempt started
    Connecting,
    /// Connection established
    Connected {
        /// Human-readable device label
        label: String,
    },
    /// A frame decoded successfully
    DataReceived {
        /// The new reading
        reading: SensorReading,
    },
    /// Connection ended; the worker stops after emitting this
    Disconnected {
        /// Human-readable device label
        label: String,
    },
    /// Something went wrong
    Error {
        /// What went wrong
        cause: WorkerFault,
    },
}

impl LifecycleEvent {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleEvent::Connecting => "connecting",
            LifecycleEvent::Connected { .. } => "connected",
            LifecycleEvent::DataReceived { .. } => "data",
            LifecycleEvent::Disconnected { .. } => "disconnected",
            LifecycleEvent::Error { .. } => "error",
        }
    }
}

/// Event tagged with the generation of the worker that produced it
#[derive(Debug, Clone)]
pub struct WorkerMessage {
    /// Producing worker's generation
    pub generation: Generation,
    /// The event
    pub event: LifecycleEvent,
}

/// User-visible message for the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// "Connected to {label}"
    Connected {
        /// Device label
        label: String,
    },
    /// "Disconnected from {label}"
    Disconnected {
        /// Device label
        label: String,
    },
    /// "Sensor {address} is not known"
    DeviceUnknown {
        /// Configured address
        address: DeviceAddress,
    },
}

impl std::fmt::Display for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notification::Connected { label } => write!(f, "Connected to {}", label),
            Notification::Disconnected { label } => write!(f, "Disconnected from {}", label),
            Notification::DeviceUnknown { address } => {
                write!(f, "Sensor {} is not known", address)
            }
        }
    }
}
