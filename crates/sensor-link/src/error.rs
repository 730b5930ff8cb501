//! Error types for the connection supervisor

use thiserror::Error;

use crate::address::DeviceAddress;

/// Reasons an address cannot be turned into a reachable device
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    /// Address is not syntactically valid for the adapter
    #[error("malformed device address: {0}")]
    Malformed(String),

    /// Adapter knows no device at this address
    #[error("no device known at {0}")]
    UnknownDevice(String),

    /// No radio adapter could be obtained
    #[error("no radio adapter available")]
    NoAdapter,
}

/// Errors returned by supervisor operations
///
/// None of these cross the worker boundary; worker failures travel as
/// [`LifecycleEvent::Error`](crate::events::LifecycleEvent::Error).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// Radio adapter missing or switched off
    #[error("radio adapter is unavailable or disabled")]
    RadioDisabled,

    /// Settings hold the "none" sentinel
    #[error("no sensor device configured")]
    NoDeviceConfigured,

    /// Address did not resolve to a device
    #[error("cannot resolve device {address}: {source}")]
    Resolution {
        /// Offending address
        address: DeviceAddress,
        /// Why resolution failed
        #[source]
        source: ResolutionError,
    },

    /// The supervisor actor has shut down
    #[error("supervisor is no longer running")]
    SupervisorClosed,
}

impl LinkError {
    /// Whether this is a configuration problem rather than a device problem
    pub fn is_configuration(&self) -> bool {
        matches!(self, LinkError::RadioDisabled | LinkError::NoDeviceConfigured)
    }
}
