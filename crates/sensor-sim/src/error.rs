//! Simulation errors

use sensor_link::ResolutionError;
use thiserror::Error;

/// Errors that can occur while setting up the simulation
#[derive(Debug, Error)]
pub enum SimError {
    /// Constructed outside a tokio runtime
    #[error("simulated radio must be created inside a tokio runtime")]
    NoRuntime,

    /// Two straps share an address
    #[error("a virtual strap is already registered at {0}")]
    DuplicateDevice(String),

    /// Strap address is not a Bluetooth MAC
    #[error("invalid virtual strap address: {0}")]
    InvalidAddress(#[from] ResolutionError),
}
