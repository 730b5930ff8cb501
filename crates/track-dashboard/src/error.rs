//! Error types for the dashboard hand-off

use thiserror::Error;

/// Errors that can occur building or reading a dashboard request
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DashboardError {
    /// Content authority is empty or not a valid host
    #[error("invalid content authority: {0:?}")]
    InvalidAuthority(String),

    /// A locator could not be parsed
    #[error("invalid resource locator {locator:?}: {reason}")]
    InvalidLocator {
        /// Offending text
        locator: String,
        /// Parser message
        reason: String,
    },

    /// The payload key is missing or has the wrong shape
    #[error("request has no resource payload")]
    MissingPayload,

    /// A track id in a locator is not an integer
    #[error("invalid track id: {0:?}")]
    BadTrackId(String),

    /// The viewer could not be started
    #[error("failed to launch viewer: {0}")]
    LaunchFailed(String),
}
