//! Connection state and readings

use std::fmt;
use std::time::Duration;

use sensor_protocol::SensorSample;
use serde::{Deserialize, Serialize};

/// Default staleness window for readings (milliseconds)
pub const MAX_READING_AGE_MS: u64 = 5000;

/// Default staleness window for readings
pub const MAX_READING_AGE: Duration = Duration::from_millis(MAX_READING_AGE_MS);

/// State of the single supervised connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No connection requested
    #[default]
    Idle,
    /// Worker is opening the connection
    Connecting,
    /// Connection open, frames flowing
    Connected,
    /// Connection ended (failed to open or dropped)
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// A decoded sample stamped with its arrival time
///
/// Immutable once built; each frame produces a new reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    sample: SensorSample,
    captured_at: Duration,
}

impl SensorReading {
    /// Create a reading captured at the given clock offset
    pub fn new(sample: SensorSample, captured_at: Duration) -> Self {
        Self {
            sample,
            captured_at,
        }
    }

    /// The decoded sample
    pub fn sample(&self) -> &SensorSample {
        &self.sample
    }

    /// Clock offset at which the frame arrived
    pub fn captured_at(&self) -> Duration {
        self.captured_at
    }

    /// Age of the reading at `now` (zero if `now` precedes capture)
    pub fn age(&self, now: Duration) -> Duration {
        now.saturating_sub(self.captured_at)
    }

    /// Whether the reading is at most `max_age` old at `now`
    pub fn is_recent(&self, now: Duration, max_age: Duration) -> bool {
        self.age(now) <= max_age
    }
}
