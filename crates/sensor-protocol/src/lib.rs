//! Sensor Protocol Library
//!
//! This crate turns raw frames from a Bluetooth chest-strap sensor into
//! normalized [`SensorSample`]s. The supported device is the Zephyr HxM,
//! which streams one fixed-size 60-byte frame per second over the serial
//! port profile:
//!
//! ```text
//! 02 26 37 [55 payload bytes] [crc] 03
//! ```
//!
//! # Architecture
//!
//! - [`hxm::decode`] is a pure function from one frame to a sample or a
//!   [`DecodeError`]. It never panics on malformed input.
//! - [`hxm::HxmFramer`] splits an arbitrary byte stream into frames and
//!   resynchronises after corruption.
//! - [`hxm::encode`] builds frames, which the simulator and the tests use.
//!
//! # Example
//!
//! ```rust
//! use sensor_protocol::hxm::{decode, encode};
//! use sensor_protocol::SensorSample;
//!
//! let sample = SensorSample {
//!     heart_rate_bpm: 72,
//!     ..SensorSample::default()
//! };
//! let frame = encode(&sample);
//!
//! assert_eq!(decode(&frame).unwrap().heart_rate_bpm, 72);
//! ```

pub mod error;
pub mod hxm;
pub mod sample;

pub use error::DecodeError;
pub use hxm::{decode, encode, HxmFramer, FRAME_LEN};
pub use sample::SensorSample;
