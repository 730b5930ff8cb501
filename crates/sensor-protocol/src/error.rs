//! Error types for sensor frame decoding

use thiserror::Error;

/// Structural violations found while decoding a frame
///
/// Malformed frames are an expected outcome on a noisy radio link, so every
/// violation is reported as a value rather than a panic.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Frame is not exactly one frame long
    #[error("wrong frame length: expected {expected} bytes, got {actual}")]
    WrongLength { expected: usize, actual: usize },

    /// Start or end delimiter missing
    #[error("bad {which} delimiter: expected 0x{expected:02X}, got 0x{actual:02X}")]
    BadDelimiter {
        which: &'static str,
        expected: u8,
        actual: u8,
    },

    /// Message id is not a data packet
    #[error("unknown frame type: 0x{0:02X}")]
    UnknownFrameType(u8),

    /// Payload length byte disagrees with the frame layout
    #[error("bad payload length: {0}")]
    BadPayloadLength(u8),

    /// Checksum mismatch
    #[error("checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    BadChecksum { expected: u8, actual: u8 },
}

impl DecodeError {
    /// Short, stable name of the violation kind
    pub fn kind(&self) -> &'static str {
        match self {
            DecodeError::WrongLength { .. } => "wrong-length",
            DecodeError::BadDelimiter { .. } => "bad-delimiter",
            DecodeError::UnknownFrameType(_) => "unknown-frame-type",
            DecodeError::BadPayloadLength(_) => "bad-payload-length",
            DecodeError::BadChecksum { .. } => "bad-checksum",
        }
    }
}
