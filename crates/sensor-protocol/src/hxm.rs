//! Zephyr HxM Protocol Implementation
//!
//! The HxM strap pushes one general data packet per second. There is no
//! request/response exchange; the host only reads.
//!
//! # Frame Format
//! ```text
//! STX [msg id] [dlc] [payload; 55] [crc] ETX
//! ```
//!
//! - `STX`: `0x02`
//! - `msg id`: `0x26` for the HxM data packet
//! - `dlc`: payload length, always 55
//! - `crc`: CRC-8 (Dallas/Maxim polynomial) over the payload
//! - `ETX`: `0x03`
//!
//! Multi-byte payload fields are little-endian.

use crc::{Crc, CRC_8_MAXIM_DOW};
use tracing::{debug, warn};

use crate::error::DecodeError;
use crate::sample::SensorSample;

/// Start of text
pub const STX: u8 = 0x02;
/// End of text
pub const ETX: u8 = 0x03;
/// Message id of the HxM general data packet
pub const MSG_ID_DATA: u8 = 0x26;
/// Payload length of the data packet
pub const PAYLOAD_LEN: u8 = 55;
/// Total frame length
pub const FRAME_LEN: usize = 60;

const POS_MSG_ID: usize = 1;
const POS_DLC: usize = 2;
const POS_PAYLOAD: usize = 3;
const POS_CRC: usize = 58;
const POS_ETX: usize = 59;

const POS_FIRMWARE_ID: usize = 3;
const POS_FIRMWARE_VERSION: usize = 5;
const POS_HARDWARE_ID: usize = 7;
const POS_HARDWARE_VERSION: usize = 9;
const POS_BATTERY: usize = 11;
const POS_HEART_RATE: usize = 12;
const POS_HEART_BEAT_NUMBER: usize = 13;
const POS_HEART_BEAT_TIMESTAMPS: usize = 14;
const POS_DISTANCE: usize = 50;
const POS_SPEED: usize = 52;
const POS_STRIDES: usize = 54;

const DISTANCE_UNITS_PER_METER: f32 = 16.0;
const SPEED_UNITS_PER_MPS: f32 = 256.0;

/// Maximum number of bytes the framer holds while waiting for a frame
const MAX_BUFFER_LEN: usize = FRAME_LEN * 4;

const HXM_CRC: Crc<u8> = Crc::<u8>::new(&CRC_8_MAXIM_DOW);

/// Compute the checksum of a frame's payload
pub fn checksum(payload: &[u8]) -> u8 {
    HXM_CRC.checksum(payload)
}

fn read_u16(frame: &[u8], pos: usize) -> u16 {
    u16::from_le_bytes([frame[pos], frame[pos + 1]])
}

fn write_u16(frame: &mut [u8], pos: usize, value: u16) {
    frame[pos..pos + 2].copy_from_slice(&value.to_le_bytes());
}

/// Decode one complete frame
///
/// Shape is validated before any field is read, so every input either yields
/// a sample or names the first violation found.
pub fn decode(frame: &[u8]) -> Result<SensorSample, DecodeError> {
    if frame.len() != FRAME_LEN {
        return Err(DecodeError::WrongLength {
            expected: FRAME_LEN,
            actual: frame.len(),
        });
    }
    if frame[0] != STX {
        return Err(DecodeError::BadDelimiter {
            which: "start",
            expected: STX,
            actual: frame[0],
        });
    }
    if frame[POS_MSG_ID] != MSG_ID_DATA {
        return Err(DecodeError::UnknownFrameType(frame[POS_MSG_ID]));
    }
    if frame[POS_DLC] != PAYLOAD_LEN {
        return Err(DecodeError::BadPayloadLength(frame[POS_DLC]));
    }
    if frame[POS_ETX] != ETX {
        return Err(DecodeError::BadDelimiter {
            which: "end",
            expected: ETX,
            actual: frame[POS_ETX],
        });
    }

    let expected = checksum(&frame[POS_PAYLOAD..POS_CRC]);
    let actual = frame[POS_CRC];
    if expected != actual {
        return Err(DecodeError::BadChecksum { expected, actual });
    }

    let mut heart_beat_timestamps_ms = [0u16; 15];
    for (i, ts) in heart_beat_timestamps_ms.iter_mut().enumerate() {
        *ts = read_u16(frame, POS_HEART_BEAT_TIMESTAMPS + i * 2);
    }

    Ok(SensorSample {
        heart_rate_bpm: frame[POS_HEART_RATE],
        battery_percent: frame[POS_BATTERY],
        heart_beat_number: frame[POS_HEART_BEAT_NUMBER],
        heart_beat_timestamps_ms,
        distance_m: f32::from(read_u16(frame, POS_DISTANCE)) / DISTANCE_UNITS_PER_METER,
        speed_mps: f32::from(read_u16(frame, POS_SPEED)) / SPEED_UNITS_PER_MPS,
        strides: frame[POS_STRIDES],
        firmware_id: read_u16(frame, POS_FIRMWARE_ID),
        firmware_version: read_u16(frame, POS_FIRMWARE_VERSION),
        hardware_id: read_u16(frame, POS_HARDWARE_ID),
        hardware_version: read_u16(frame, POS_HARDWARE_VERSION),
    })
}

/// Encode a sample into a data packet
///
/// Distance and speed are quantized to the device's resolution and saturate
/// at the field width.
pub fn encode(sample: &SensorSample) -> [u8; FRAME_LEN] {
    let mut frame = [0u8; FRAME_LEN];
    frame[0] = STX;
    frame[POS_MSG_ID] = MSG_ID_DATA;
    frame[POS_DLC] = PAYLOAD_LEN;

    write_u16(&mut frame, POS_FIRMWARE_ID, sample.firmware_id);
    write_u16(&mut frame, POS_FIRMWARE_VERSION, sample.firmware_version);
    write_u16(&mut frame, POS_HARDWARE_ID, sample.hardware_id);
    write_u16(&mut frame, POS_HARDWARE_VERSION, sample.hardware_version);
    frame[POS_BATTERY] = sample.battery_percent;
    frame[POS_HEART_RATE] = sample.heart_rate_bpm;
    frame[POS_HEART_BEAT_NUMBER] = sample.heart_beat_number;
    for (i, ts) in sample.heart_beat_timestamps_ms.iter().enumerate() {
        write_u16(&mut frame, POS_HEART_BEAT_TIMESTAMPS + i * 2, *ts);
    }
    write_u16(
        &mut frame,
        POS_DISTANCE,
        (sample.distance_m * DISTANCE_UNITS_PER_METER).round() as u16,
    );
    write_u16(
        &mut frame,
        POS_SPEED,
        (sample.speed_mps * SPEED_UNITS_PER_MPS).round() as u16,
    );
    frame[POS_STRIDES] = sample.strides;

    frame[POS_CRC] = checksum(&frame[POS_PAYLOAD..POS_CRC]);
    frame[POS_ETX] = ETX;
    frame
}

/// Streaming HxM framer
///
/// Accepts bytes in whatever chunks the transport delivers and yields the
/// decode outcome of each frame-sized window that starts on `STX`.
///
/// A corrupt window is reported once. The framer then advances one byte at a
/// time, silently skipping windows that fail to decode, until a frame decodes
/// again. A stray `STX` in front of a good frame therefore never costs that
/// frame, and a corrupt frame whose payload contains `STX` bytes yields a
/// single error.
#[derive(Debug, Default)]
pub struct HxmFramer {
    buffer: Vec<u8>,
    resyncing: bool,
}

impl HxmFramer {
    /// Create a new framer
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MAX_BUFFER_LEN),
            resyncing: false,
        }
    }

    /// Push raw bytes into the framer's buffer
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
        if self.buffer.len() > MAX_BUFFER_LEN {
            let excess = self.buffer.len() - MAX_BUFFER_LEN;
            warn!("HxM buffer overflow, dropping {} stale bytes", excess);
            self.buffer.drain(..excess);
        }
    }

    /// Try to extract the next frame from the buffer
    ///
    /// Returns `None` when more bytes are needed.
    pub fn next_frame(&mut self) -> Option<Result<SensorSample, DecodeError>> {
        loop {
            match self.buffer.iter().position(|&b| b == STX) {
                None => {
                    if !self.buffer.is_empty() {
                        debug!("Discarding {} bytes without frame start", self.buffer.len());
                        self.buffer.clear();
                    }
                    return None;
                }
                Some(0) => {}
                Some(start) => {
                    debug!("Discarding {} bytes before frame start", start);
                    self.buffer.drain(..start);
                }
            }

            if self.buffer.len() < FRAME_LEN {
                return None;
            }

            match decode(&self.buffer[..FRAME_LEN]) {
                Ok(sample) => {
                    self.buffer.drain(..FRAME_LEN);
                    self.resyncing = false;
                    return Some(Ok(sample));
                }
                Err(e) => {
                    // Only the STX is consumed; the next window may start inside this one
                    self.buffer.drain(..1);
                    if self.resyncing {
                        continue;
                    }
                    self.resyncing = true;
                    return Some(Err(e));
                }
            }
        }
    }

    /// Number of bytes waiting for a complete frame
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the internal buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.resyncing = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> SensorSample {
        SensorSample {
            heart_rate_bpm: 142,
            battery_percent: 87,
            heart_beat_number: 201,
            heart_beat_timestamps_ms: [
                61_000, 60_580, 60_160, 59_740, 59_320, 58_900, 58_480, 58_060, 57_640, 57_220,
                56_800, 56_380, 55_960, 55_540, 55_120,
            ],
            distance_m: 1234.5625,
            speed_mps: 3.25,
            strides: 77,
            firmware_id: 0x1A2B,
            firmware_version: 0x0041,
            hardware_id: 0x1A30,
            hardware_version: 0x0031,
        }
    }

    #[test]
    fn test_crc_check_value() {
        // Standard check input for CRC-8/MAXIM-DOW
        assert_eq!(checksum(b"123456789"), 0xA1);
    }

    #[test]
    fn test_decode_encoded_frame() {
        let frame = encode(&sample());
        assert_eq!(frame[0], STX);
        assert_eq!(frame[FRAME_LEN - 1], ETX);

        let decoded = decode(&frame).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn test_decode_field_positions() {
        let mut frame = encode(&SensorSample::default());
        frame[POS_HEART_RATE] = 65;
        frame[POS_BATTERY] = 50;
        frame[POS_DISTANCE] = 0x20; // 32 sixteenths = 2 m
        frame[POS_SPEED + 1] = 0x01; // 256/256 = 1 m/s
        frame[POS_CRC] = checksum(&frame[POS_PAYLOAD..POS_CRC]);

        let decoded = decode(&frame).unwrap();
        assert_eq!(decoded.heart_rate_bpm, 65);
        assert_eq!(decoded.battery_percent, 50);
        assert_eq!(decoded.distance_m, 2.0);
        assert_eq!(decoded.speed_mps, 1.0);
    }

    #[test]
    fn test_wrong_length() {
        let frame = encode(&sample());
        assert_eq!(
            decode(&frame[..59]),
            Err(DecodeError::WrongLength {
                expected: 60,
                actual: 59
            })
        );
        assert_eq!(decode(&[]).unwrap_err().kind(), "wrong-length");
    }

    #[test]
    fn test_bad_checksum() {
        let mut frame = encode(&sample());
        frame[POS_HEART_RATE] ^= 0xFF;
        let err = decode(&frame).unwrap_err();
        assert!(matches!(err, DecodeError::BadChecksum { .. }));
    }

    #[test]
    fn test_unknown_frame_type() {
        let mut frame = encode(&sample());
        frame[POS_MSG_ID] = 0x23;
        assert_eq!(decode(&frame), Err(DecodeError::UnknownFrameType(0x23)));
    }

    #[test]
    fn test_bad_delimiters() {
        let mut frame = encode(&sample());
        frame[POS_ETX] = 0x00;
        assert!(matches!(
            decode(&frame),
            Err(DecodeError::BadDelimiter { which: "end", .. })
        ));

        let mut frame = encode(&sample());
        frame[0] = 0x7F;
        assert!(matches!(
            decode(&frame),
            Err(DecodeError::BadDelimiter { which: "start", .. })
        ));
    }

    #[test]
    fn test_bad_payload_length() {
        let mut frame = encode(&sample());
        frame[POS_DLC] = 54;
        assert_eq!(decode(&frame), Err(DecodeError::BadPayloadLength(54)));
    }

    #[test]
    fn test_framer_partial_data() {
        let frame = encode(&sample());
        let mut framer = HxmFramer::new();

        framer.push_bytes(&frame[..25]);
        assert!(framer.next_frame().is_none());

        framer.push_bytes(&frame[25..]);
        assert_eq!(framer.next_frame(), Some(Ok(sample())));
        assert!(framer.next_frame().is_none());
        assert_eq!(framer.buffered_len(), 0);
    }

    #[test]
    fn test_framer_skips_leading_garbage() {
        let mut framer = HxmFramer::new();
        framer.push_bytes(&[0xFF, 0x10, 0x42]);
        framer.push_bytes(&encode(&sample()));

        assert_eq!(framer.next_frame(), Some(Ok(sample())));
    }

    #[test]
    fn test_framer_recovers_after_corrupt_frame() {
        let mut bad = encode(&sample());
        bad[POS_CRC] ^= 0x01;
        let good = encode(&SensorSample {
            heart_rate_bpm: 99,
            ..sample()
        });

        let mut framer = HxmFramer::new();
        framer.push_bytes(&bad);
        framer.push_bytes(&good);

        assert!(matches!(
            framer.next_frame(),
            Some(Err(DecodeError::BadChecksum { .. }))
        ));
        assert_eq!(framer.next_frame().unwrap().unwrap().heart_rate_bpm, 99);
        assert!(framer.next_frame().is_none());
    }

    #[test]
    fn test_framer_keeps_frame_after_stray_stx() {
        let good = |bpm| {
            encode(&SensorSample {
                heart_rate_bpm: bpm,
                ..sample()
            })
        };

        let mut framer = HxmFramer::new();
        framer.push_bytes(&[STX]);
        framer.push_bytes(&good(80));
        framer.push_bytes(&good(81));

        assert!(matches!(
            framer.next_frame(),
            Some(Err(DecodeError::UnknownFrameType(STX)))
        ));
        assert_eq!(framer.next_frame().unwrap().unwrap().heart_rate_bpm, 80);
        assert_eq!(framer.next_frame().unwrap().unwrap().heart_rate_bpm, 81);
        assert!(framer.next_frame().is_none());
    }

    #[test]
    fn test_framer_one_error_per_corrupt_frame() {
        let mut timestamps = sample().heart_beat_timestamps_ms;
        // Encodes as 03 02, an ETX STX pair inside the payload
        timestamps[0] = 0x0203;
        let mut bad = encode(&SensorSample {
            heart_beat_timestamps_ms: timestamps,
            ..sample()
        });
        bad[POS_CRC] ^= 0x01;
        let good = encode(&SensorSample {
            heart_rate_bpm: 90,
            ..sample()
        });

        let mut framer = HxmFramer::new();
        framer.push_bytes(&bad);
        framer.push_bytes(&good);

        let mut outcomes = Vec::new();
        while let Some(outcome) = framer.next_frame() {
            outcomes.push(outcome.map(|s| s.heart_rate_bpm).map_err(|e| e.kind()));
        }
        assert_eq!(outcomes, vec![Err("bad-checksum"), Ok(90)]);
    }

    #[test]
    fn test_framer_reports_again_after_recovery() {
        let mut bad = encode(&sample());
        bad[POS_CRC] ^= 0x01;
        let good = encode(&sample());

        let mut framer = HxmFramer::new();
        for chunk in [&bad, &good, &bad, &good] {
            framer.push_bytes(chunk);
        }

        let errors = std::iter::from_fn(|| framer.next_frame())
            .filter(Result::is_err)
            .count();
        assert_eq!(errors, 2);
    }

    #[test]
    fn test_framer_bounded_buffer() {
        let mut framer = HxmFramer::new();
        // A long run of STX bytes never decodes but must not grow unbounded
        for _ in 0..10 {
            framer.push_bytes(&[STX; 100]);
        }
        assert!(framer.buffered_len() <= MAX_BUFFER_LEN);
    }

    proptest! {
        #[test]
        fn decode_never_panics(data in prop::collection::vec(any::<u8>(), 0..128)) {
            let _ = decode(&data);
        }

        #[test]
        fn decode_is_deterministic(data in prop::collection::vec(any::<u8>(), 60..=60)) {
            prop_assert_eq!(decode(&data), decode(&data));
        }

        #[test]
        fn framer_never_panics(chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..90), 0..10)) {
            let mut framer = HxmFramer::new();
            for chunk in &chunks {
                framer.push_bytes(chunk);
                while framer.next_frame().is_some() {}
            }
            prop_assert!(framer.buffered_len() < FRAME_LEN);
        }

        #[test]
        fn framer_reassembles_any_split(split in 1usize..FRAME_LEN, hr in any::<u8>()) {
            let frame = encode(&SensorSample { heart_rate_bpm: hr, ..SensorSample::default() });
            let mut framer = HxmFramer::new();
            framer.push_bytes(&frame[..split]);
            prop_assert!(framer.next_frame().is_none());
            framer.push_bytes(&frame[split..]);
            let decoded = framer.next_frame().unwrap().unwrap();
            prop_assert_eq!(decoded.heart_rate_bpm, hr);
        }
    }
}
