//! Virtual HxM strap
//!
//! Produces a plausible stream of heart-rate and speed frames for a runner,
//! encoded exactly as the real strap does.

use std::time::Duration;

use sensor_protocol::{encode, SensorSample, FRAME_LEN};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Distance field rolls over at 4096 m (u16 in 1/16 m)
const DISTANCE_ROLLOVER_M: f32 = 4096.0;

/// Identifiers reported by the simulated strap
const FIRMWARE_ID: u16 = 0x1A26;
const FIRMWARE_VERSION: u16 = 0x4F30;
const HARDWARE_ID: u16 = 0x1A00;
const HARDWARE_VERSION: u16 = 0x4E31;

/// Configuration for creating a virtual strap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualHxmConfig {
    /// Bluetooth address the simulated radio exposes
    pub address: String,
    /// Display name
    pub label: String,
    /// Resting heart rate the signal oscillates around
    pub heart_rate_bpm: u8,
    /// Peak deviation from `heart_rate_bpm`
    pub heart_rate_variation: u8,
    /// Running speed
    pub speed_mps: f32,
    /// Distance covered per stride
    pub stride_length_m: f32,
    /// Reported battery charge
    pub battery_percent: u8,
    /// Time between frames
    pub frame_interval_ms: u64,
    /// Corrupt every nth frame's checksum (0 = never)
    pub corrupt_every: u32,
}

impl Default for VirtualHxmConfig {
    fn default() -> Self {
        Self {
            address: "00:07:80:5E:50:01".to_string(),
            label: "HXM-SIM".to_string(),
            heart_rate_bpm: 72,
            heart_rate_variation: 8,
            speed_mps: 2.8,
            stride_length_m: 1.2,
            battery_percent: 85,
            frame_interval_ms: 1000,
            corrupt_every: 0,
        }
    }
}

/// A simulated strap
#[derive(Debug)]
pub struct VirtualHxm {
    config: VirtualHxmConfig,
    /// Time since the strap started
    elapsed: Duration,
    heart_beat_number: u8,
    /// Strap-local millisecond clock of the last beat
    last_beat_ms: u16,
    /// Time since the last beat
    since_beat: Duration,
    /// Newest first
    beat_timestamps: [u16; 15],
    distance_m: f32,
    stride_fraction: f32,
    strides: u8,
    frames: u64,
}

impl VirtualHxm {
    /// Create a strap from configuration
    pub fn from_config(config: VirtualHxmConfig) -> Self {
        Self {
            config,
            elapsed: Duration::ZERO,
            heart_beat_number: 0,
            last_beat_ms: 0,
            since_beat: Duration::ZERO,
            beat_timestamps: [0; 15],
            distance_m: 0.0,
            stride_fraction: 0.0,
            strides: 0,
            frames: 0,
        }
    }

    /// Get the strap's configuration
    pub fn config(&self) -> &VirtualHxmConfig {
        &self.config
    }

    /// Display name
    pub fn label(&self) -> &str {
        &self.config.label
    }

    /// Number of frames produced so far
    pub fn frames_sent(&self) -> u64 {
        self.frames
    }

    /// Frame interval as a duration
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.config.frame_interval_ms.max(1))
    }

    /// Change the resting heart rate
    pub fn set_heart_rate(&mut self, bpm: u8) {
        self.config.heart_rate_bpm = bpm;
    }

    /// Change the running speed
    pub fn set_speed(&mut self, mps: f32) {
        self.config.speed_mps = mps.max(0.0);
    }

    /// Heart rate at the current instant
    fn current_heart_rate(&self) -> u8 {
        let base = f32::from(self.config.heart_rate_bpm);
        let amplitude = f32::from(self.config.heart_rate_variation);
        // One slow oscillation per minute
        let phase = self.elapsed.as_secs_f32() * std::f32::consts::TAU / 60.0;
        (base + amplitude * phase.sin()).clamp(0.0, 255.0).round() as u8
    }

    /// Advance the simulation and return the sample at the new instant
    pub fn tick(&mut self, dt: Duration) -> SensorSample {
        self.elapsed += dt;
        let heart_rate = self.current_heart_rate();

        if heart_rate > 0 {
            let beat_period = Duration::from_millis(60_000 / u64::from(heart_rate));
            self.since_beat += dt;
            while self.since_beat >= beat_period {
                self.since_beat -= beat_period;
                let period_ms = u16::try_from(beat_period.as_millis()).unwrap_or(u16::MAX);
                self.last_beat_ms = self.last_beat_ms.wrapping_add(period_ms);
                self.beat_timestamps.rotate_right(1);
                self.beat_timestamps[0] = self.last_beat_ms;
                self.heart_beat_number = self.heart_beat_number.wrapping_add(1);
            }
        }

        let secs = dt.as_secs_f32();
        let travelled = self.config.speed_mps * secs;
        self.distance_m = (self.distance_m + travelled) % DISTANCE_ROLLOVER_M;
        if self.config.stride_length_m > 0.0 {
            self.stride_fraction += travelled / self.config.stride_length_m;
            let whole = self.stride_fraction.floor();
            self.stride_fraction -= whole;
            self.strides = self.strides.wrapping_add((whole as u32 % 256) as u8);
        }

        SensorSample {
            heart_rate_bpm: heart_rate,
            battery_percent: self.config.battery_percent,
            heart_beat_number: self.heart_beat_number,
            heart_beat_timestamps_ms: self.beat_timestamps,
            distance_m: self.distance_m,
            speed_mps: self.config.speed_mps,
            strides: self.strides,
            firmware_id: FIRMWARE_ID,
            firmware_version: FIRMWARE_VERSION,
            hardware_id: HARDWARE_ID,
            hardware_version: HARDWARE_VERSION,
        }
    }

    /// Advance by `dt` and encode the resulting frame
    ///
    /// Every `corrupt_every`th frame carries a wrong checksum.
    pub fn next_frame(&mut self, dt: Duration) -> [u8; FRAME_LEN] {
        let sample = self.tick(dt);
        let mut frame = encode(&sample);
        self.frames += 1;

        let every = u64::from(self.config.corrupt_every);
        if every > 0 && self.frames % every == 0 {
            debug!("{} corrupting frame {}", self.config.label, self.frames);
            frame[FRAME_LEN - 2] ^= 0xFF;
        }
        frame
    }
}
