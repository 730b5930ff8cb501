//! Normalized sensor sample

/// One decoded sample from a heart-rate/speed sensor
///
/// Counters marked "rolling" wrap around at their width on the device.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SensorSample {
    /// Heart rate in beats per minute (0 when the strap has no skin contact)
    pub heart_rate_bpm: u8,
    /// Battery charge in percent
    pub battery_percent: u8,
    /// Heart beat number (rolling)
    pub heart_beat_number: u8,
    /// Timestamps of the last 15 heart beats in milliseconds (rolling), newest first
    pub heart_beat_timestamps_ms: [u16; 15],
    /// Distance travelled in meters (rolling, 1/16 m resolution)
    pub distance_m: f32,
    /// Instantaneous speed in meters per second (1/256 m/s resolution)
    pub speed_mps: f32,
    /// Stride count (rolling)
    pub strides: u8,
    /// Firmware identifier
    pub firmware_id: u16,
    /// Firmware version
    pub firmware_version: u16,
    /// Hardware identifier
    pub hardware_id: u16,
    /// Hardware version
    pub hardware_version: u16,
}

impl SensorSample {
    /// Whether the strap reports a usable heart rate
    pub fn has_heart_rate(&self) -> bool {
        self.heart_rate_bpm > 0
    }

    /// Speed converted to kilometers per hour
    pub fn speed_kmh(&self) -> f32 {
        self.speed_mps * 3.6
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heart_rate_presence() {
        let mut sample = SensorSample::default();
        assert!(!sample.has_heart_rate());

        sample.heart_rate_bpm = 60;
        assert!(sample.has_heart_rate());
    }

    #[test]
    fn test_speed_kmh() {
        let sample = SensorSample {
            speed_mps: 2.5,
            ..SensorSample::default()
        };
        assert!((sample.speed_kmh() - 9.0).abs() < 1e-4);
    }
}
