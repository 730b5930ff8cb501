//! Device addressing

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ResolutionError;

/// Opaque identifier of a remote sensor device
///
/// Usually a Bluetooth MAC address taken from persisted settings. The
/// reserved value [`DeviceAddress::NONE`] means no device is configured.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceAddress(String);

impl DeviceAddress {
    /// Sentinel stored in settings when no sensor has been paired
    pub const NONE: &'static str = "none";

    /// Wrap an address string
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// The "no device configured" sentinel
    pub fn none() -> Self {
        Self(Self::NONE.to_string())
    }

    /// Whether this is the "no device configured" sentinel
    pub fn is_none_sentinel(&self) -> bool {
        self.0.trim().eq_ignore_ascii_case(Self::NONE)
    }

    /// Get the raw address string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolve the address syntactically to a 48-bit Bluetooth MAC
    ///
    /// Accepts six hex octets separated by `:` or `-`, in either case.
    pub fn to_mac(&self) -> Result<[u8; 6], ResolutionError> {
        let malformed = || ResolutionError::Malformed(self.0.clone());

        let text = self.0.trim();
        let parts: Vec<&str> = text.split([':', '-']).collect();
        if parts.len() != 6 {
            return Err(malformed());
        }

        let mut mac = [0u8; 6];
        for (octet, part) in mac.iter_mut().zip(parts) {
            if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(malformed());
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| malformed())?;
        }
        Ok(mac)
    }

    /// Canonical upper-case, colon-separated form of a MAC address
    pub fn canonical(&self) -> Result<String, ResolutionError> {
        let mac = self.to_mac()?;
        Ok(mac
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(":"))
    }
}

impl Default for DeviceAddress {
    fn default() -> Self {
        Self::none()
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceAddress {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DeviceAddress {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_sentinel() {
        assert!(DeviceAddress::none().is_none_sentinel());
        assert!(DeviceAddress::new("NONE").is_none_sentinel());
        assert!(DeviceAddress::default().is_none_sentinel());
        assert!(!DeviceAddress::new("00:07:80:12:34:56").is_none_sentinel());
    }

    #[test]
    fn test_mac_parsing() {
        let addr = DeviceAddress::new("00:07:80:ab:CD:ef");
        assert_eq!(addr.to_mac().unwrap(), [0x00, 0x07, 0x80, 0xAB, 0xCD, 0xEF]);
        assert_eq!(addr.canonical().unwrap(), "00:07:80:AB:CD:EF");

        let dashed = DeviceAddress::new("00-07-80-AB-CD-EF");
        assert_eq!(dashed.canonical().unwrap(), "00:07:80:AB:CD:EF");
    }

    #[test]
    fn test_malformed_mac() {
        for bad in ["", "none", "00:07:80:AB:CD", "00:07:80:AB:CD:EF:00", "0:07:80:AB:CD:EF", "zz:07:80:AB:CD:EF"] {
            assert!(
                matches!(DeviceAddress::new(bad).to_mac(), Err(ResolutionError::Malformed(_))),
                "{bad:?} should be malformed"
            );
        }
    }
}
