//! Device identity derived from the hardware address
//!
//! The gateway identifies itself to the broker using its six-octet
//! hardware address: the client id appends the last three octets in
//! uppercase hex to a configurable prefix, and the device subscription
//! topic appends all six octets to the subscription prefix.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use estuary_core::{EstuaryError, Result};

/// Six-octet hardware address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HardwareId([u8; 6]);

impl HardwareId {
    /// Wrap raw octets
    pub fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Parse from hex, with or without `:` separators
    ///
    /// Accepts `AABBCCDDEEFF` and `AA:BB:CC:DD:EE:FF`, case-insensitive.
    pub fn from_hex(s: &str) -> Result<Self> {
        let cleaned: String = s.chars().filter(|c| *c != ':').collect();
        if cleaned.len() != 12 {
            return Err(EstuaryError::InvalidConfig(format!(
                "hardware id must be 6 octets, got {s:?}"
            )));
        }
        let mut octets = [0u8; 6];
        for (i, octet) in octets.iter_mut().enumerate() {
            *octet = u8::from_str_radix(&cleaned[i * 2..i * 2 + 2], 16).map_err(|_| {
                EstuaryError::InvalidConfig(format!("hardware id has non-hex digits: {s:?}"))
            })?;
        }
        Ok(Self(octets))
    }

    /// The raw octets
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Broker client id: prefix plus the last three octets in uppercase hex
    pub fn client_id(&self, prefix: &str) -> String {
        format!(
            "{prefix}{:02X}{:02X}{:02X}",
            self.0[3], self.0[4], self.0[5]
        )
    }

    /// Twelve uppercase hex digits, no separators
    pub fn topic_suffix(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for HardwareId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for octet in self.0 {
            write!(f, "{octet:02X}")?;
        }
        Ok(())
    }
}

impl FromStr for HardwareId {
    type Err = EstuaryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for HardwareId {
    type Error = EstuaryError;

    fn try_from(s: String) -> Result<Self> {
        Self::from_hex(&s)
    }
}

impl From<HardwareId> for String {
    fn from(id: HardwareId) -> Self {
        id.to_string()
    }
}
