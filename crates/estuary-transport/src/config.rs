//! Configuration for the serial transport bridge

use serde::{Deserialize, Serialize};
use std::time::Duration;

use estuary_core::{humantime_serde, EstuaryError, Result};

/// Default line rate
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default receive buffer size
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024;

/// Default polling window of the reader loop
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Default capacity of the status event broadcast channel
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_read_buffer_size() -> usize {
    DEFAULT_READ_BUFFER_SIZE
}

fn default_read_timeout() -> Duration {
    DEFAULT_READ_TIMEOUT
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

/// Serial transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Device path of the serial port
    pub port: String,

    /// Line rate in baud
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Receive buffer size; chunks never exceed this
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,

    /// Polling window of the reader loop
    #[serde(with = "humantime_serde", default = "default_read_timeout")]
    pub read_timeout: Duration,

    /// Status event broadcast channel capacity
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            read_timeout: DEFAULT_READ_TIMEOUT,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl TransportConfig {
    /// Create a config for the given port path
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Default::default()
        }
    }

    /// Set the line rate
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Validate the configuration
    ///
    /// The port path is checked when the port is opened, not here; bridges
    /// over an injected port do not need one.
    pub fn validate(&self) -> Result<()> {
        if self.baud_rate == 0 {
            return Err(EstuaryError::InvalidConfig(
                "baud rate must be non-zero".to_string(),
            ));
        }
        if self.read_buffer_size == 0 {
            return Err(EstuaryError::InvalidConfig(
                "read buffer size must be non-zero".to_string(),
            ));
        }
        if self.read_timeout.is_zero() {
            return Err(EstuaryError::InvalidConfig(
                "read timeout must be non-zero".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(EstuaryError::InvalidConfig(
                "event capacity must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TransportConfig::new("/dev/ttyUSB0");
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.read_buffer_size, 1024);
        assert_eq!(config.read_timeout, Duration::from_millis(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_buffer_rejected() {
        let mut config = TransportConfig::new("/dev/ttyUSB0");
        config.read_buffer_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let json = r#"{"port": "/dev/ttyACM0", "read_timeout": "250ms"}"#;
        let config: TransportConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.port, "/dev/ttyACM0");
        assert_eq!(config.read_timeout, Duration::from_millis(250));
        assert_eq!(config.baud_rate, 115_200);
    }
}
