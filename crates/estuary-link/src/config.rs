//! Configuration for the link manager

use serde::{Deserialize, Serialize};
use std::time::Duration;

use estuary_core::{humantime_serde, retry::DEFAULT_LINK_BACKOFF, EstuaryError, Result};

/// Default capacity of the status event broadcast channel
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Link manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Network name to associate with
    pub network_name: String,

    /// Association credential
    pub credential: String,

    /// Fixed delay between connect attempts
    #[serde(with = "humantime_serde", default = "default_retry_backoff")]
    pub retry_backoff: Duration,

    /// Status event broadcast channel capacity
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_retry_backoff() -> Duration {
    DEFAULT_LINK_BACKOFF
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            network_name: String::new(),
            credential: String::new(),
            retry_backoff: DEFAULT_LINK_BACKOFF,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl LinkConfig {
    /// Create a config for the given network and credential
    pub fn new(network_name: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            network_name: network_name.into(),
            credential: credential.into(),
            ..Default::default()
        }
    }

    /// Set the retry backoff
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Validate the configuration
    ///
    /// An unreachable network is not a validation failure; only malformed
    /// arguments are rejected here.
    pub fn validate(&self) -> Result<()> {
        if self.network_name.is_empty() {
            return Err(EstuaryError::InvalidConfig(
                "network name is empty".to_string(),
            ));
        }
        if self.retry_backoff.is_zero() {
            return Err(EstuaryError::InvalidConfig(
                "retry backoff must be non-zero".to_string(),
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
    fn test_default_backoff() {
        let config = LinkConfig::new("HomeNet", "secret");
        assert_eq!(config.retry_backoff, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_network_name_rejected() {
        let config = LinkConfig::new("", "secret");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_backoff_rejected() {
        let config = LinkConfig::new("HomeNet", "secret").with_retry_backoff(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serde_round_trip() {
        let config = LinkConfig::new("HomeNet", "secret");
        let json = serde_json::to_string(&config).unwrap();
        let parsed: LinkConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.network_name, "HomeNet");
        assert_eq!(parsed.retry_backoff, Duration::from_secs(5));
    }
}
