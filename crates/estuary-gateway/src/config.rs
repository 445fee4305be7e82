//! Gateway configuration file

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

use estuary_link::LinkConfig;
use estuary_session::SessionConfig;
use estuary_transport::TransportConfig;

/// Top-level gateway configuration, one section per lifecycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Wireless link section
    pub link: LinkConfig,
    /// Broker session section
    pub session: SessionConfig,
    /// Serial transport section
    pub transport: TransportConfig,
}

impl GatewayConfig {
    /// Load from a JSON file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Validate every section
    pub fn validate(&self) -> estuary_core::Result<()> {
        self.link.validate()?;
        self.session.validate()?;
        self.transport.validate()?;
        if self.transport.port.is_empty() {
            return Err(estuary_core::EstuaryError::InvalidConfig(
                "transport port path is empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const SAMPLE: &str = r#"{
        "link": {
            "network_name": "HomeNet",
            "credential": "secret"
        },
        "session": {
            "broker_host": "broker.local",
            "hardware_id": "AABBCCDDEEFF"
        },
        "transport": {
            "port": "/dev/ttyUSB0"
        }
    }"#;

    #[test]
    fn test_parse_sample_with_defaults() {
        let config: GatewayConfig = serde_json::from_str(SAMPLE).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.link.retry_backoff, Duration::from_secs(5));
        assert_eq!(config.session.broker_port, 1883);
        assert_eq!(config.transport.baud_rate, 115_200);
        assert_eq!(config.session.client_id(), "estuary_DDEEFF");
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join("estuary-gateway-config-test.json");
        std::fs::write(&path, SAMPLE).unwrap();
        let config = GatewayConfig::load(&path).unwrap();
        assert_eq!(config.transport.port, "/dev/ttyUSB0");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = GatewayConfig::load(Path::new("/nonexistent/gateway.json")).unwrap_err();
        assert!(err.to_string().contains("gateway.json"));
    }

    #[test]
    fn test_empty_port_rejected() {
        let mut config: GatewayConfig = serde_json::from_str(SAMPLE).unwrap();
        config.transport.port.clear();
        assert!(config.validate().is_err());
    }
}
