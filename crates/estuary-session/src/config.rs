//! Configuration for the broker session manager

use serde::{Deserialize, Serialize};
use std::time::Duration;

use estuary_core::{humantime_serde, EstuaryError, Result};

use crate::identity::HardwareId;

/// Default broker port
pub const DEFAULT_BROKER_PORT: u16 = 1883;

/// Default client id prefix; the hardware id's last three octets follow
pub const DEFAULT_CLIENT_ID_PREFIX: &str = "estuary_";

/// Default prefix of the device subscription topic
pub const DEFAULT_SUB_TOPIC_PREFIX: &str = "sub/data/";

/// Default prefix for topics published on behalf of the serial side
pub const DEFAULT_PUB_TOPIC_PREFIX: &str = "pub/data/";

/// Bounded wait for the session state lock before an operation reports busy
pub const DEFAULT_OP_LOCK_TIMEOUT: Duration = Duration::from_millis(100);

/// Pause after a session error before the next connection attempt
pub const DEFAULT_RECONNECT_PAUSE: Duration = Duration::from_secs(1);

/// Default capacity of the status event broadcast channel
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

fn default_broker_port() -> u16 {
    DEFAULT_BROKER_PORT
}

fn default_client_id_prefix() -> String {
    DEFAULT_CLIENT_ID_PREFIX.to_string()
}

fn default_sub_topic_prefix() -> String {
    DEFAULT_SUB_TOPIC_PREFIX.to_string()
}

fn default_pub_topic_prefix() -> String {
    DEFAULT_PUB_TOPIC_PREFIX.to_string()
}

fn default_keep_alive() -> Duration {
    Duration::from_secs(60)
}

fn default_op_lock_timeout() -> Duration {
    DEFAULT_OP_LOCK_TIMEOUT
}

fn default_reconnect_pause() -> Duration {
    DEFAULT_RECONNECT_PAUSE
}

fn default_auto_subscribe() -> bool {
    true
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

/// Broker session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Broker hostname or address
    pub broker_host: String,

    /// Broker port
    #[serde(default = "default_broker_port")]
    pub broker_port: u16,

    /// Hardware address the client id and device topic derive from
    pub hardware_id: HardwareId,

    /// Explicit client id, overriding the derived one
    #[serde(default)]
    pub client_id: Option<String>,

    /// Prefix of the derived client id
    #[serde(default = "default_client_id_prefix")]
    pub client_id_prefix: String,

    /// Broker username
    #[serde(default)]
    pub username: Option<String>,

    /// Broker password
    #[serde(default)]
    pub password: Option<String>,

    /// Keep-alive interval
    #[serde(with = "humantime_serde", default = "default_keep_alive")]
    pub keep_alive: Duration,

    /// Prefix of the device subscription topic
    #[serde(default = "default_sub_topic_prefix")]
    pub sub_topic_prefix: String,

    /// Prefix for topics published on behalf of the serial side
    #[serde(default = "default_pub_topic_prefix")]
    pub pub_topic_prefix: String,

    /// Bounded wait for the state lock before an operation reports busy
    #[serde(with = "humantime_serde", default = "default_op_lock_timeout")]
    pub op_lock_timeout: Duration,

    /// Pause after a session error before the next connection attempt
    #[serde(with = "humantime_serde", default = "default_reconnect_pause")]
    pub reconnect_pause: Duration,

    /// Subscribe to the device topic on every (re)connection
    #[serde(default = "default_auto_subscribe")]
    pub auto_subscribe: bool,

    /// Status event broadcast channel capacity
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl SessionConfig {
    /// Create a config for the given broker and hardware address
    pub fn new(broker_host: impl Into<String>, hardware_id: HardwareId) -> Self {
        Self {
            broker_host: broker_host.into(),
            broker_port: DEFAULT_BROKER_PORT,
            hardware_id,
            client_id: None,
            client_id_prefix: default_client_id_prefix(),
            username: None,
            password: None,
            keep_alive: default_keep_alive(),
            sub_topic_prefix: default_sub_topic_prefix(),
            pub_topic_prefix: default_pub_topic_prefix(),
            op_lock_timeout: DEFAULT_OP_LOCK_TIMEOUT,
            reconnect_pause: DEFAULT_RECONNECT_PAUSE,
            auto_subscribe: true,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Set the broker port
    pub fn with_port(mut self, port: u16) -> Self {
        self.broker_port = port;
        self
    }

    /// Set broker credentials
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Override the derived client id
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set the state-lock wait bound
    pub fn with_op_lock_timeout(mut self, timeout: Duration) -> Self {
        self.op_lock_timeout = timeout;
        self
    }

    /// Disable the automatic device-topic subscription
    pub fn without_auto_subscribe(mut self) -> Self {
        self.auto_subscribe = false;
        self
    }

    /// The client id presented to the broker
    pub fn client_id(&self) -> String {
        match &self.client_id {
            Some(id) => id.clone(),
            None => self.hardware_id.client_id(&self.client_id_prefix),
        }
    }

    /// The device subscription topic
    pub fn subscription_topic(&self) -> String {
        format!("{}{}", self.sub_topic_prefix, self.hardware_id.topic_suffix())
    }


    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.broker_host.is_empty() {
            return Err(EstuaryError::InvalidConfig(
                "broker host is empty".to_string(),
            ));
        }
        if self.broker_port == 0 {
            return Err(EstuaryError::InvalidConfig(
                "broker port must be non-zero".to_string(),
            ));
        }
        if self.client_id().is_empty() {
            return Err(EstuaryError::InvalidConfig(
                "client id is empty".to_string(),
            ));
        }
        if self.op_lock_timeout.is_zero() {
            return Err(EstuaryError::InvalidConfig(
                "operation lock timeout must be non-zero".to_string(),
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
