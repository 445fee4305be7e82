//! Foundational types for the estuary serial/MQTT gateway
//!
//! This crate holds the pieces shared by the three lifecycle managers:
//!
//! - [`error`] - the error taxonomy and `Result` alias
//! - [`event`] - per-lifecycle states, the unified status event stream and
//!   observer traits
//! - [`message`] - broker message and serial frame payload types
//! - [`retry`] - the fixed-interval link retry policy
//!
//! The managers themselves live in `estuary-link`, `estuary-session` and
//! `estuary-transport`; the `estuary-gateway` binary wires them together.

pub mod error;
pub mod event;
pub mod message;
pub mod retry;

pub use error::{ErrorKind, EstuaryError, Result};
pub use event::{
    DataObserver, FrameObserver, LinkAddress, LinkState, SessionState, StatusEvent, TransportState,
};
pub use message::{validate_topic, InboundFrame, InboundMessage, OutboundMessage, QoS};
pub use retry::{RetryPolicy, DEFAULT_LINK_BACKOFF};

/// Serde adapter for human-readable durations ("5s", "100ms") in configs
pub mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serialize a duration as a humantime string
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    /// Deserialize a duration from a humantime string
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
