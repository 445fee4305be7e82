//! Broker session management
//!
//! The second of the gateway's three lifecycles: an MQTT session that
//! connects, resubscribes the device topic, delivers inbound messages to a
//! [`DataObserver`](estuary_core::DataObserver) and recovers from broker
//! errors on its own. Publish and subscribe operations are gated on the
//! session state behind a bounded-wait lock.
//!
//! ```no_run
//! use std::sync::Arc;
//! use estuary_core::QoS;
//! use estuary_session::{HardwareId, SessionConfig, SessionManager};
//!
//! struct Printer;
//! impl estuary_core::DataObserver for Printer {
//!     fn on_message(&self, topic: &str, payload: &[u8]) {
//!         println!("{topic}: {} bytes", payload.len());
//!     }
//! }
//!
//! # async fn example() -> estuary_core::Result<()> {
//! let id = HardwareId::from_hex("AABBCCDDEEFF")?;
//! let config = SessionConfig::new("broker.local", id);
//! let manager = SessionManager::new(config, Arc::new(Printer))?;
//! manager.start().await?;
//! manager.publish("pub/data/demo", b"hi".to_vec(), QoS::AtLeastOnce, false).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod identity;
pub mod manager;

pub use config::{
    SessionConfig, DEFAULT_CLIENT_ID_PREFIX, DEFAULT_OP_LOCK_TIMEOUT, DEFAULT_PUB_TOPIC_PREFIX,
    DEFAULT_SUB_TOPIC_PREFIX,
};
pub use identity::HardwareId;
pub use manager::SessionManager;
