//! Wireless link lifecycle management
//!
//! This crate owns the first of the gateway's three lifecycles: bringing
//! up the wireless link, holding it, and re-connecting forever on a fixed
//! backoff when it drops. The platform radio sits behind the
//! [`LinkDriver`] trait so the manager itself is host-testable.
//!
//! ```no_run
//! use estuary_link::{HostLinkDriver, LinkConfig, LinkManager};
//!
//! # async fn example() -> estuary_core::Result<()> {
//! let config = LinkConfig::new("HomeNet", "secret");
//! let manager = LinkManager::new(config, Box::new(HostLinkDriver::new()))?;
//! manager.start().await?;
//! let mut events = manager.subscribe();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod driver;
pub mod manager;

pub use config::{LinkConfig, DEFAULT_EVENT_CAPACITY};
pub use driver::{HostLinkDriver, LinkDriver, LinkEvent, MockLinkControl, MockLinkDriver};
pub use manager::LinkManager;
