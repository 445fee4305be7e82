//! Gateway wiring: configuration, frame routing and status rendering
//!
//! The binary in `main.rs` loads a [`GatewayConfig`], brings the three
//! lifecycle managers up in order (link, session, transport), then runs the
//! [`router::FrameRouter`] between them until ctrl-c tears everything down
//! in reverse.

pub mod config;
pub mod router;
pub mod status;

pub use config::GatewayConfig;
pub use router::{BrokerIngress, FrameRouter, Publisher, SerialIngress};
pub use status::{spawn_renderer, LogIndicator, StatusIndicator};
