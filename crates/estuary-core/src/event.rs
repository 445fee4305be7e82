//! Connection state and status event types
//!
//! Each manager owns exactly one lifecycle state (link, session or
//! transport) and publishes transitions as [`StatusEvent`]s on a broadcast
//! channel, alongside a watch channel carrying the current state. Observer
//! traits deliver payloads synchronously; the slices they receive are only
//! valid for the duration of the call and must be copied if retained.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Address information recorded when the wireless link obtains an address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkAddress {
    /// Assigned IP address
    pub ip: Ipv4Addr,
    /// Network mask
    pub netmask: Ipv4Addr,
    /// Default gateway
    pub gateway: Ipv4Addr,
}

impl LinkAddress {
    /// Create address info from its three parts
    pub fn new(ip: Ipv4Addr, netmask: Ipv4Addr, gateway: Ipv4Addr) -> Self {
        Self {
            ip,
            netmask,
            gateway,
        }
    }

    /// Address info carrying only an IP, mask and gateway zeroed
    pub fn from_ip(ip: Ipv4Addr) -> Self {
        Self {
            ip,
            netmask: Ipv4Addr::UNSPECIFIED,
            gateway: Ipv4Addr::UNSPECIFIED,
        }
    }
}

impl fmt::Display for LinkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ip)
    }
}

/// State of the wireless link lifecycle
///
/// Owned by the link manager; transitions happen only on driver events.
/// Consumers observe transitions via the status stream or the watch
/// channel rather than polling manager internals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Not associated
    Disconnected,
    /// Association attempt in progress
    Connecting,
    /// Associated and holding an address
    Connected(LinkAddress),
    /// A connect request failed outright (the retry loop continues)
    Failed,
}

impl LinkState {
    /// Short identifier for logging and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::Connected(_) => "connected",
            LinkState::Failed => "failed",
        }
    }

    /// True only when associated with an address
    pub fn is_connected(&self) -> bool {
        matches!(self, LinkState::Connected(_))
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Connected(addr) => write!(f, "connected ({addr})"),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

/// State of the broker session lifecycle
///
/// `Error` and `Disconnected` gate operations identically; the distinction
/// is preserved for diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No broker connection
    Disconnected,
    /// Connection handshake in progress
    Connecting,
    /// Session established, publish/subscribe usable
    Connected,
    /// Session library reported an error; treated as disconnected for gating
    Error,
}

impl SessionState {
    /// Short identifier for logging and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Error => "error",
        }
    }

    /// True only in `Connected`, the sole state where gated operations run
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// State of the serial transport lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Reader loop not yet started
    Uninitialized,
    /// Reader loop active, transmit usable
    Running,
    /// Reader loop stopped, port released
    Stopped,
}

impl TransportState {
    /// Short identifier for logging and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportState::Uninitialized => "uninitialized",
            TransportState::Running => "running",
            TransportState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unified status stream event
///
/// Emitted on each manager's broadcast channel when its state changes, plus
/// per-message received notifications. Consumers must not block while
/// handling these; slow consumers fall behind on the broadcast channel
/// without stalling the emitting manager.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    /// Link association attempt starting
    LinkConnecting,
    /// Link associated and holding an address
    LinkConnected {
        /// The address obtained for this connectivity episode
        address: LinkAddress,
    },
    /// Link lost; `attempt` counts consecutive failures since last success
    LinkDisconnected {
        /// Consecutive failed attempts, diagnostic only
        attempt: u32,
    },
    /// A connect request itself failed (retry loop continues)
    LinkFailed,
    /// Broker connection handshake starting
    SessionConnecting,
    /// Broker session established
    SessionConnected,
    /// Broker session closed
    SessionDisconnected,
    /// Session library reported an error, gating-identical to disconnected
    SessionError {
        /// Reason reported by the session library
        reason: String,
    },
    /// A message arrived on a subscribed topic
    SessionMessage {
        /// Topic the message arrived on
        topic: String,
        /// Arrival time
        timestamp: DateTime<Utc>,
    },
    /// A chunk of bytes arrived on the serial transport
    FrameReceived {
        /// Chunk length in bytes
        len: usize,
    },
}

/// Synchronous consumer of inbound broker messages
///
/// Invoked on the session manager's own event context. The topic and
/// payload views are valid only for the duration of the call.
pub trait DataObserver: Send + Sync {
    /// Handle one inbound message
    fn on_message(&self, topic: &str, payload: &[u8]);
}

/// Synchronous consumer of inbound serial byte chunks
///
/// Invoked on the transport reader context with a view of the raw bytes;
/// no framing has been applied. Valid only for the duration of the call.
pub trait FrameObserver: Send + Sync {
    /// Handle one received chunk
    fn on_frame(&self, data: &[u8]);
}
