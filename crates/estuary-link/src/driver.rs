//! Link driver abstraction
//!
//! The platform's wireless-association driver sits behind [`LinkDriver`].
//! Events surface on the driver's own dispatch context via [`next_event`],
//! which the manager awaits in its event loop.
//!
//! [`next_event`]: LinkDriver::next_event

use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use estuary_core::{EstuaryError, LinkAddress, Result};

/// Events surfaced by the platform wireless driver
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// The driver stack is up and ready for a connect request
    Started,
    /// Association was lost, or a connect attempt failed
    Disconnected {
        /// Driver-reported reason, if any
        reason: Option<String>,
    },
    /// Association succeeded and an address was obtained
    GotAddress(LinkAddress),
}

/// Platform wireless-association driver
///
/// Implementations own the actual radio; the manager only ever issues
/// connect/stop requests and consumes the event stream.
#[async_trait]
pub trait LinkDriver: Send + Sync {
    /// Bring up the driver stack for the given network
    ///
    /// Fails only on resource or argument problems; an unreachable network
    /// surfaces later as a `Disconnected` event.
    async fn start(&mut self, network_name: &str, credential: &str) -> Result<()>;

    /// Issue one association request
    async fn connect(&mut self) -> Result<()>;

    /// Tear down the driver stack
    async fn stop(&mut self) -> Result<()>;

    /// Await the next driver event
    ///
    /// Returns `None` when the driver has shut down and no further events
    /// will arrive.
    async fn next_event(&mut self) -> Option<LinkEvent>;
}

/// Driver treating the host operating system's networking as the link
///
/// On a host the OS manages wireless association itself, so this driver
/// reports connected immediately with the host's outbound address and never
/// raises a disconnect. Deployments with a real radio supply their own
/// [`LinkDriver`].
pub struct HostLinkDriver {
    event_rx: mpsc::Receiver<LinkEvent>,
    event_tx: mpsc::Sender<LinkEvent>,
}

impl HostLinkDriver {
    /// Create a host driver
    pub fn new() -> Self {
        let (event_tx, event_rx) = mpsc::channel(8);
        Self { event_rx, event_tx }
    }

    /// Probe the host's outbound IPv4 address
    ///
    /// Opens a UDP socket towards a public address without sending anything;
    /// the local address the OS picks is the host's outbound interface.
    fn probe_local_address() -> Ipv4Addr {
        std::net::UdpSocket::bind("0.0.0.0:0")
            .and_then(|sock| {
                sock.connect("8.8.8.8:53")?;
                sock.local_addr()
            })
            .map(|addr| match addr.ip() {
                std::net::IpAddr::V4(ip) => ip,
                std::net::IpAddr::V6(_) => Ipv4Addr::UNSPECIFIED,
            })
            .unwrap_or(Ipv4Addr::UNSPECIFIED)
    }
}

impl Default for HostLinkDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LinkDriver for HostLinkDriver {
    async fn start(&mut self, network_name: &str, _credential: &str) -> Result<()> {
        debug!(network = network_name, "host link driver starting");
        self.event_tx
            .send(LinkEvent::Started)
            .await
            .map_err(|e| EstuaryError::Channel(e.to_string()))
    }

    async fn connect(&mut self) -> Result<()> {
        let address = LinkAddress::from_ip(Self::probe_local_address());
        self.event_tx
            .send(LinkEvent::GotAddress(address))
            .await
            .map_err(|e| EstuaryError::Channel(e.to_string()))
    }

    async fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    async fn next_event(&mut self) -> Option<LinkEvent> {
        self.event_rx.recv().await
    }
}

/// Scripted driver for tests
///
/// Tests hold a [`MockLinkControl`] to inject events and observe how many
/// connect requests the manager issued.
pub struct MockLinkDriver {
    event_rx: mpsc::UnboundedReceiver<LinkEvent>,
    connect_calls: Arc<AtomicU32>,
    start_calls: Arc<AtomicU32>,
    fail_connects: Arc<AtomicBool>,
}

/// Test-side handle paired with a [`MockLinkDriver`]
#[derive(Clone)]
pub struct MockLinkControl {
    event_tx: mpsc::UnboundedSender<LinkEvent>,
    connect_calls: Arc<AtomicU32>,
    start_calls: Arc<AtomicU32>,
    fail_connects: Arc<AtomicBool>,
}

impl MockLinkDriver {
    /// Create a mock driver and its control handle
    pub fn new() -> (Self, MockLinkControl) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let connect_calls = Arc::new(AtomicU32::new(0));
        let start_calls = Arc::new(AtomicU32::new(0));
        let fail_connects = Arc::new(AtomicBool::new(false));
        let control = MockLinkControl {
            event_tx,
            connect_calls: connect_calls.clone(),
            start_calls: start_calls.clone(),
            fail_connects: fail_connects.clone(),
        };
        let driver = Self {
            event_rx,
            connect_calls,
            start_calls,
            fail_connects,
        };
        (driver, control)
    }
}

impl MockLinkControl {
    /// Inject a driver event
    pub fn send(&self, event: LinkEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Number of connect requests the manager has issued
    pub fn connect_calls(&self) -> u32 {
        self.connect_calls.load(Ordering::SeqCst)
    }

    /// Number of start calls the manager has issued
    pub fn start_calls(&self) -> u32 {
        self.start_calls.load(Ordering::SeqCst)
    }

    /// Make subsequent connect requests fail
    pub fn set_connect_failure(&self, fail: bool) {
        self.fail_connects.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl LinkDriver for MockLinkDriver {
    async fn start(&mut self, _network_name: &str, _credential: &str) -> Result<()> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn connect(&mut self) -> Result<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_connects.load(Ordering::SeqCst) {
            return Err(EstuaryError::LinkDown);
        }
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    async fn next_event(&mut self) -> Option<LinkEvent> {
        self.event_rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_driver_scripted_events() {
        let (mut driver, control) = MockLinkDriver::new();

        control.send(LinkEvent::Started);
        control.send(LinkEvent::Disconnected { reason: None });

        assert_eq!(driver.next_event().await, Some(LinkEvent::Started));
        assert_eq!(
            driver.next_event().await,
            Some(LinkEvent::Disconnected { reason: None })
        );

        driver.connect().await.unwrap();
        assert_eq!(control.connect_calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_driver_closed_stream() {
        let (mut driver, control) = MockLinkDriver::new();
        drop(control);
        assert_eq!(driver.next_event().await, None);
    }
}
