//! Integration tests for the transport bridge over the mock port

use estuary_core::{EstuaryError, FrameObserver, StatusEvent, TransportState};
use estuary_transport::port::mock::MockPort;
use estuary_transport::{TransportBridge, TransportConfig};
use std::sync::{Arc, Mutex};

struct CollectingObserver {
    frames: Mutex<Vec<Vec<u8>>>,
}

impl CollectingObserver {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            frames: Mutex::new(Vec::new()),
        })
    }

    fn frames(&self) -> Vec<Vec<u8>> {
        self.frames.lock().unwrap().clone()
    }
}

impl FrameObserver for CollectingObserver {
    fn on_frame(&self, data: &[u8]) {
        self.frames.lock().unwrap().push(data.to_vec());
    }
}

async fn settle() {
    for _ in 0..30 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_full_duplex_flow() {
    let observer = CollectingObserver::new();
    let (port, handle) = MockPort::with_incoming(vec![b"inbound-1".to_vec(), b"inbound-2".to_vec()]);
    let bridge = TransportBridge::new(
        TransportConfig::new("mock"),
        Box::new(port),
        observer.clone(),
    )
    .unwrap();
    let mut events = bridge.subscribe_events();

    bridge.start().await.unwrap();
    settle().await;

    // Inbound chunks arrive in order, boundaries preserved by the mock
    assert_eq!(
        observer.frames(),
        vec![b"inbound-1".to_vec(), b"inbound-2".to_vec()]
    );
    assert_eq!(events.try_recv().unwrap(), StatusEvent::FrameReceived { len: 9 });

    // Outbound frames land whole
    let sent = bridge.transmit(b"outbound").await.unwrap();
    assert_eq!(sent, 8);
    assert_eq!(handle.written(), b"outbound");

    bridge.shutdown().await.unwrap();
    assert_eq!(bridge.state(), TransportState::Stopped);
}

#[tokio::test]
async fn test_sequential_transmits_preserve_order() {
    let observer = CollectingObserver::new();
    let (port, handle) = MockPort::new();
    let bridge =
        TransportBridge::new(TransportConfig::new("mock"), Box::new(port), observer).unwrap();
    bridge.start().await.unwrap();

    bridge.transmit(b"first ").await.unwrap();
    bridge.transmit(b"second").await.unwrap();
    assert_eq!(handle.written(), b"first second");

    bridge.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_partial_acceptance_is_a_transport_failure() {
    let observer = CollectingObserver::new();
    let (port, _handle) = MockPort::new();
    let bridge = TransportBridge::new(
        TransportConfig::new("mock"),
        Box::new(port.with_accept_limit(10)),
        observer,
    )
    .unwrap();
    bridge.start().await.unwrap();

    let err = bridge.transmit(&[0xAAu8; 32]).await.unwrap_err();
    assert!(matches!(
        err,
        EstuaryError::ShortWrite {
            requested: 32,
            accepted: 10
        }
    ));
    assert_eq!(err.kind(), estuary_core::ErrorKind::TransportFailure);

    bridge.shutdown().await.unwrap();
}
