//! Frame router between the serial side and the broker
//!
//! Inbound serial chunks are parsed as JSON frames
//! `{"topic": string, "payload": string}`; the frame topic is appended to
//! the configured publish prefix and the payload published there at QoS 1.
//! Every frame gets a reply line back over serial. Inbound broker messages
//! are forwarded to the serial side as `<topic>: <payload>` lines.
//!
//! Observers hand off into bounded channels and never block the manager
//! contexts that invoke them; the router task does the actual work.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use estuary_core::{DataObserver, ErrorKind, FrameObserver, QoS, Result};
use estuary_session::SessionManager;
use estuary_transport::TransportBridge;

/// Reply sent when a frame was parsed and queued for the broker
pub const REPLY_OK: &str = "OK: Sent to MQTT Queue\r\n";
/// Reply for frames that are not valid JSON
pub const REPLY_INVALID_JSON: &str = "Error: Invalid JSON\r\n";
/// Reply for JSON frames whose `topic` or `payload` is missing or not a string
pub const REPLY_MISSING_FIELDS: &str = "Error: Missing/Invalid 'topic' or 'payload'\r\n";
/// Reply when the broker session cannot take the publish
pub const REPLY_PUBLISH_FAILED: &str = "Error: Failed to send to MQTT\r\n";

/// Publishing seam the router needs from the session side
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish one message
    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS, retain: bool) -> Result<()>;
}

#[async_trait]
impl Publisher for SessionManager {
    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS, retain: bool) -> Result<()> {
        SessionManager::publish(self, topic, payload, qos, retain).await
    }
}

/// Serial-side observer handing chunks to the router
pub struct SerialIngress {
    tx: mpsc::Sender<Vec<u8>>,
}

impl SerialIngress {
    /// Create the observer and the router-side receiver
    pub fn new(capacity: usize) -> (Arc<Self>, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Arc::new(Self { tx }), rx)
    }
}

impl FrameObserver for SerialIngress {
    fn on_frame(&self, data: &[u8]) {
        if self.tx.try_send(data.to_vec()).is_err() {
            warn!(len = data.len(), "router backlog full, frame dropped");
        }
    }
}

/// Broker-side observer handing messages to the router
pub struct BrokerIngress {
    tx: mpsc::Sender<(String, Vec<u8>)>,
}

impl BrokerIngress {
    /// Create the observer and the router-side receiver
    pub fn new(capacity: usize) -> (Arc<Self>, mpsc::Receiver<(String, Vec<u8>)>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Arc::new(Self { tx }), rx)
    }
}

impl DataObserver for BrokerIngress {
    fn on_message(&self, topic: &str, payload: &[u8]) {
        if self
            .tx
            .try_send((topic.to_string(), payload.to_vec()))
            .is_err()
        {
            warn!(topic, "router backlog full, message dropped");
        }
    }
}

/// Router task connecting the two ingress streams
pub struct FrameRouter {
    session: Arc<dyn Publisher>,
    transport: Arc<TransportBridge>,
    pub_topic_prefix: String,
    frame_rx: mpsc::Receiver<Vec<u8>>,
    message_rx: mpsc::Receiver<(String, Vec<u8>)>,
    shutdown_rx: watch::Receiver<bool>,
}

impl FrameRouter {
    /// Create a router over the given session and transport
    pub fn new(
        session: Arc<dyn Publisher>,
        transport: Arc<TransportBridge>,
        pub_topic_prefix: String,
        frame_rx: mpsc::Receiver<Vec<u8>>,
        message_rx: mpsc::Receiver<(String, Vec<u8>)>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            session,
            transport,
            pub_topic_prefix,
            frame_rx,
            message_rx,
            shutdown_rx,
        }
    }

    /// Run until shutdown or both ingress streams close
    pub async fn run(mut self) {
        debug!("frame router running");
        loop {
            tokio::select! {
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        break;
                    }
                }
                frame = self.frame_rx.recv() => {
                    match frame {
                        Some(frame) => self.handle_frame(&frame).await,
                        None => break,
                    }
                }
                message = self.message_rx.recv() => {
                    match message {
                        Some((topic, payload)) => self.forward_message(&topic, &payload).await,
                        None => break,
                    }
                }
            }
        }
        debug!("frame router stopped");
    }

    async fn handle_frame(&self, data: &[u8]) {
        let reply = self.route_frame(data).await;
        self.send_line(reply).await;
    }

    /// Parse one frame and publish it; returns the serial reply line
    async fn route_frame(&self, data: &[u8]) -> &'static str {
        let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) else {
            debug!(len = data.len(), "frame is not valid JSON");
            return REPLY_INVALID_JSON;
        };

        let topic = value.get("topic").and_then(|v| v.as_str());
        let payload = value.get("payload").and_then(|v| v.as_str());
        let (Some(topic), Some(payload)) = (topic, payload) else {
            return REPLY_MISSING_FIELDS;
        };

        // The frame topic is always relative to the configured prefix
        let topic = format!("{}{}", self.pub_topic_prefix, topic);

        match self
            .session
            .publish(&topic, payload.as_bytes().to_vec(), QoS::AtLeastOnce, false)
            .await
        {
            Ok(()) => {
                debug!(%topic, "frame published");
                REPLY_OK
            }
            Err(e) => {
                if !matches!(e.kind(), ErrorKind::NotConnected | ErrorKind::NotReady) {
                    warn!(%topic, error = %e, "publish failed");
                }
                REPLY_PUBLISH_FAILED
            }
        }
    }

    async fn forward_message(&self, topic: &str, payload: &[u8]) {
        let line = format!("{topic}: {}\r\n", String::from_utf8_lossy(payload));
        self.send_line(&line).await;
    }

    async fn send_line(&self, line: &str) {
        if let Err(e) = self.transport.transmit(line.as_bytes()).await {
            warn!(error = %e, "serial reply failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use estuary_core::EstuaryError;
    use estuary_transport::port::mock::{MockPort, MockPortHandle};
    use estuary_transport::TransportConfig;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;

    struct StubPublisher {
        connected: AtomicBool,
        published: StdMutex<Vec<(String, Vec<u8>)>>,
    }

    impl StubPublisher {
        fn new(connected: bool) -> Arc<Self> {
            Arc::new(Self {
                connected: AtomicBool::new(connected),
                published: StdMutex::new(Vec::new()),
            })
        }

        fn published(&self) -> Vec<(String, Vec<u8>)> {
            self.published.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Publisher for StubPublisher {
        async fn publish(
            &self,
            topic: &str,
            payload: Vec<u8>,
            _qos: QoS,
            _retain: bool,
        ) -> Result<()> {
            if !self.connected.load(Ordering::SeqCst) {
                return Err(EstuaryError::NotConnected);
            }
            self.published
                .lock()
                .unwrap()
                .push((topic.to_string(), payload));
            Ok(())
        }
    }

    struct Harness {
        publisher: Arc<StubPublisher>,
        port: MockPortHandle,
        serial: Arc<SerialIngress>,
        broker: Arc<BrokerIngress>,
        shutdown_tx: watch::Sender<bool>,
    }

    async fn harness(connected: bool) -> Harness {
        let publisher = StubPublisher::new(connected);
        let (serial, frame_rx) = SerialIngress::new(8);
        let (broker, message_rx) = BrokerIngress::new(8);
        let (mock_port, port) = MockPort::new();

        struct NullObserver;
        impl FrameObserver for NullObserver {
            fn on_frame(&self, _data: &[u8]) {}
        }

        let transport = Arc::new(
            TransportBridge::new(
                TransportConfig::new("mock"),
                Box::new(mock_port),
                Arc::new(NullObserver),
            )
            .unwrap(),
        );
        transport.start().await.unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let router = FrameRouter::new(
            publisher.clone(),
            transport,
            "pub/data/".to_string(),
            frame_rx,
            message_rx,
            shutdown_rx,
        );
        tokio::spawn(router.run());

        Harness {
            publisher,
            port,
            serial,
            broker,
            shutdown_tx,
        }
    }

    async fn settle() {
        for _ in 0..30 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_valid_frame_published_and_acked() {
        let h = harness(true).await;

        h.serial
            .on_frame(br#"{"topic": "sensors/temp", "payload": "21.5"}"#);
        settle().await;

        assert_eq!(
            h.publisher.published(),
            vec![("pub/data/sensors/temp".to_string(), b"21.5".to_vec())]
        );
        assert_eq!(h.port.written(), REPLY_OK.as_bytes());

        let _ = h.shutdown_tx.send(true);
    }

    #[tokio::test]
    async fn test_invalid_json_reply() {
        let h = harness(true).await;

        h.serial.on_frame(b"not json at all");
        settle().await;

        assert!(h.publisher.published().is_empty());
        assert_eq!(h.port.written(), REPLY_INVALID_JSON.as_bytes());
    }

    #[tokio::test]
    async fn test_missing_fields_reply() {
        let h = harness(true).await;

        h.serial.on_frame(br#"{"topic": "sensors/temp"}"#);
        settle().await;

        assert!(h.publisher.published().is_empty());
        assert_eq!(h.port.written(), REPLY_MISSING_FIELDS.as_bytes());
    }

    #[tokio::test]
    async fn test_non_string_fields_reply() {
        let h = harness(true).await;

        h.serial.on_frame(br#"{"topic": 7, "payload": "21.5"}"#);
        settle().await;

        assert!(h.publisher.published().is_empty());
        assert_eq!(h.port.written(), REPLY_MISSING_FIELDS.as_bytes());
    }

    #[tokio::test]
    async fn test_publish_failure_reply() {
        let h = harness(false).await;

        h.serial
            .on_frame(br#"{"topic": "sensors/temp", "payload": "21.5"}"#);
        settle().await;

        assert_eq!(h.port.written(), REPLY_PUBLISH_FAILED.as_bytes());
    }

    #[tokio::test]
    async fn test_frame_topic_is_prefixed() {
        let h = harness(true).await;

        h.serial.on_frame(br#"{"topic": "alerts", "payload": "ping"}"#);
        settle().await;

        assert_eq!(
            h.publisher.published(),
            vec![("pub/data/alerts".to_string(), b"ping".to_vec())]
        );
    }

    #[tokio::test]
    async fn test_broker_message_forwarded_as_line() {
        let h = harness(true).await;

        h.broker.on_message("sub/data/AABBCCDDEEFF", b"hello");
        settle().await;

        assert_eq!(h.port.written(), b"sub/data/AABBCCDDEEFF: hello\r\n");
    }
}
