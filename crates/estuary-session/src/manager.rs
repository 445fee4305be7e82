//! Session manager - owns the broker connection lifecycle
//!
//! One worker task drives the MQTT event loop. Operations share the session
//! through a state lock with a bounded wait: a caller that cannot take the
//! lock within the configured window gets `Busy` instead of stalling, and a
//! caller that takes the lock while the session is down gets `NotConnected`
//! without side effects. Poll errors put the session in `Error`, which gates
//! identically to `Disconnected`, and the worker re-enters the connect loop
//! after a short pause.

use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use estuary_core::{
    validate_topic, DataObserver, EstuaryError, QoS, Result, SessionState, StatusEvent,
};

use crate::config::SessionConfig;

/// Request channel capacity between operations and the event loop
const REQUEST_CHANNEL_CAPACITY: usize = 16;

fn to_mqtt_qos(qos: QoS) -> rumqttc::QoS {
    match qos {
        QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}

/// Session state shared between operations and the worker
struct SessionInner {
    client: AsyncClient,
    /// Topics subscribed by callers, restored on every reconnection
    subscriptions: HashMap<String, QoS>,
}

/// Pieces handed to the worker task on start
struct WorkerParts {
    event_loop: EventLoop,
    state_tx: watch::Sender<SessionState>,
}

/// Broker session lifecycle manager
///
/// Construction validates the config and allocates the client; it never
/// touches the network. [`start`] spawns the worker that owns the event
/// loop. Inbound messages on subscribed topics reach the [`DataObserver`]
/// synchronously on the worker context.
///
/// [`start`]: SessionManager::start
pub struct SessionManager {
    config: SessionConfig,
    inner: Arc<Mutex<SessionInner>>,
    parts: Mutex<Option<WorkerParts>>,
    task: Mutex<Option<JoinHandle<()>>>,
    state_rx: watch::Receiver<SessionState>,
    event_tx: broadcast::Sender<StatusEvent>,
    data_observer: Arc<dyn DataObserver>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl SessionManager {
    /// Create a manager for the given broker
    pub fn new(config: SessionConfig, data_observer: Arc<dyn DataObserver>) -> Result<Self> {
        config.validate()?;

        let mut options =
            MqttOptions::new(config.client_id(), &config.broker_host, config.broker_port);
        options.set_keep_alive(config.keep_alive);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username, password);
        }

        let (client, event_loop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(SessionState::Disconnected);
        let (event_tx, _) = broadcast::channel(config.event_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config,
            inner: Arc::new(Mutex::new(SessionInner {
                client,
                subscriptions: HashMap::new(),
            })),
            parts: Mutex::new(Some(WorkerParts {
                event_loop,
                state_tx,
            })),
            task: Mutex::new(None),
            state_rx,
            event_tx,
            data_observer,
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Spawn the worker that drives the broker connection
    ///
    /// Idempotent; a second call returns `Ok` without touching existing
    /// state.
    pub async fn start(&self) -> Result<()> {
        let mut parts_guard = self.parts.lock().await;
        let Some(parts) = parts_guard.take() else {
            debug!("session manager already started");
            return Ok(());
        };

        let worker = self.make_worker(parts);
        let handle = tokio::spawn(worker.run());
        *self.task.lock().await = Some(handle);

        info!(
            broker = %self.config.broker_host,
            port = self.config.broker_port,
            client_id = %self.config.client_id(),
            "session manager started"
        );
        Ok(())
    }

    fn make_worker(&self, parts: WorkerParts) -> SessionWorker {
        SessionWorker {
            inner: self.inner.clone(),
            state_tx: parts.state_tx,
            event_tx: self.event_tx.clone(),
            data_observer: self.data_observer.clone(),
            device_topic: self.config.subscription_topic(),
            auto_subscribe: self.config.auto_subscribe,
            reconnect_pause: self.config.reconnect_pause,
            shutdown_rx: self.shutdown_rx.clone(),
            event_loop: parts.event_loop,
        }
    }

    /// True while the broker session is established
    pub fn is_connected(&self) -> bool {
        self.state_rx.borrow().is_connected()
    }

    /// Snapshot of the current session state
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Subscribe to the status event stream
    pub fn subscribe_events(&self) -> broadcast::Receiver<StatusEvent> {
        self.event_tx.subscribe()
    }

    /// Watch the session state without polling
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// The device subscription topic derived from the hardware id
    pub fn subscription_topic(&self) -> String {
        self.config.subscription_topic()
    }


    /// Publish a message
    ///
    /// Fails fast with `Busy` when the state lock stays contended past the
    /// configured window, and with `NotConnected` when the session is down;
    /// neither case leaves a queued message behind.
    pub async fn publish(
        &self,
        topic: &str,
        payload: impl Into<Vec<u8>>,
        qos: QoS,
        retain: bool,
    ) -> Result<()> {
        validate_topic(topic)?;
        let inner = self.lock_inner("publish").await?;
        self.check_connected()?;
        inner
            .client
            .publish(topic, to_mqtt_qos(qos), retain, payload.into())
            .await
            .map_err(|e| EstuaryError::Channel(e.to_string()))
    }

    /// Subscribe to a topic
    ///
    /// The subscription is tracked and restored on every reconnection.
    pub async fn subscribe(&self, topic: &str, qos: QoS) -> Result<()> {
        validate_topic(topic)?;
        let mut inner = self.lock_inner("subscribe").await?;
        self.check_connected()?;
        inner
            .client
            .subscribe(topic, to_mqtt_qos(qos))
            .await
            .map_err(|e| EstuaryError::Channel(e.to_string()))?;
        inner.subscriptions.insert(topic.to_string(), qos);
        Ok(())
    }

    /// Unsubscribe from a topic
    pub async fn unsubscribe(&self, topic: &str) -> Result<()> {
        validate_topic(topic)?;
        let mut inner = self.lock_inner("unsubscribe").await?;
        self.check_connected()?;
        inner
            .client
            .unsubscribe(topic)
            .await
            .map_err(|e| EstuaryError::Channel(e.to_string()))?;
        inner.subscriptions.remove(topic);
        Ok(())
    }

    /// Disconnect from the broker and stop the worker
    ///
    /// A no-op when never started or already shut down.
    pub async fn shutdown(&self) -> Result<()> {
        let mut task_guard = self.task.lock().await;
        let Some(handle) = task_guard.take() else {
            return Ok(());
        };

        {
            let inner = self.inner.lock().await;
            if let Err(e) = inner.client.try_disconnect() {
                debug!(error = %e, "disconnect request not queued");
            }
        }

        let _ = self.shutdown_tx.send(true);
        handle
            .await
            .map_err(|e| EstuaryError::Channel(format!("session worker join failed: {e}")))?;

        info!("session manager stopped");
        Ok(())
    }

    async fn lock_inner(
        &self,
        operation: &'static str,
    ) -> Result<tokio::sync::MutexGuard<'_, SessionInner>> {
        tokio::time::timeout(self.config.op_lock_timeout, self.inner.lock())
            .await
            .map_err(|_| EstuaryError::Busy { operation })
    }

    fn check_connected(&self) -> Result<()> {
        if self.state_rx.borrow().is_connected() {
            Ok(())
        } else {
            Err(EstuaryError::NotConnected)
        }
    }
}

/// Worker task driving the MQTT event loop
struct SessionWorker {
    inner: Arc<Mutex<SessionInner>>,
    state_tx: watch::Sender<SessionState>,
    event_tx: broadcast::Sender<StatusEvent>,
    data_observer: Arc<dyn DataObserver>,
    device_topic: String,
    auto_subscribe: bool,
    reconnect_pause: std::time::Duration,
    shutdown_rx: watch::Receiver<bool>,
    event_loop: EventLoop,
}

impl SessionWorker {
    async fn run(mut self) {
        debug!("session worker running");
        self.set_state(SessionState::Connecting);
        self.emit(StatusEvent::SessionConnecting);

        loop {
            tokio::select! {
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        break;
                    }
                }
                polled = self.event_loop.poll() => {
                    match polled {
                        Ok(event) => self.handle_event(event).await,
                        Err(e) => {
                            warn!(error = %e, "session poll failed");
                            self.set_state(SessionState::Error);
                            self.emit(StatusEvent::SessionError {
                                reason: e.to_string(),
                            });

                            tokio::select! {
                                _ = tokio::time::sleep(self.reconnect_pause) => {}
                                changed = self.shutdown_rx.changed() => {
                                    if changed.is_err() || *self.shutdown_rx.borrow() {
                                        break;
                                    }
                                }
                            }
                            self.set_state(SessionState::Connecting);
                            self.emit(StatusEvent::SessionConnecting);
                        }
                    }
                }
            }
        }

        if self.set_state(SessionState::Disconnected) {
            self.emit(StatusEvent::SessionDisconnected);
        }
        debug!("session worker stopped");
    }

    async fn handle_event(&mut self, event: Event) {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => {
                if ack.code == ConnectReturnCode::Success {
                    info!("session established");
                    self.set_state(SessionState::Connected);
                    self.emit(StatusEvent::SessionConnected);
                    self.restore_subscriptions().await;
                } else {
                    warn!(code = ?ack.code, "broker refused connection");
                    self.set_state(SessionState::Error);
                    self.emit(StatusEvent::SessionError {
                        reason: format!("broker refused connection: {:?}", ack.code),
                    });
                }
            }
            Event::Incoming(Packet::Publish(publish)) => {
                debug!(topic = %publish.topic, len = publish.payload.len(), "message received");
                self.data_observer.on_message(&publish.topic, &publish.payload);
                self.emit(StatusEvent::SessionMessage {
                    topic: publish.topic.clone(),
                    timestamp: chrono::Utc::now(),
                });
            }
            Event::Incoming(Packet::Disconnect) => {
                info!("broker closed the session");
                self.set_state(SessionState::Disconnected);
                self.emit(StatusEvent::SessionDisconnected);
            }
            _ => {}
        }
    }

    /// Re-issue the device subscription and every tracked caller subscription
    async fn restore_subscriptions(&mut self) {
        let inner = self.inner.lock().await;

        if self.auto_subscribe {
            if let Err(e) = inner
                .client
                .subscribe(&self.device_topic, rumqttc::QoS::AtLeastOnce)
                .await
            {
                warn!(topic = %self.device_topic, error = %e, "device subscription failed");
            }
        }

        for (topic, qos) in &inner.subscriptions {
            if let Err(e) = inner.client.subscribe(topic, to_mqtt_qos(*qos)).await {
                warn!(topic = %topic, error = %e, "subscription restore failed");
            }
        }
    }

    fn set_state(&self, state: SessionState) -> bool {
        self.state_tx.send_if_modified(|current| {
            if *current != state {
                *current = state;
                true
            } else {
                false
            }
        })
    }

    fn emit(&self, event: StatusEvent) {
        let _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::identity::HardwareId;
    use rumqttc::{ConnAck, Publish};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    struct RecordingObserver {
        messages: StdMutex<Vec<(String, Vec<u8>)>>,
    }

    impl RecordingObserver {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                messages: StdMutex::new(Vec::new()),
            })
        }

        fn messages(&self) -> Vec<(String, Vec<u8>)> {
            self.messages.lock().unwrap().clone()
        }
    }

    impl DataObserver for RecordingObserver {
        fn on_message(&self, topic: &str, payload: &[u8]) {
            self.messages
                .lock()
                .unwrap()
                .push((topic.to_string(), payload.to_vec()));
        }
    }

    fn test_config() -> SessionConfig {
        SessionConfig::new(
            "broker.invalid",
            HardwareId::new([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]),
        )
    }

    async fn manager_and_worker(
        config: SessionConfig,
        observer: Arc<RecordingObserver>,
    ) -> (SessionManager, SessionWorker) {
        let manager = SessionManager::new(config, observer).unwrap();
        let parts = manager.parts.lock().await.take().unwrap();
        let worker = manager.make_worker(parts);
        (manager, worker)
    }

    fn connack(code: ConnectReturnCode) -> Event {
        Event::Incoming(Packet::ConnAck(ConnAck {
            session_present: false,
            code,
        }))
    }

    #[tokio::test]
    async fn test_connack_success_connects_and_subscribes() {
        let observer = RecordingObserver::new();
        let (manager, mut worker) = manager_and_worker(test_config(), observer).await;
        let mut events = manager.subscribe_events();

        worker.handle_event(connack(ConnectReturnCode::Success)).await;

        assert!(manager.is_connected());
        assert_eq!(events.try_recv().unwrap(), StatusEvent::SessionConnected);
        assert_eq!(worker.device_topic, "sub/data/AABBCCDDEEFF");
    }

    #[tokio::test]
    async fn test_connack_refusal_enters_error() {
        let observer = RecordingObserver::new();
        let (manager, mut worker) =
            manager_and_worker(test_config(), observer).await;

        worker
            .handle_event(connack(ConnectReturnCode::BadUserNamePassword))
            .await;

        assert_eq!(manager.state(), SessionState::Error);
        assert!(!manager.is_connected());
    }

    #[tokio::test]
    async fn test_inbound_message_reaches_observer() {
        let observer = RecordingObserver::new();
        let (manager, mut worker) = manager_and_worker(test_config(), observer.clone()).await;
        let mut events = manager.subscribe_events();

        let publish = Publish::new(
            "sub/data/AABBCCDDEEFF",
            rumqttc::QoS::AtLeastOnce,
            b"hello".to_vec(),
        );
        worker.handle_event(Event::Incoming(Packet::Publish(publish))).await;

        let messages = observer.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, "sub/data/AABBCCDDEEFF");
        assert_eq!(messages[0].1, b"hello");

        match events.try_recv().unwrap() {
            StatusEvent::SessionMessage { topic, .. } => {
                assert_eq!(topic, "sub/data/AABBCCDDEEFF");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_broker_disconnect_packet() {
        let observer = RecordingObserver::new();
        let (manager, mut worker) = manager_and_worker(test_config(), observer).await;

        worker.handle_event(connack(ConnectReturnCode::Success)).await;
        assert!(manager.is_connected());

        worker.handle_event(Event::Incoming(Packet::Disconnect)).await;
        assert_eq!(manager.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_publish_while_disconnected_is_rejected() {
        let observer = RecordingObserver::new();
        let manager = SessionManager::new(test_config(), observer).unwrap();

        let err = manager
            .publish("pub/data/x", b"payload".to_vec(), QoS::AtMostOnce, false)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "NOT_CONNECTED");
        assert!(err.is_retriable());
    }

    #[tokio::test]
    async fn test_subscribe_while_disconnected_is_rejected() {
        let observer = RecordingObserver::new();
        let manager = SessionManager::new(test_config(), observer).unwrap();

        let err = manager.subscribe("some/topic", QoS::AtLeastOnce).await.unwrap_err();
        assert_eq!(err.error_code(), "NOT_CONNECTED");
        assert!(manager.inner.lock().await.subscriptions.is_empty());
    }

    #[tokio::test]
    async fn test_publish_invalid_topic_rejected_early() {
        let observer = RecordingObserver::new();
        let manager = SessionManager::new(test_config(), observer).unwrap();

        let err = manager
            .publish("", b"payload".to_vec(), QoS::AtMostOnce, false)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_TOPIC");
    }

    #[tokio::test(start_paused = true)]
    async fn test_contended_lock_reports_busy() {
        let observer = RecordingObserver::new();
        let config = test_config().with_op_lock_timeout(Duration::from_millis(100));
        let manager = SessionManager::new(config, observer).unwrap();

        let _held = manager.inner.lock().await;
        let err = manager
            .publish("pub/data/x", b"payload".to_vec(), QoS::AtMostOnce, false)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "BUSY");
        assert!(err.is_retriable());
    }

    #[tokio::test]
    async fn test_publish_when_connected_queues() {
        let observer = RecordingObserver::new();
        let (manager, mut worker) = manager_and_worker(test_config(), observer).await;
        worker.handle_event(connack(ConnectReturnCode::Success)).await;

        manager
            .publish("pub/data/x", b"payload".to_vec(), QoS::AtLeastOnce, false)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_subscription_tracked_for_restore() {
        let observer = RecordingObserver::new();
        let (manager, mut worker) = manager_and_worker(test_config(), observer).await;
        worker.handle_event(connack(ConnectReturnCode::Success)).await;

        manager.subscribe("extra/topic", QoS::AtLeastOnce).await.unwrap();
        assert_eq!(
            manager.inner.lock().await.subscriptions.get("extra/topic"),
            Some(&QoS::AtLeastOnce)
        );

        manager.unsubscribe("extra/topic").await.unwrap();
        assert!(manager.inner.lock().await.subscriptions.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_without_start_is_noop() {
        let observer = RecordingObserver::new();
        let manager = SessionManager::new(test_config(), observer).unwrap();
        assert!(manager.shutdown().await.is_ok());
        assert!(manager.shutdown().await.is_ok());
    }

    #[tokio::test]
    async fn test_spawned_worker_starts_and_joins() {
        let observer = RecordingObserver::new();
        let manager = SessionManager::new(test_config(), observer).unwrap();

        manager.start().await.unwrap();
        manager.start().await.unwrap();

        manager.shutdown().await.unwrap();
        assert_eq!(manager.state(), SessionState::Disconnected);
    }
}
