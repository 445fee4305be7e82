//! Link manager - owns the wireless association lifecycle
//!
//! The manager spawns one worker task that consumes driver events and runs
//! the retry loop: every disconnection increments the retry counter,
//! notifies the status stream, waits one fixed backoff interval and issues
//! a fresh connect request. There is no retry ceiling; availability wins
//! over giving up. Connect failures never surface to callers, only to the
//! status stream.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use estuary_core::{EstuaryError, LinkState, Result, RetryPolicy, StatusEvent};

use crate::config::LinkConfig;
use crate::driver::{LinkDriver, LinkEvent};

/// Pieces handed to the worker task on start
struct WorkerParts {
    driver: Box<dyn LinkDriver>,
    state_tx: watch::Sender<LinkState>,
}

/// Wireless link lifecycle manager
///
/// Construction allocates channels and validates arguments; it never fails
/// because the network is unreachable. [`start`] spawns the worker and is
/// idempotent; [`shutdown`] signals the worker, waits for it to exit and is
/// safe to call before [`start`] or repeatedly.
///
/// [`start`]: LinkManager::start
/// [`shutdown`]: LinkManager::shutdown
pub struct LinkManager {
    config: LinkConfig,
    parts: Mutex<Option<WorkerParts>>,
    task: Mutex<Option<JoinHandle<()>>>,
    state_rx: watch::Receiver<LinkState>,
    event_tx: broadcast::Sender<StatusEvent>,
    retry_count: Arc<AtomicU32>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl LinkManager {
    /// Create a manager around the given driver
    pub fn new(config: LinkConfig, driver: Box<dyn LinkDriver>) -> Result<Self> {
        config.validate()?;

        let (state_tx, state_rx) = watch::channel(LinkState::Disconnected);
        let (event_tx, _) = broadcast::channel(config.event_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config,
            parts: Mutex::new(Some(WorkerParts { driver, state_tx })),
            task: Mutex::new(None),
            state_rx,
            event_tx,
            retry_count: Arc::new(AtomicU32::new(0)),
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Bring up the driver and spawn the worker task
    ///
    /// A second call while running returns `Ok` without touching existing
    /// state. Driver bring-up failure restores the manager to its
    /// pre-start state before returning the error.
    pub async fn start(&self) -> Result<()> {
        let mut parts_guard = self.parts.lock().await;
        let Some(mut parts) = parts_guard.take() else {
            debug!("link manager already started");
            return Ok(());
        };

        if let Err(e) = parts
            .driver
            .start(&self.config.network_name, &self.config.credential)
            .await
        {
            *parts_guard = Some(parts);
            return Err(e);
        }

        let worker = LinkWorker {
            driver: parts.driver,
            state_tx: parts.state_tx,
            event_tx: self.event_tx.clone(),
            retry: RetryPolicy::new(self.config.retry_backoff),
            retry_count: self.retry_count.clone(),
            shutdown_rx: self.shutdown_rx.clone(),
        };

        let handle = tokio::spawn(worker.run());
        *self.task.lock().await = Some(handle);

        info!(network = %self.config.network_name, "link manager started");
        Ok(())
    }

    /// True while the link holds an address
    pub fn is_connected(&self) -> bool {
        self.state_rx.borrow().is_connected()
    }

    /// Snapshot of the current link state
    pub fn state(&self) -> LinkState {
        *self.state_rx.borrow()
    }

    /// Consecutive failed connect attempts since the last success
    pub fn retry_count(&self) -> u32 {
        self.retry_count.load(Ordering::SeqCst)
    }

    /// Subscribe to the status event stream
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.event_tx.subscribe()
    }

    /// Watch the link state without polling
    pub fn watch_state(&self) -> watch::Receiver<LinkState> {
        self.state_rx.clone()
    }

    /// Stop the worker and release the driver
    ///
    /// Signals the worker, waits for it to observe the signal and exit,
    /// then returns. A no-op when never started or already shut down.
    pub async fn shutdown(&self) -> Result<()> {
        let mut task_guard = self.task.lock().await;
        let Some(handle) = task_guard.take() else {
            return Ok(());
        };

        let _ = self.shutdown_tx.send(true);
        handle
            .await
            .map_err(|e| EstuaryError::Channel(format!("link worker join failed: {e}")))?;

        info!("link manager stopped");
        Ok(())
    }
}

/// Worker task consuming driver events and running the retry loop
struct LinkWorker {
    driver: Box<dyn LinkDriver>,
    state_tx: watch::Sender<LinkState>,
    event_tx: broadcast::Sender<StatusEvent>,
    retry: RetryPolicy,
    retry_count: Arc<AtomicU32>,
    shutdown_rx: watch::Receiver<bool>,
}

impl LinkWorker {
    async fn run(mut self) {
        debug!("link worker running");
        loop {
            tokio::select! {
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        break;
                    }
                }
                event = self.driver.next_event() => {
                    match event {
                        Some(event) => {
                            if !self.handle_event(event).await {
                                break;
                            }
                        }
                        None => {
                            warn!("link driver event stream ended");
                            break;
                        }
                    }
                }
            }
        }

        if let Err(e) = self.driver.stop().await {
            warn!(error = %e, "link driver stop failed");
        }
        if self.set_state(LinkState::Disconnected) {
            self.emit(StatusEvent::LinkDisconnected {
                attempt: self.retry.attempts(),
            });
        }
        debug!("link worker stopped");
    }

    /// Handle one driver event; returns false when shutdown was observed
    async fn handle_event(&mut self, event: LinkEvent) -> bool {
        match event {
            LinkEvent::Started => {
                debug!("link driver started, issuing first connect");
                self.set_state(LinkState::Connecting);
                self.emit(StatusEvent::LinkConnecting);
                self.issue_connect().await;
            }
            LinkEvent::GotAddress(address) => {
                info!(%address, "link connected");
                self.retry.record_success();
                self.retry_count.store(0, Ordering::SeqCst);
                self.set_state(LinkState::Connected(address));
                self.emit(StatusEvent::LinkConnected { address });
            }
            LinkEvent::Disconnected { reason } => {
                let attempt = self.retry.record_failure();
                self.retry_count.store(attempt, Ordering::SeqCst);
                warn!(attempt, reason = reason.as_deref().unwrap_or("none"), "link disconnected");

                self.set_state(LinkState::Disconnected);
                self.emit(StatusEvent::LinkDisconnected { attempt });

                // Persistent retry: one backoff interval, then reconnect
                self.set_state(LinkState::Connecting);
                self.emit(StatusEvent::LinkConnecting);

                tokio::select! {
                    _ = tokio::time::sleep(self.retry.interval()) => {}
                    changed = self.shutdown_rx.changed() => {
                        if changed.is_err() || *self.shutdown_rx.borrow() {
                            return false;
                        }
                    }
                }
                self.issue_connect().await;
            }
        }
        true
    }

    async fn issue_connect(&mut self) {
        if let Err(e) = self.driver.connect().await {
            // Not escalated; the status stream observes the failure and
            // the driver's next disconnect event re-enters the retry loop.
            warn!(error = %e, "connect request failed");
            self.set_state(LinkState::Failed);
            self.emit(StatusEvent::LinkFailed);
        }
    }

    fn set_state(&self, state: LinkState) -> bool {
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
