//! Transport bridge - owns the serial port lifecycle
//!
//! Starting the bridge splits the port and spawns a reader loop that
//! delivers raw chunks to the [`FrameObserver`]. Transmission goes through
//! a writer lock so concurrent frames never interleave on the wire, and a
//! write that accepts fewer bytes than requested is an error, not a silent
//! truncation. Read errors are logged and the loop continues; the line
//! itself has no connection to lose.

use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use estuary_core::{EstuaryError, FrameObserver, Result, StatusEvent, TransportState};

use crate::config::TransportConfig;
use crate::port::{SerialPort, SerialReader, SerialWriter};

/// Serial transport lifecycle manager
///
/// Construction validates the config and takes ownership of an unopened
/// port; [`start`] splits it and brings up the reader loop. [`shutdown`]
/// stops the loop and releases both halves, after which [`transmit`]
/// reports not initialized. Both are idempotent.
///
/// [`start`]: TransportBridge::start
/// [`shutdown`]: TransportBridge::shutdown
/// [`transmit`]: TransportBridge::transmit
pub struct TransportBridge {
    config: TransportConfig,
    port: Mutex<Option<Box<dyn SerialPort>>>,
    writer: Mutex<Option<Box<dyn SerialWriter>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    state_tx: watch::Sender<TransportState>,
    state_rx: watch::Receiver<TransportState>,
    event_tx: broadcast::Sender<StatusEvent>,
    frame_observer: Arc<dyn FrameObserver>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl TransportBridge {
    /// Create a bridge over the given port
    pub fn new(
        config: TransportConfig,
        port: Box<dyn SerialPort>,
        frame_observer: Arc<dyn FrameObserver>,
    ) -> Result<Self> {
        config.validate()?;

        let (state_tx, state_rx) = watch::channel(TransportState::Uninitialized);
        let (event_tx, _) = broadcast::channel(config.event_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config,
            port: Mutex::new(Some(port)),
            writer: Mutex::new(None),
            task: Mutex::new(None),
            state_tx,
            state_rx,
            event_tx,
            frame_observer,
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Split the port and spawn the reader loop
    ///
    /// Idempotent; a second call returns `Ok` without touching the running
    /// loop.
    pub async fn start(&self) -> Result<()> {
        let mut port_guard = self.port.lock().await;
        let Some(port) = port_guard.take() else {
            debug!("transport bridge already started");
            return Ok(());
        };

        let (reader, writer) = port.split();
        *self.writer.lock().await = Some(writer);

        let loop_task = ReaderLoop {
            reader,
            buffer: vec![0u8; self.config.read_buffer_size],
            read_timeout: self.config.read_timeout,
            frame_observer: self.frame_observer.clone(),
            event_tx: self.event_tx.clone(),
            shutdown_rx: self.shutdown_rx.clone(),
        };
        let handle = tokio::spawn(loop_task.run());
        *self.task.lock().await = Some(handle);

        let _ = self.state_tx.send(TransportState::Running);
        info!(port = %self.config.port, baud = self.config.baud_rate, "transport bridge started");
        Ok(())
    }

    /// Snapshot of the current transport state
    pub fn state(&self) -> TransportState {
        *self.state_rx.borrow()
    }

    /// True while the reader loop runs and transmit is usable
    pub fn is_running(&self) -> bool {
        self.state() == TransportState::Running
    }

    /// Subscribe to the status event stream
    pub fn subscribe_events(&self) -> broadcast::Receiver<StatusEvent> {
        self.event_tx.subscribe()
    }

    /// Watch the transport state without polling
    pub fn watch_state(&self) -> watch::Receiver<TransportState> {
        self.state_rx.clone()
    }

    /// Transmit one frame, whole or not at all
    ///
    /// Frames from concurrent callers are serialized through the writer
    /// lock; the wait is unbounded. A write accepted only partially fails
    /// with `ShortWrite` carrying both counts.
    pub async fn transmit(&self, data: &[u8]) -> Result<usize> {
        if data.is_empty() {
            return Err(EstuaryError::InvalidFrame("frame is empty".to_string()));
        }
        if self.state() != TransportState::Running {
            return Err(EstuaryError::NotInitialized {
                component: "transport",
            });
        }

        let mut writer_guard = self.writer.lock().await;
        let writer = writer_guard.as_mut().ok_or(EstuaryError::NotInitialized {
            component: "transport",
        })?;

        let accepted = writer.write_all_bytes(data).await?;
        if accepted < data.len() {
            return Err(EstuaryError::ShortWrite {
                requested: data.len(),
                accepted,
            });
        }
        debug!(len = accepted, "frame transmitted");
        Ok(accepted)
    }

    /// Stop the reader loop and release the port
    ///
    /// A no-op when never started or already shut down.
    pub async fn shutdown(&self) -> Result<()> {
        let mut task_guard = self.task.lock().await;
        let Some(handle) = task_guard.take() else {
            return Ok(());
        };

        let _ = self.shutdown_tx.send(true);
        handle
            .await
            .map_err(|e| EstuaryError::Channel(format!("reader loop join failed: {e}")))?;

        *self.writer.lock().await = None;
        let _ = self.state_tx.send(TransportState::Stopped);
        info!("transport bridge stopped");
        Ok(())
    }
}

/// Reader task polling the port and fanning chunks out
struct ReaderLoop {
    reader: Box<dyn SerialReader>,
    buffer: Vec<u8>,
    read_timeout: std::time::Duration,
    frame_observer: Arc<dyn FrameObserver>,
    event_tx: broadcast::Sender<StatusEvent>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ReaderLoop {
    async fn run(mut self) {
        debug!("reader loop running");
        loop {
            tokio::select! {
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        break;
                    }
                }
                read = tokio::time::timeout(
                    self.read_timeout,
                    self.reader.read_chunk(&mut self.buffer),
                ) => {
                    match read {
                        Ok(Ok(0)) | Err(_) => {}
                        Ok(Ok(n)) => {
                            self.frame_observer.on_frame(&self.buffer[..n]);
                            let _ = self.event_tx.send(StatusEvent::FrameReceived { len: n });
                        }
                        Ok(Err(e)) => {
                            // The line has no session to drop; log and keep polling
                            warn!(error = %e, "serial read failed");
                        }
                    }
                }
            }
        }
        debug!("reader loop stopped");
    }
}
