//! Status renderer
//!
//! One dedicated task merges the three managers' status streams into a
//! bounded channel and projects each event through a [`StatusIndicator`].
//! The default indicator renders log lines; an embedder can supply its own
//! to drive hardware such as a status LED.

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use estuary_core::StatusEvent;

/// Capacity of the channel between the stream forwarders and the renderer
const RENDER_QUEUE_CAPACITY: usize = 64;

/// Projection of the unified status stream
pub trait StatusIndicator: Send + Sync {
    /// Render one event; must not block
    fn render(&self, event: &StatusEvent);
}

/// Indicator rendering structured log lines
pub struct LogIndicator;

impl StatusIndicator for LogIndicator {
    fn render(&self, event: &StatusEvent) {
        match event {
            StatusEvent::LinkConnecting => info!("link: connecting"),
            StatusEvent::LinkConnected { address } => info!(%address, "link: connected"),
            StatusEvent::LinkDisconnected { attempt } => {
                warn!(attempt, "link: disconnected")
            }
            StatusEvent::LinkFailed => warn!("link: connect attempt failed"),
            StatusEvent::SessionConnecting => info!("session: connecting"),
            StatusEvent::SessionConnected => info!("session: connected"),
            StatusEvent::SessionDisconnected => warn!("session: disconnected"),
            StatusEvent::SessionError { reason } => warn!(%reason, "session: error"),
            StatusEvent::SessionMessage { topic, .. } => info!(%topic, "session: message"),
            StatusEvent::FrameReceived { len } => info!(len, "serial: frame received"),
        }
    }
}

/// Spawn the renderer over the given status streams
///
/// Each stream gets a forwarder into the bounded render queue, so a slow
/// indicator makes the renderer fall behind without stalling any manager.
pub fn spawn_renderer(
    indicator: Arc<dyn StatusIndicator>,
    sources: Vec<broadcast::Receiver<StatusEvent>>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let (tx, mut rx) = mpsc::channel(RENDER_QUEUE_CAPACITY);

    for mut source in sources {
        let tx = tx.clone();
        tokio::spawn(async move {
            loop {
                match source.recv().await {
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "status renderer lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
    drop(tx);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                event = rx.recv() => {
                    match event {
                        Some(event) => indicator.render(&event),
                        None => break,
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct RecordingIndicator {
        events: StdMutex<Vec<StatusEvent>>,
    }

    impl RecordingIndicator {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                events: StdMutex::new(Vec::new()),
            })
        }

        fn events(&self) -> Vec<StatusEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    impl StatusIndicator for RecordingIndicator {
        fn render(&self, event: &StatusEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    async fn settle() {
        for _ in 0..30 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_events_from_multiple_streams_rendered() {
        let indicator = RecordingIndicator::new();
        let (link_tx, link_rx) = broadcast::channel(8);
        let (session_tx, session_rx) = broadcast::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = spawn_renderer(indicator.clone(), vec![link_rx, session_rx], shutdown_rx);

        link_tx.send(StatusEvent::LinkConnecting).unwrap();
        session_tx.send(StatusEvent::SessionConnected).unwrap();
        settle().await;

        let events = indicator.events();
        assert_eq!(events.len(), 2);
        assert!(events.contains(&StatusEvent::LinkConnecting));
        assert!(events.contains(&StatusEvent::SessionConnected));

        let _ = shutdown_tx.send(true);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_renderer_exits_when_streams_close() {
        let indicator = RecordingIndicator::new();
        let (link_tx, link_rx) = broadcast::channel(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = spawn_renderer(indicator, vec![link_rx], shutdown_rx);
        drop(link_tx);

        handle.await.unwrap();
    }
}
