//! estuary-gateway binary
//!
//! Bridges a serial line to an MQTT broker across an unreliable wireless
//! link. Bring-up order is link, session, transport, router; ctrl-c tears
//! down in reverse.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use estuary_gateway::router::{BrokerIngress, FrameRouter, Publisher, SerialIngress};
use estuary_gateway::status::{spawn_renderer, LogIndicator};
use estuary_gateway::GatewayConfig;
use estuary_link::{HostLinkDriver, LinkManager};
use estuary_session::SessionManager;
use estuary_transport::{TransportBridge, UartPort};

/// Capacity of the ingress channels feeding the router
const ROUTER_QUEUE_CAPACITY: usize = 64;

#[derive(Parser, Debug)]
#[command(name = "estuary-gateway", version, about = "Serial to MQTT bridge gateway")]
struct Args {
    /// Path to the JSON configuration file
    #[arg(short, long, default_value = "gateway.json")]
    config: PathBuf,

    /// Serial port override
    #[arg(long)]
    port: Option<String>,

    /// Broker host override
    #[arg(long)]
    broker: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) {
    let default_filter = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut config = GatewayConfig::load(&args.config)?;
    if let Some(port) = args.port {
        config.transport.port = port;
    }
    if let Some(broker) = args.broker {
        config.session.broker_host = broker;
    }
    config.validate().context("invalid configuration")?;

    // Link first; the session is only worth starting once an address exists
    let link = Arc::new(LinkManager::new(
        config.link.clone(),
        Box::new(HostLinkDriver::new()),
    )?);
    link.start().await.context("link bring-up failed")?;

    let mut link_state = link.watch_state();
    while !link_state.borrow().is_connected() {
        link_state
            .changed()
            .await
            .context("link manager stopped before connecting")?;
    }
    info!(state = %link.state(), "link ready");

    // Session next, feeding inbound broker messages to the router
    let (broker_ingress, message_rx) = BrokerIngress::new(ROUTER_QUEUE_CAPACITY);
    let session = Arc::new(SessionManager::new(config.session.clone(), broker_ingress)?);
    session.start().await.context("session bring-up failed")?;

    // Transport last, feeding inbound serial chunks to the router
    let (serial_ingress, frame_rx) = SerialIngress::new(ROUTER_QUEUE_CAPACITY);
    let port = UartPort::open(&config.transport.port, config.transport.baud_rate)?;
    let transport = Arc::new(TransportBridge::new(
        config.transport.clone(),
        Box::new(port),
        serial_ingress,
    )?);
    transport.start().await.context("transport bring-up failed")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let router = FrameRouter::new(
        session.clone() as Arc<dyn Publisher>,
        transport.clone(),
        config.session.pub_topic_prefix.clone(),
        frame_rx,
        message_rx,
        shutdown_rx.clone(),
    );
    let router_task = tokio::spawn(router.run());

    let renderer = spawn_renderer(
        Arc::new(LogIndicator),
        vec![
            link.subscribe(),
            session.subscribe_events(),
            transport.subscribe_events(),
        ],
        shutdown_rx,
    );

    info!("gateway running, press ctrl-c to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutdown requested");

    let _ = shutdown_tx.send(true);
    transport.shutdown().await?;
    session.shutdown().await?;
    link.shutdown().await?;
    let _ = router_task.await;
    let _ = renderer.await;

    info!("gateway stopped");
    Ok(())
}
