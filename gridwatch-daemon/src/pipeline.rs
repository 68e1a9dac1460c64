//! Wiring of the GridWatch stages into runnable services

use anyhow::{Context, Result};
use gridwatch_broadcaster::{EventBroadcaster, LogWatcher, StreamServer, SubscriberRegistry};
use gridwatch_classifier::Enricher;
use gridwatch_log::LogTailer;
use std::net::SocketAddr;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::DaemonConfig;
use crate::simulator::run_simulator;

/// Cloneable shutdown flag shared by every service in the process
#[derive(Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Trigger side of [`Shutdown`]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    pub fn new() -> (ShutdownTrigger, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (ShutdownTrigger { tx }, Shutdown { rx })
    }

    /// Resolves once shutdown has been triggered (or the trigger dropped).
    pub async fn wait(mut self) {
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

/// Tail the event log and stream it to websocket subscribers.
///
/// `on_ready` receives the bound address once the server is listening.
pub async fn serve(
    config: &DaemonConfig,
    shutdown: Shutdown,
    on_ready: impl FnOnce(SocketAddr),
) -> Result<()> {
    let registry = SubscriberRegistry::new();

    let server = StreamServer::new(config.server.socket_addr(), registry.clone())
        .with_subscriber_buffer(config.broadcaster.subscriber_buffer);
    let addr = server
        .start()
        .await
        .with_context(|| format!("Failed to bind {}", config.server.socket_addr()))?;
    on_ready(addr);

    let tailer = LogTailer::open(&config.log.event_path, config.log.start_from)
        .await
        .context("Failed to open event log")?;
    let mut broadcaster =
        EventBroadcaster::new(tailer, registry, config.broadcaster.to_config());

    if config.broadcaster.watch_filesystem {
        match LogWatcher::new(&config.log.event_path) {
            Ok(watcher) => broadcaster = broadcaster.with_watcher(watcher),
            Err(e) => warn!("Filesystem watch unavailable, polling only: {}", e),
        }
    }

    info!(
        "Streaming {} to ws://{}/ws",
        config.log.event_path.display(),
        addr
    );

    let result = broadcaster.run(shutdown.wait()).await;

    server.stop().await.context("Failed to stop stream server")?;
    result.context("Event broadcaster failed")
}

/// Classify the input log into the event log.
pub async fn enrich(config: &DaemonConfig, shutdown: Shutdown) -> Result<()> {
    let mut enricher = Enricher::open(
        &config.log.input_path,
        &config.log.event_path,
        config.enricher.to_config(),
    )
    .await
    .context("Failed to open enricher logs")?;

    enricher
        .run(shutdown.wait())
        .await
        .context("Enricher failed")
}

/// Generate readings into the input log.
pub async fn simulate(config: &DaemonConfig, limit: Option<u64>, shutdown: Shutdown) -> Result<u64> {
    run_simulator(&config.log.input_path, &config.simulator, limit, shutdown.wait()).await
}

/// Simulator, enricher and server in one process.
///
/// The first stage to fail takes the others down with it.
pub async fn run_all(config: &DaemonConfig, shutdown: Shutdown) -> Result<()> {
    let (stop_stages, stages) = Shutdown::new();
    let stop = &stop_stages;

    let all_stages = async {
        tokio::join!(
            async {
                let res = simulate(config, None, stages.clone()).await;
                if res.is_err() {
                    stop.trigger();
                }
                res
            },
            async {
                let res = enrich(config, stages.clone()).await;
                if res.is_err() {
                    stop.trigger();
                }
                res
            },
            async {
                let res = serve(config, stages.clone(), |_| {}).await;
                if res.is_err() {
                    stop.trigger();
                }
                res
            },
        )
    };
    tokio::pin!(all_stages);

    let (sim, enr, srv) = tokio::select! {
        results = &mut all_stages => results,
        _ = shutdown.wait() => {
            info!("Stopping all stages");
            stop.trigger();
            all_stages.await
        }
    };

    sim.context("Simulator stopped")?;
    enr?;
    srv
}
