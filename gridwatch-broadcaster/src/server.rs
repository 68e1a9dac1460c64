//! Websocket endpoint for live dashboard subscribers

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::{BroadcasterError, Result};
use crate::registry::{SubscriberHandle, SubscriberId, SubscriberRegistry};

/// How long `stop` waits for open connections before aborting the server.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Default per-subscriber queue depth.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 256;

#[derive(Clone)]
struct AppState {
    registry: SubscriberRegistry,
    subscriber_buffer: usize,
}

/// Build the HTTP router: `GET /ws` (subscriber stream) and `GET /health`.
pub fn router(registry: SubscriberRegistry, subscriber_buffer: usize) -> Router {
    let state = AppState {
        registry,
        subscriber_buffer,
    };

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "subscribers": state.registry.len().await,
    }))
}

/// Registers the subscriber before the 101 response is sent, so a client
/// whose handshake has completed cannot miss the next broadcast.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let (handle, rx) = SubscriberHandle::channel(state.subscriber_buffer);
    let id = state.registry.register(handle).await;

    let failed_registry = state.registry.clone();
    ws.on_failed_upgrade(move |e| {
        tracing::debug!(subscriber = id, "Websocket upgrade failed: {}", e);
        tokio::spawn(async move {
            failed_registry.unregister(id).await;
        });
    })
    .on_upgrade(move |socket| handle_socket(socket, state, id, rx))
}

/// One subscriber connection.
///
/// A forwarding task drains the subscriber queue into the socket; this task
/// watches the inbound side. Whichever ends first tears the other down, and
/// the subscriber is unregistered on the way out.
async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    id: SubscriberId,
    mut rx: mpsc::Receiver<String>,
) {
    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
        // Queue closed (evicted) or socket gone
        let _ = sender.close().await;
    });

    let mut recv_task = tokio::spawn(async move {
        // Inbound frames only prove the client is alive
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.registry.unregister(id).await;
    tracing::debug!(subscriber = id, "Websocket connection closed");
}

/// HTTP/websocket server handing out subscriptions to a shared registry.
pub struct StreamServer {
    addr: SocketAddr,
    registry: SubscriberRegistry,
    subscriber_buffer: usize,
    serve_task: Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl StreamServer {
    pub fn new(addr: SocketAddr, registry: SubscriberRegistry) -> Self {
        Self {
            addr,
            registry,
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            serve_task: Mutex::new(None),
            shutdown_tx: Mutex::new(None),
            local_addr: Mutex::new(None),
        }
    }

    /// Queue depth per subscriber before it counts as lagging.
    pub fn with_subscriber_buffer(mut self, subscriber_buffer: usize) -> Self {
        self.subscriber_buffer = subscriber_buffer.max(1);
        self
    }

    pub fn registry(&self) -> &SubscriberRegistry {
        &self.registry
    }

    /// Bind and start serving in the background. Returns the bound address.
    pub async fn start(&self) -> Result<SocketAddr> {
        let mut serve_task = self.serve_task.lock().await;
        if serve_task.is_some() {
            return Err(BroadcasterError::AlreadyRunning);
        }

        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;
        let app = router(self.registry.clone(), self.subscriber_buffer);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                tracing::error!("Stream server error: {}", e);
            }
            tracing::info!("Stream server task stopped");
        });

        *serve_task = Some(task);
        *self.shutdown_tx.lock().await = Some(shutdown_tx);
        *self.local_addr.lock().await = Some(local_addr);

        tracing::info!(%local_addr, "Stream server listening (ws: /ws, health: /health)");
        Ok(local_addr)
    }

    /// Stop accepting connections and shut the server down.
    pub async fn stop(&self) -> Result<()> {
        let task = self
            .serve_task
            .lock()
            .await
            .take()
            .ok_or(BroadcasterError::NotStarted)?;

        if let Some(tx) = self.shutdown_tx.lock().await.take() {
            let _ = tx.send(());
        }

        let abort = task.abort_handle();
        if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
            tracing::warn!("Stream server did not drain in time, aborting");
            abort.abort();
        }

        *self.local_addr.lock().await = None;
        tracing::info!("Stream server stopped");
        Ok(())
    }

    /// Bound address while running
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().await
    }

    pub async fn subscriber_count(&self) -> usize {
        self.registry.len().await
    }
}
