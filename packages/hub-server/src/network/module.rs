//! Hub module with deferred startup lifecycle.
//!
//! `new()` allocates the shared state (registry, correlator, telemetry,
//! router, shutdown controller), `start()` binds the TCP listener, and
//! `serve()` accepts connections until the shutdown future resolves. The
//! separation lets callers reach the shared state -- and tests learn the
//! OS-assigned port -- before traffic starts.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::HubConfig;
use crate::correlator::CommandCorrelator;
use crate::registry::ConnectionRegistry;
use crate::router::MessageRouter;
use crate::telemetry::{RestSink, TelemetrySink, TelemetryStore};

use super::handlers::{
    command_handler, health_handler, liveness_handler, readiness_handler, root_handler,
    status_handler, telemetry_handler, ws_handler, AppState,
};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;
use super::sweeper;

/// How long `serve` waits for connection tasks after the close frames.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Owns the full HTTP/WebSocket server lifecycle and the hub singletons.
pub struct HubModule {
    config: Arc<HubConfig>,
    listener: Option<TcpListener>,
    registry: Arc<ConnectionRegistry>,
    correlator: Arc<CommandCorrelator>,
    telemetry: Arc<TelemetryStore>,
    router: Arc<MessageRouter>,
    shutdown: Arc<ShutdownController>,
    started_at: Instant,
}

impl HubModule {
    /// Allocates the hub state without binding any port.
    #[must_use]
    pub fn new(config: HubConfig) -> Self {
        let config = Arc::new(config);
        let registry = Arc::new(ConnectionRegistry::new());
        let correlator = Arc::new(CommandCorrelator::new(config.history_cap));
        let sink = config.telemetry_sink.as_ref().map(|sink_config| {
            Arc::new(RestSink::new(&sink_config.url, &sink_config.key)) as Arc<dyn TelemetrySink>
        });
        let telemetry = Arc::new(TelemetryStore::new(sink, config.persist_interval));
        let router = Arc::new(MessageRouter::new(
            Arc::clone(&registry),
            Arc::clone(&correlator),
            Arc::clone(&telemetry),
            Arc::clone(&config),
        ));

        Self {
            config,
            listener: None,
            registry,
            correlator,
            telemetry,
            router,
            shutdown: Arc::new(ShutdownController::new()),
            started_at: Instant::now(),
        }
    }

    /// Shared reference to the connection registry.
    #[must_use]
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Shared reference to the command correlator.
    #[must_use]
    pub fn correlator(&self) -> Arc<CommandCorrelator> {
        Arc::clone(&self.correlator)
    }

    /// Shared reference to the telemetry store.
    #[must_use]
    pub fn telemetry(&self) -> Arc<TelemetryStore> {
        Arc::clone(&self.telemetry)
    }

    /// Shared reference to the shutdown controller.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Assembles the axum router with every route and the middleware stack.
    #[must_use]
    pub fn build_router(&self) -> Router {
        let state = AppState {
            registry: Arc::clone(&self.registry),
            correlator: Arc::clone(&self.correlator),
            telemetry: Arc::clone(&self.telemetry),
            router: Arc::clone(&self.router),
            shutdown: Arc::clone(&self.shutdown),
            config: Arc::clone(&self.config),
            started_at: self.started_at,
        };

        Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .route("/api/v1/status", get(status_handler))
            .route("/api/v1/telemetry/{instance_id}", get(telemetry_handler))
            .route("/api/v1/command", post(command_handler))
            .route("/ws/{instance_id}", get(ws_handler))
            .layer(build_http_layers(&self.config))
            .with_state(state)
    }

    /// Binds the TCP listener.
    ///
    /// Returns the bound port, which differs from the configured one when
    /// port 0 requested an OS-assigned port.
    ///
    /// # Errors
    ///
    /// Returns an error when the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();
        info!("listening on {}:{}", self.config.host, port);
        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves until the shutdown future resolves, then drains.
    ///
    /// Consumes `self`: the listener moves into the server. On shutdown,
    /// the sweep task stops, every connection receives a close frame, and
    /// the server waits up to 30 seconds for connection tasks to unwind.
    ///
    /// # Errors
    ///
    /// Returns an error on a fatal I/O failure.
    ///
    /// # Panics
    ///
    /// Panics when `start()` was not called first.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .take()
            .expect("start() must be called before serve()");
        let router = self.build_router();

        let sweeper = sweeper::spawn(
            Arc::clone(&self.registry),
            Arc::clone(&self.correlator),
            Arc::clone(&self.config),
            self.shutdown.subscribe(),
        );

        self.shutdown.set_ready();
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        drain_connections(&self.registry, &self.shutdown).await;
        let _ = sweeper.await;
        Ok(())
    }
}

/// Signals shutdown, sends every connection a close frame, and waits for
/// the connection tasks to unwind. Pending sends may be dropped.
async fn drain_connections(registry: &ConnectionRegistry, shutdown: &ShutdownController) {
    shutdown.trigger_shutdown();

    let connections = registry.connections_snapshot();
    if !connections.is_empty() {
        info!(count = connections.len(), "draining connections");
        for conn in &connections {
            let _ = conn.close(1001, "server shutting down");
        }
    }

    if shutdown.wait_for_drain(DRAIN_TIMEOUT).await {
        info!("all connections drained");
    } else {
        warn!("drain timeout expired with connections remaining");
    }
}
