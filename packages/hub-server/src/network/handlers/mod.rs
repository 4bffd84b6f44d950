//! HTTP and WebSocket handlers.
//!
//! Defines `AppState`, the shared state carried through axum extractors,
//! and re-exports the handler functions the router wires up.

pub mod api;
pub mod health;
pub mod websocket;

pub use api::{command_handler, status_handler, telemetry_handler};
pub use health::{health_handler, liveness_handler, readiness_handler, root_handler};
pub use websocket::ws_handler;

use std::sync::Arc;
use std::time::Instant;

use crate::config::HubConfig;
use crate::correlator::CommandCorrelator;
use crate::registry::ConnectionRegistry;
use crate::router::MessageRouter;
use crate::telemetry::TelemetryStore;

use super::shutdown::ShutdownController;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::time::Instant;

    use super::AppState;
    use crate::config::HubConfig;
    use crate::correlator::CommandCorrelator;
    use crate::network::shutdown::ShutdownController;
    use crate::registry::ConnectionRegistry;
    use crate::router::MessageRouter;
    use crate::telemetry::TelemetryStore;

    pub(crate) fn test_state() -> AppState {
        test_state_with(HubConfig::default())
    }

    pub(crate) fn test_state_with(config: HubConfig) -> AppState {
        let config = Arc::new(config);
        let registry = Arc::new(ConnectionRegistry::new());
        let correlator = Arc::new(CommandCorrelator::new(config.history_cap));
        let telemetry = Arc::new(TelemetryStore::new(None, config.persist_interval));
        let router = Arc::new(MessageRouter::new(
            Arc::clone(&registry),
            Arc::clone(&correlator),
            Arc::clone(&telemetry),
            Arc::clone(&config),
        ));
        AppState {
            registry,
            correlator,
            telemetry,
            router,
            shutdown: Arc::new(ShutdownController::new()),
            config,
            started_at: Instant::now(),
        }
    }
}

/// Shared application state; every field is an `Arc` so clones are cheap.
#[derive(Clone)]
pub struct AppState {
    /// All active connections.
    pub registry: Arc<ConnectionRegistry>,
    /// Command bookkeeping.
    pub correlator: Arc<CommandCorrelator>,
    /// Telemetry cache and sink.
    pub telemetry: Arc<TelemetryStore>,
    /// The frame dispatcher driving every WebSocket session.
    pub router: Arc<MessageRouter>,
    /// Shutdown coordination and health state.
    pub shutdown: Arc<ShutdownController>,
    /// Frozen settings record.
    pub config: Arc<HubConfig>,
    /// Process start, for uptime reporting.
    pub started_at: Instant,
}
