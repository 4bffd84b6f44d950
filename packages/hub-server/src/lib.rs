//! TradeHub server -- the central WebSocket hub for a distributed trading
//! pipeline.
//!
//! Independent workers (market data connectors, preditors, executors,
//! dashboards, admin clients) connect over `/ws/{instance_id}`, declare a
//! role during a shared-secret handshake, and exchange typed JSON frames.
//! The hub fans each message class out to the roles subscribed to it,
//! relays admin commands point-to-point and correlates the acks back to
//! their issuers, and absorbs telemetry with periodic durable persistence.

pub mod auth;
pub mod config;
pub mod correlator;
pub mod network;
pub mod registry;
pub mod router;
pub mod telemetry;

pub use config::{ConnectionConfig, HubConfig, SinkConfig};
pub use correlator::CommandCorrelator;
pub use network::{HubModule, ShutdownController};
pub use registry::{ConnectionRegistry, OutboundFrame};
pub use router::MessageRouter;
pub use telemetry::{TelemetrySink, TelemetryStore};
