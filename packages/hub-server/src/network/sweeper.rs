//! Periodic background sweep.
//!
//! One task per hub: on each tick it evicts connections whose last parsed
//! frame is older than the stale threshold, then drops unacknowledged
//! commands past their timeout. The sweep never closes transports --
//! eviction makes the next send fail, and the receive side then observes
//! the disconnect.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

use tradehub_core::now_ts;

use crate::config::HubConfig;
use crate::correlator::CommandCorrelator;
use crate::registry::ConnectionRegistry;

/// Spawns the sweep task; it exits when `shutdown` fires.
pub fn spawn(
    registry: Arc<ConnectionRegistry>,
    correlator: Arc<CommandCorrelator>,
    config: Arc<HubConfig>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.sweep_interval);
        // The first tick completes immediately; skip it so the first sweep
        // happens one full interval after startup.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    sweep_stale_connections(&registry, &config);
                    correlator.expire_stale(config.command_timeout);
                }
                _ = shutdown.changed() => break,
            }
        }
    })
}

/// Evicts every connection whose nonzero last-message stamp is older than
/// the stale threshold.
fn sweep_stale_connections(registry: &ConnectionRegistry, config: &HubConfig) {
    let now = now_ts();
    let threshold = config.stale_threshold.as_secs_f64();
    for conn in registry.connections_snapshot() {
        let last = conn.last_message_at();
        if last > 0.0 && now - last > threshold {
            warn!(instance_id = %conn.instance_id, "removing stale connection");
            registry.deregister(&conn.instance_id, &conn);
        }
    }
}
