//! Hub configuration types.
//!
//! The settings record is immutable after load: the binary builds it from
//! flags and environment, tests construct it literally, and everything
//! downstream receives it behind an `Arc`.

use std::time::Duration;

/// Top-level hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Bind address.
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    /// Shared secret expected in `auth` frames and REST command bodies.
    pub shared_secret: String,
    /// Grace window in which a new connection must authenticate.
    pub auth_timeout: Duration,
    /// Idle age after which the sweep evicts a connection.
    pub stale_threshold: Duration,
    /// Cadence of the background sweep task.
    pub sweep_interval: Duration,
    /// Age after which an unacknowledged command is dropped.
    pub command_timeout: Duration,
    /// Completed commands retained in the correlator history.
    pub history_cap: usize,
    /// Minimum spacing between durable telemetry writes per instance.
    pub persist_interval: Duration,
    /// Allowed CORS origins for the HTTP surface.
    pub cors_origins: Vec<String>,
    /// Maximum time for one HTTP request to complete.
    pub request_timeout: Duration,
    /// Per-connection settings.
    pub connection: ConnectionConfig,
    /// Optional durable telemetry sink; `None` keeps telemetry in memory.
    pub telemetry_sink: Option<SinkConfig>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 0,
            shared_secret: "change-me-in-production".to_owned(),
            auth_timeout: Duration::from_secs(5),
            stale_threshold: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
            command_timeout: Duration::from_secs(30),
            history_cap: 100,
            persist_interval: Duration::from_secs(30),
            cors_origins: vec!["*".to_owned()],
            request_timeout: Duration::from_secs(30),
            connection: ConnectionConfig::default(),
            telemetry_sink: None,
        }
    }
}

/// Per-connection settings.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Bounded outbound queue capacity per connection. A peer whose queue
    /// stays full fails its next fan-out write and is evicted.
    pub outbound_channel_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            outbound_channel_capacity: 256,
        }
    }
}

/// Location of the REST telemetry sink.
///
/// No `Default`: a sink without an endpoint has no sensible value.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// Base URL of the store.
    pub url: String,
    /// API key sent with every insert.
    pub key: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hub_config_defaults() {
        let config = HubConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 0);
        assert_eq!(config.auth_timeout, Duration::from_secs(5));
        assert_eq!(config.stale_threshold, Duration::from_secs(300));
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.command_timeout, Duration::from_secs(30));
        assert_eq!(config.history_cap, 100);
        assert_eq!(config.persist_interval, Duration::from_secs(30));
        assert_eq!(config.cors_origins, vec!["*"]);
        assert!(config.telemetry_sink.is_none());
    }

    #[test]
    fn connection_config_defaults() {
        assert_eq!(ConnectionConfig::default().outbound_channel_capacity, 256);
    }
}
