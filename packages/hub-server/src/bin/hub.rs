//! TradeHub entry point.

use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tradehub_server::{HubConfig, HubModule, SinkConfig};

#[derive(Debug, Parser)]
#[command(name = "hub", about = "Central message hub for trading pipeline workers")]
struct Args {
    /// Bind address.
    #[arg(long, env = "HUB_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Listen port.
    #[arg(long, env = "HUB_PORT", default_value_t = 8000)]
    port: u16,

    /// Shared secret workers present during authentication.
    #[arg(long, env = "HUB_TOKEN", default_value = "change-me-in-production")]
    token: String,

    /// Seconds a new connection gets to authenticate.
    #[arg(long, env = "HUB_AUTH_TIMEOUT", default_value_t = 5)]
    auth_timeout: u64,

    /// Allowed CORS origins, comma-separated; `*` allows any.
    #[arg(long, env = "HUB_CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    cors_origins: Vec<String>,

    /// Base URL of the telemetry store; telemetry stays in memory when unset.
    #[arg(long, env = "HUB_TELEMETRY_URL")]
    telemetry_url: Option<String>,

    /// API key for the telemetry store.
    #[arg(long, env = "HUB_TELEMETRY_KEY")]
    telemetry_key: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let telemetry_sink = args
        .telemetry_url
        .zip(args.telemetry_key)
        .map(|(url, key)| SinkConfig { url, key });
    if telemetry_sink.is_none() {
        info!("telemetry store not configured, telemetry will be in-memory only");
    }

    let config = HubConfig {
        host: args.host.clone(),
        port: args.port,
        shared_secret: args.token,
        auth_timeout: Duration::from_secs(args.auth_timeout),
        cors_origins: args.cors_origins,
        telemetry_sink,
        ..HubConfig::default()
    };

    let mut module = HubModule::new(config);
    let port = module.start().await?;
    info!(
        "TradeHub v{} starting on {}:{}",
        env!("CARGO_PKG_VERSION"),
        args.host,
        port
    );

    module
        .serve(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
}
