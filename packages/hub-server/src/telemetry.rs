//! Telemetry store: short-window in-memory cache with periodic durable
//! persistence.
//!
//! Every telemetry frame is enriched with the sender's instance id and a
//! server timestamp, cached as that instance's latest, and counted. When a
//! sink is configured and the per-instance persistence interval has
//! elapsed, a durable insert is scheduled fire-and-forget; insert failures
//! are logged and otherwise invisible.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::error;

use tradehub_core::now_ts;

/// Window within which a telemetry sender counts as a live instance.
const LIVENESS_WINDOW_SECS: f64 = 300.0;

/// Error from a durable telemetry insert.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The HTTP round trip to the store failed.
    #[error("telemetry insert failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Row shape written to the durable store.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryRecord {
    pub instance_id: String,
    pub balance: Option<f64>,
    pub equity: Option<f64>,
    pub status: Option<String>,
    /// The full enriched payload, kept alongside the projected columns.
    pub raw_data: Value,
}

impl TelemetryRecord {
    fn from_enriched(instance_id: &str, enriched: &Value) -> Self {
        Self {
            instance_id: instance_id.to_owned(),
            balance: enriched["balance"].as_f64(),
            equity: enriched["equity"].as_f64(),
            status: enriched["status"].as_str().map(str::to_owned),
            raw_data: enriched.clone(),
        }
    }
}

/// Synchronous receipt returned to the reporting worker.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TelemetryReceipt {
    pub status: &'static str,
    pub count: u64,
}

/// Durable store seam. The hub only ever inserts.
#[async_trait]
pub trait TelemetrySink: Send + Sync + 'static {
    /// Writes one record. Called from a spawned task; errors are logged by
    /// the caller.
    async fn insert(&self, record: TelemetryRecord) -> Result<(), SinkError>;
}

/// REST implementation of [`TelemetrySink`] (PostgREST-style endpoint).
pub struct RestSink {
    client: reqwest::Client,
    endpoint: String,
    key: String,
}

impl RestSink {
    /// Builds a sink posting to `{base_url}/rest/v1/telemetry`.
    #[must_use]
    pub fn new(base_url: &str, key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}/rest/v1/telemetry", base_url.trim_end_matches('/')),
            key: key.to_owned(),
        }
    }
}

#[async_trait]
impl TelemetrySink for RestSink {
    async fn insert(&self, record: TelemetryRecord) -> Result<(), SinkError> {
        self.client
            .post(&self.endpoint)
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
            .json(&record)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[derive(Default)]
struct Inner {
    latest: HashMap<String, Value>,
    last_received: HashMap<String, f64>,
    last_persist: HashMap<String, f64>,
    counts: HashMap<String, u64>,
}

/// In-memory telemetry state plus the optional durable sink.
pub struct TelemetryStore {
    sink: Option<Arc<dyn TelemetrySink>>,
    persist_interval: Duration,
    inner: Mutex<Inner>,
}

impl TelemetryStore {
    /// Creates a store. With `sink: None` telemetry stays in memory only.
    #[must_use]
    pub fn new(sink: Option<Arc<dyn TelemetrySink>>, persist_interval: Duration) -> Self {
        Self {
            sink,
            persist_interval,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Ingests one telemetry payload from `instance_id`.
    ///
    /// Returns synchronously; the durable insert, when due, runs on a
    /// spawned task. Payload keys override the enrichment fields on
    /// collision, matching the upstream wire contract.
    pub fn process(&self, instance_id: &str, payload: &Value) -> TelemetryReceipt {
        let now = now_ts();
        let mut enriched = Map::new();
        enriched.insert("instance_id".to_owned(), Value::String(instance_id.to_owned()));
        enriched.insert("server_ts".to_owned(), now.into());
        if let Some(fields) = payload.as_object() {
            for (key, value) in fields {
                enriched.insert(key.clone(), value.clone());
            }
        }
        let enriched = Value::Object(enriched);

        let mut inner = self.inner.lock();
        inner.latest.insert(instance_id.to_owned(), enriched.clone());
        inner.last_received.insert(instance_id.to_owned(), now);
        let count = {
            let count = inner.counts.entry(instance_id.to_owned()).or_insert(0);
            *count += 1;
            *count
        };

        if let Some(sink) = &self.sink {
            let last_persist = inner
                .last_persist
                .get(instance_id)
                .copied()
                .unwrap_or(0.0);
            if now - last_persist >= self.persist_interval.as_secs_f64() {
                inner.last_persist.insert(instance_id.to_owned(), now);
                let sink = Arc::clone(sink);
                let record = TelemetryRecord::from_enriched(instance_id, &enriched);
                tokio::spawn(async move {
                    if let Err(err) = sink.insert(record).await {
                        error!(%err, "telemetry persist failed");
                    }
                });
            }
        }

        TelemetryReceipt {
            status: "ok",
            count,
        }
    }

    /// Latest enriched payload for one instance.
    #[must_use]
    pub fn latest(&self, instance_id: &str) -> Option<Value> {
        self.inner.lock().latest.get(instance_id).cloned()
    }

    /// Latest enriched payload per instance.
    #[must_use]
    pub fn all_latest(&self) -> HashMap<String, Value> {
        self.inner.lock().latest.clone()
    }

    /// Instances whose last telemetry arrived within the liveness window.
    #[must_use]
    pub fn active_instances(&self) -> Vec<String> {
        let now = now_ts();
        self.inner
            .lock()
            .last_received
            .iter()
            .filter(|(_, ts)| **ts > now - LIVENESS_WINDOW_SECS)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Drops the cached latest and last-received slots for an instance,
    /// called when its connection goes away.
    pub fn remove(&self, instance_id: &str) {
        let mut inner = self.inner.lock();
        inner.latest.remove(instance_id);
        inner.last_received.remove(instance_id);
    }
}
