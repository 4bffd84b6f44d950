//! Wire envelope: parsing of inbound frames and builders for outbound ones.
//!
//! Every frame is a JSON object `{type, id?, payload?, timestamp?}`. Inbound
//! frames are decoded into [`InboundEnvelope`], whose [`MessageKind`] is a
//! closed union with an explicit `Unknown` variant -- unrecognized types are
//! surfaced at the boundary instead of deep in the dispatcher. Outbound
//! frames are always built here so the hub's envelope shape stays in one
//! place: forwards carry `from` and a fresh server timestamp, acks and
//! errors carry their payload under `payload`.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Deserialize;
use serde_json::{json, Map, Value};

/// Seconds since the Unix epoch, as the hub stamps outbound envelopes.
#[must_use]
pub fn now_ts() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// The `type` discriminator of an inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    /// Authentication handshake.
    Auth,
    /// Market bar from a connector.
    Bar,
    /// Trading signal from a preditor.
    Signal,
    /// Order instruction from an executor.
    OrderCommand,
    /// Broker execution report from a connector.
    OrderResult,
    /// Position open/close/update from a connector.
    PositionEvent,
    /// Account balance/margin snapshot from a connector.
    AccountUpdate,
    /// Historical bars answering a `request_history` command.
    HistoryResponse,
    /// Worker telemetry heartbeat.
    Telemetry,
    /// Acknowledgment of a previously relayed command.
    Ack,
    /// Admin/dashboard command to be relayed to a target worker.
    Command,
    /// Anything else; the verbatim type string is kept for the error reply.
    Unknown(String),
}

impl MessageKind {
    fn classify(kind: &str) -> Self {
        match kind {
            "auth" => Self::Auth,
            "bar" => Self::Bar,
            "signal" => Self::Signal,
            "order_command" => Self::OrderCommand,
            "order_result" => Self::OrderResult,
            "position_event" => Self::PositionEvent,
            "account_update" => Self::AccountUpdate,
            "history_response" => Self::HistoryResponse,
            "telemetry" => Self::Telemetry,
            "ack" => Self::Ack,
            "command" => Self::Command,
            other => Self::Unknown(other.to_owned()),
        }
    }

    /// The wire `type` string.
    #[must_use]
    pub fn as_type(&self) -> &str {
        match self {
            Self::Auth => "auth",
            Self::Bar => "bar",
            Self::Signal => "signal",
            Self::OrderCommand => "order_command",
            Self::OrderResult => "order_result",
            Self::PositionEvent => "position_event",
            Self::AccountUpdate => "account_update",
            Self::HistoryResponse => "history_response",
            Self::Telemetry => "telemetry",
            Self::Ack => "ack",
            Self::Command => "command",
            Self::Unknown(s) => s,
        }
    }
}

/// Raw wire shape. Kept private: consumers see [`InboundEnvelope`].
#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    id: String,
    #[serde(default = "empty_object")]
    payload: Value,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// A decoded inbound frame.
#[derive(Debug, Clone)]
pub struct InboundEnvelope {
    /// Classified `type` discriminator.
    pub kind: MessageKind,
    /// Sender-chosen correlation id. Empty ids are treated as absent.
    pub id: Option<String>,
    /// Opaque application payload; defaults to `{}` when absent.
    pub payload: Value,
}

impl InboundEnvelope {
    /// Decodes a text frame.
    ///
    /// # Errors
    ///
    /// Returns the underlying decode error when the frame is not a JSON
    /// object (the caller answers with an "Invalid JSON" error frame).
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let raw: RawEnvelope = serde_json::from_str(raw)?;
        Ok(Self {
            kind: MessageKind::classify(&raw.kind),
            id: Some(raw.id).filter(|id| !id.is_empty()),
            payload: raw.payload,
        })
    }

    /// The envelope `id` as a borrowed reference, for reply correlation.
    #[must_use]
    pub fn ref_id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

/// Payload of an `auth` frame.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthPayload {
    /// Shared secret presented by the peer.
    #[serde(default)]
    pub token: String,
    /// Self-declared role; absent means the legacy `bot` role.
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    "bot".to_owned()
}

impl Default for AuthPayload {
    fn default() -> Self {
        Self {
            token: String::new(),
            role: default_role(),
        }
    }
}

/// Payload of a `command` frame from an admin or dashboard.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommandRequest {
    /// Explicit target instance; absent or empty triggers role-order
    /// fallback resolution.
    #[serde(default)]
    pub target: Option<String>,
    /// Requested action; must be in the valid action set.
    #[serde(default)]
    pub action: Option<String>,
    /// Opaque action parameters.
    #[serde(default)]
    pub params: Option<Value>,
}

impl CommandRequest {
    /// The action, with empty strings treated as absent.
    #[must_use]
    pub fn action(&self) -> Option<&str> {
        self.action.as_deref().filter(|a| !a.is_empty())
    }

    /// The explicit target, with empty strings treated as absent.
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref().filter(|t| !t.is_empty())
    }
}

/// The fields the correlator reads from an `ack` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct AckFields {
    /// Command identifier the ack answers.
    #[serde(default)]
    pub ref_id: Option<String>,
    /// Worker-reported outcome; absent becomes `"unknown"`.
    #[serde(default)]
    pub status: Option<String>,
    /// Worker-reported result object.
    #[serde(default)]
    pub result: Option<Value>,
}

/// Builds the broadcast envelope for a forwarded frame.
///
/// The sender's `id` is intentionally not carried over: forwards are
/// re-stamped with the origin instance and the hub clock.
#[must_use]
pub fn forward_frame(kind: &str, from: &str, payload: &Value) -> String {
    json!({
        "type": kind,
        "from": from,
        "payload": payload,
        "timestamp": now_ts(),
    })
    .to_string()
}

/// Builds an ack reply. `ref_id` echoes the incoming envelope id when one
/// was supplied; `result` is attached only when non-empty.
#[must_use]
pub fn ack_frame(ref_id: Option<&str>, status: &str, result: Value) -> String {
    let mut payload = Map::new();
    if let Some(ref_id) = ref_id {
        payload.insert("ref_id".to_owned(), Value::String(ref_id.to_owned()));
    }
    payload.insert("status".to_owned(), Value::String(status.to_owned()));
    if !is_empty_value(&result) {
        payload.insert("result".to_owned(), result);
    }
    json!({
        "type": "ack",
        "timestamp": now_ts(),
        "payload": Value::Object(payload),
    })
    .to_string()
}

/// Builds an error reply with an optional `ref_id` and numeric `code`.
#[must_use]
pub fn error_frame(message: &str, ref_id: Option<&str>, code: Option<u16>) -> String {
    let mut payload = Map::new();
    payload.insert("message".to_owned(), Value::String(message.to_owned()));
    if let Some(code) = code {
        payload.insert("code".to_owned(), Value::Number(code.into()));
    }
    if let Some(ref_id) = ref_id {
        payload.insert("ref_id".to_owned(), Value::String(ref_id.to_owned()));
    }
    json!({
        "type": "error",
        "timestamp": now_ts(),
        "payload": Value::Object(payload),
    })
    .to_string()
}

/// Builds the relay frame carrying a matched ack back to its issuer.
#[must_use]
pub fn ack_relay_frame(payload: &Value) -> String {
    json!({
        "type": "ack",
        "timestamp": now_ts(),
        "payload": payload,
    })
    .to_string()
}

/// Builds the command envelope relayed to a target worker.
#[must_use]
pub fn command_envelope(cmd_id: &str, action: &str, params: Value) -> Value {
    json!({
        "type": "command",
        "id": cmd_id,
        "timestamp": now_ts(),
        "payload": {
            "action": action,
            "params": params,
        },
    })
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
