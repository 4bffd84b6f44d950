//! Command correlator: mints command identifiers, holds pending entries,
//! and matches acknowledgments back to issuers.
//!
//! The hub acts as a proxy: an admin command is re-stamped with a hub
//! identifier before relay, and the eventual ack is translated back to the
//! identifier the issuer originally supplied. Completed commands are kept
//! in a bounded history window; unanswered ones expire silently.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use tradehub_core::{command_envelope, is_valid_action, now_ts, AckFields};

/// A relayed command awaiting (or holding) its acknowledgment.
#[derive(Debug, Clone, Serialize)]
pub struct PendingCommand {
    /// Hub-minted identifier, also present as `id` in `command`.
    pub cmd_id: String,
    /// The envelope relayed to the target.
    pub command: Value,
    /// Target instance identifier; connected at creation time.
    pub target: String,
    /// Issuer instance identifier (or `"rest-api"`).
    pub origin: String,
    /// Creation stamp (epoch seconds), used for expiry.
    pub sent_at: f64,
    /// Acknowledgment slot; filled when the entry moves to history.
    pub ack: Option<Value>,
}

/// Summary row for the pending-commands status surface.
#[derive(Debug, Clone, Serialize)]
pub struct PendingSummary {
    pub id: String,
    pub target: String,
    pub action: String,
}

#[derive(Default)]
struct Inner {
    pending: HashMap<String, PendingCommand>,
    /// hub command id -> the issuer's original envelope id.
    msg_id_map: HashMap<String, String>,
    history: VecDeque<PendingCommand>,
}

/// Process-wide command bookkeeping, protected by one mutex.
pub struct CommandCorrelator {
    history_cap: usize,
    inner: Mutex<Inner>,
}

impl CommandCorrelator {
    /// Creates a correlator keeping at most `history_cap` completed entries.
    #[must_use]
    pub fn new(history_cap: usize) -> Self {
        Self {
            history_cap,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Mints a command envelope and records the pending entry.
    ///
    /// Returns `None` when `action` is outside the valid action set. The
    /// minted identifier is unique across pending and history combined.
    /// When the issuer supplied its own envelope id, the mapping is kept so
    /// the ack can be relabeled on the way back.
    pub fn create_command(
        &self,
        action: &str,
        target: &str,
        origin: &str,
        params: Option<Value>,
        original_msg_id: Option<&str>,
    ) -> Option<Value> {
        if !is_valid_action(action) {
            warn!(action, "invalid action");
            return None;
        }

        let mut inner = self.inner.lock();
        let cmd_id = loop {
            let candidate = mint_id();
            let in_history = inner.history.iter().any(|c| c.cmd_id == candidate);
            if !inner.pending.contains_key(&candidate) && !in_history {
                break candidate;
            }
        };

        let envelope = command_envelope(&cmd_id, action, params.unwrap_or_else(|| json!({})));
        inner.pending.insert(
            cmd_id.clone(),
            PendingCommand {
                cmd_id: cmd_id.clone(),
                command: envelope.clone(),
                target: target.to_owned(),
                origin: origin.to_owned(),
                sent_at: now_ts(),
                ack: None,
            },
        );
        if let Some(msg_id) = original_msg_id {
            inner.msg_id_map.insert(cmd_id, msg_id.to_owned());
        }
        Some(envelope)
    }

    /// Matches an acknowledgment against the pending map.
    ///
    /// Unmatched acks (missing or unknown `ref_id`) are dropped silently.
    /// On a match, the entry moves to history with its ack slot filled and
    /// the issuer's `(origin, payload)` pair is returned -- with `ref_id`
    /// rewritten to the issuer's original identifier when one was recorded.
    pub fn process_ack(&self, instance_id: &str, ack_payload: &Value) -> Option<(String, Value)> {
        let fields: AckFields = serde_json::from_value(ack_payload.clone()).ok()?;
        let ref_id = fields.ref_id?;

        let mut inner = self.inner.lock();
        let mut entry = inner.pending.remove(&ref_id)?;
        entry.ack = Some(json!({
            "from": instance_id,
            "status": fields.status.unwrap_or_else(|| "unknown".to_owned()),
            "result": fields.result,
            "received_at": now_ts(),
        }));
        let origin = entry.origin.clone();

        inner.history.push_back(entry);
        while inner.history.len() > self.history_cap {
            inner.history.pop_front();
        }

        info!(ref_id = %ref_id, from = instance_id, "ack received");

        let payload = match inner.msg_id_map.remove(&ref_id) {
            Some(original_id) => {
                let mut relabeled = ack_payload.clone();
                if let Some(obj) = relabeled.as_object_mut() {
                    obj.insert("ref_id".to_owned(), Value::String(original_id));
                }
                relabeled
            }
            None => ack_payload.clone(),
        };
        Some((origin, payload))
    }

    /// Summary of every pending entry.
    #[must_use]
    pub fn pending(&self) -> Vec<PendingSummary> {
        self.inner
            .lock()
            .pending
            .values()
            .map(|entry| PendingSummary {
                id: entry.cmd_id.clone(),
                target: entry.target.clone(),
                action: entry.command["payload"]["action"]
                    .as_str()
                    .unwrap_or_default()
                    .to_owned(),
            })
            .collect()
    }

    /// Number of pending entries.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// The most recent `limit` completed commands, oldest first.
    #[must_use]
    pub fn history(&self, limit: usize) -> Vec<PendingCommand> {
        let inner = self.inner.lock();
        let skip = inner.history.len().saturating_sub(limit);
        inner.history.iter().skip(skip).cloned().collect()
    }

    /// Drops pending entries older than `timeout`.
    ///
    /// Expired commands are not surfaced to their issuers; the issuer
    /// observes silence. The id relabel mapping is dropped with the entry
    /// so a later identifier reuse cannot inherit it.
    pub fn expire_stale(&self, timeout: Duration) {
        let now = now_ts();
        let cutoff = timeout.as_secs_f64();
        let mut inner = self.inner.lock();
        let expired: Vec<String> = inner
            .pending
            .iter()
            .filter(|(_, entry)| now - entry.sent_at > cutoff)
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            inner.pending.remove(&id);
            inner.msg_id_map.remove(&id);
            warn!(cmd_id = %id, "command expired (no ack)");
        }
    }
}

fn mint_id() -> String {
    format!("cmd-{}", hex::encode(rand::random::<[u8; 4]>()))
}
