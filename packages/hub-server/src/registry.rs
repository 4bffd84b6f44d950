//! Connection registry: the hub's single source of truth for who is online.
//!
//! Keyed by instance identifier. Each connection gets a bounded mpsc channel
//! whose receiver is owned by that connection's WebSocket write loop, so all
//! writes to one peer are serialized through one queue -- fan-outs from
//! different sources can never interleave frames on the wire. The map itself
//! is a `DashMap` for lock-free concurrent access from connection tasks, the
//! HTTP surface, and the background sweep.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use tradehub_core::{close_code, now_ts, Role};

/// Frame queued for a connection's write loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// A JSON text frame.
    Text(String),
    /// A close frame; the write loop sends it and exits.
    Close { code: u16, reason: String },
}

/// Error queuing a frame to a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// The outbound queue is full; the peer is not draining.
    #[error("outbound queue full")]
    Full,
    /// The write loop has exited; the connection is gone.
    #[error("connection closed")]
    Closed,
}

/// Mutable per-connection state behind the handle.
#[derive(Debug)]
struct ConnectionMeta {
    role: Role,
    authenticated: bool,
    last_message_at: f64,
}

/// Handle to a single registered connection.
///
/// The registry owns the authoritative reference; drivers hold a second
/// `Arc` for the lifetime of their socket. All outbound traffic goes
/// through [`ConnectionHandle::send_text`] so it lands on the per-peer
/// queue in routing order.
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Instance identifier supplied in the connection URI.
    pub instance_id: String,
    /// Registration sequence; lower means connected earlier.
    pub seq: u64,
    /// Wall-clock registration time (epoch seconds).
    pub connected_at: f64,
    tx: mpsc::Sender<OutboundFrame>,
    meta: RwLock<ConnectionMeta>,
}

impl ConnectionHandle {
    /// Queues a text frame without blocking.
    ///
    /// # Errors
    ///
    /// [`SendError::Full`] when the peer's queue is saturated,
    /// [`SendError::Closed`] when its write loop has exited.
    pub fn send_text(&self, frame: &str) -> Result<(), SendError> {
        self.tx
            .try_send(OutboundFrame::Text(frame.to_owned()))
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => SendError::Full,
                mpsc::error::TrySendError::Closed(_) => SendError::Closed,
            })
    }

    /// Queues a close frame. Returns `false` if the queue was unavailable;
    /// callers treat closure as best-effort.
    pub fn close(&self, code: u16, reason: &str) -> bool {
        self.tx
            .try_send(OutboundFrame::Close {
                code,
                reason: reason.to_owned(),
            })
            .is_ok()
    }

    /// Current role (initially [`Role::Unknown`]).
    #[must_use]
    pub fn role(&self) -> Role {
        self.meta.read().role.clone()
    }

    /// Whether the peer has completed the shared-secret handshake.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.meta.read().authenticated
    }

    /// Last-activity stamp (epoch seconds; 0 until the first parsed frame).
    #[must_use]
    pub fn last_message_at(&self) -> f64 {
        self.meta.read().last_message_at
    }

    /// Stamps the connection as active now.
    pub fn touch(&self) {
        self.meta.write().last_message_at = now_ts();
    }

    #[cfg(test)]
    pub(crate) fn backdate_last_message(&self, ts: f64) {
        self.meta.write().last_message_at = ts;
    }

    /// Read-only snapshot of the record for the status surface.
    #[must_use]
    pub fn summary(&self) -> ConnectionSummary {
        let meta = self.meta.read();
        ConnectionSummary {
            instance_id: self.instance_id.clone(),
            role: meta.role.clone(),
            authenticated: meta.authenticated,
            connected_at: self.connected_at,
            last_message_at: meta.last_message_at,
        }
    }
}

/// Serializable view of one connection record.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSummary {
    pub instance_id: String,
    pub role: Role,
    pub authenticated: bool,
    pub connected_at: f64,
    pub last_message_at: f64,
}

/// Thread-safe registry of all active connections, keyed by instance id.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<String, Arc<ConnectionHandle>>,
    next_seq: AtomicU64,
}

impl ConnectionRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a connection record, superseding any prior holder of the
    /// same identifier.
    ///
    /// A prior holder is sent a close frame with code 4000 first (errors
    /// ignored), then the new record replaces it in one map write, so a
    /// concurrent lookup never observes two records for one identifier.
    /// The returned receiver must be drained by the connection's write loop.
    pub fn register(
        &self,
        instance_id: &str,
        outbound_capacity: usize,
    ) -> (Arc<ConnectionHandle>, mpsc::Receiver<OutboundFrame>) {
        if let Some(old) = self.connections.get(instance_id).map(|e| Arc::clone(e.value())) {
            let _ = old.close(close_code::REPLACED, "Replaced by new connection");
            info!(instance_id, "replaced stale connection");
        }

        let (tx, rx) = mpsc::channel(outbound_capacity);
        let handle = Arc::new(ConnectionHandle {
            instance_id: instance_id.to_owned(),
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            connected_at: now_ts(),
            tx,
            meta: RwLock::new(ConnectionMeta {
                role: Role::Unknown,
                authenticated: false,
                last_message_at: 0.0,
            }),
        });
        self.connections
            .insert(instance_id.to_owned(), Arc::clone(&handle));
        info!(instance_id, total = self.connections.len(), "connected");
        (handle, rx)
    }

    /// Removes a record, but only if `handle` is still the registered one.
    ///
    /// Drivers pass their own handle here on teardown; a connection that
    /// was already superseded cannot evict its replacement. Returns whether
    /// a record was actually removed.
    pub fn deregister(&self, instance_id: &str, handle: &Arc<ConnectionHandle>) -> bool {
        let removed = self
            .connections
            .remove_if(instance_id, |_, current| Arc::ptr_eq(current, handle))
            .is_some();
        if removed {
            info!(instance_id, total = self.connections.len(), "disconnected");
        }
        removed
    }

    /// Marks a connection authenticated with its declared role. No-op when
    /// the identifier is unknown. The role string was accepted verbatim
    /// upstream; gating on recognized roles is the router's concern.
    pub fn authenticate(&self, instance_id: &str, role: Role) {
        if let Some(conn) = self.connections.get(instance_id) {
            let mut meta = conn.meta.write();
            meta.authenticated = true;
            meta.role = role;
            info!(instance_id, role = %meta.role, "authenticated");
        }
    }

    /// Whether the identifier names an authenticated connection.
    #[must_use]
    pub fn is_authenticated(&self, instance_id: &str) -> bool {
        self.connections
            .get(instance_id)
            .is_some_and(|c| c.is_authenticated())
    }

    /// Looks up a connection by identifier.
    #[must_use]
    pub fn get(&self, instance_id: &str) -> Option<Arc<ConnectionHandle>> {
        self.connections.get(instance_id).map(|e| Arc::clone(e.value()))
    }

    /// Point-to-point delivery. Returns `false` when the identifier is
    /// unknown or the write fails; a failed write does not evict the
    /// record -- eviction happens on the receive side or in the next
    /// fan-out.
    pub fn send_to(&self, instance_id: &str, frame: &str) -> bool {
        let Some(conn) = self.get(instance_id) else {
            return false;
        };
        match conn.send_text(frame) {
            Ok(()) => true,
            Err(err) => {
                error!(instance_id, %err, "send failed");
                false
            }
        }
    }

    /// Fan-out to authenticated connections, optionally filtered by role
    /// and excluding one identifier.
    ///
    /// Iterates a snapshot so registrations and deregistrations during the
    /// fan-out are tolerated. Per-peer write failures are absorbed: the
    /// failing peers are collected and evicted after the loop, and the
    /// fan-out itself never fails.
    pub fn broadcast(&self, frame: &str, role: Option<&Role>, exclude: Option<&str>) {
        let targets = self.connections_snapshot();
        let mut dead: Vec<Arc<ConnectionHandle>> = Vec::new();

        for conn in targets {
            {
                let meta = conn.meta.read();
                if !meta.authenticated {
                    continue;
                }
                if role.is_some_and(|r| meta.role != *r) {
                    continue;
                }
            }
            if exclude.is_some_and(|e| e == conn.instance_id) {
                continue;
            }
            if let Err(err) = conn.send_text(frame) {
                error!(instance_id = %conn.instance_id, %err, "broadcast send failed");
                dead.push(conn);
            }
        }

        for conn in dead {
            warn!(instance_id = %conn.instance_id, "removing dead connection");
            self.deregister(&conn.instance_id, &conn);
        }
    }

    /// Snapshot of all connection handles.
    ///
    /// `DashMap` iteration yields guards that borrow the map, so handles
    /// are collected into an owned `Vec`.
    #[must_use]
    pub fn connections_snapshot(&self) -> Vec<Arc<ConnectionHandle>> {
        self.connections
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect()
    }

    /// Serializable snapshot of every record for the status surface.
    #[must_use]
    pub fn list(&self) -> Vec<ConnectionSummary> {
        self.connections.iter().map(|e| e.value().summary()).collect()
    }

    /// Authenticated instance identifiers holding `role`, in connection
    /// order (earliest first). Connection order is what makes "first
    /// connected peer" well-defined during command target resolution.
    #[must_use]
    pub fn by_role(&self, role: &Role) -> Vec<String> {
        let mut matches: Vec<(u64, String)> = self
            .connections
            .iter()
            .filter(|e| {
                let meta = e.value().meta.read();
                meta.authenticated && meta.role == *role
            })
            .map(|e| (e.value().seq, e.key().clone()))
            .collect();
        matches.sort_unstable_by_key(|(seq, _)| *seq);
        matches.into_iter().map(|(_, id)| id).collect()
    }

    /// Total number of records.
    #[must_use]
    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Number of records whose authenticated flag is set.
    #[must_use]
    pub fn authenticated_count(&self) -> usize {
        self.connections
            .iter()
            .filter(|e| e.value().is_authenticated())
            .count()
    }
}
