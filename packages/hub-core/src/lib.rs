//! TradeHub core — the wire protocol shared by the hub and its workers.
//!
//! Every frame on the wire is a JSON envelope with a `type` discriminator.
//! This crate owns the envelope schema (parsing and outbound builders), the
//! worker role set, the valid command action set, and the WebSocket closure
//! codes. It is I/O-free: the server crate layers transport and state on top.

pub mod command;
pub mod envelope;
pub mod role;

pub use command::{is_valid_action, VALID_ACTIONS};
pub use envelope::{
    ack_frame, ack_relay_frame, command_envelope, error_frame, forward_frame, now_ts, AckFields,
    AuthPayload, CommandRequest, InboundEnvelope, MessageKind,
};
pub use role::Role;

/// WebSocket closure codes used by the hub.
pub mod close_code {
    /// Connection superseded by a newer connection with the same instance id.
    pub const REPLACED: u16 = 4000;
    /// Missing, failed, or timed-out authentication.
    pub const UNAUTHORIZED: u16 = 4001;
}
