//! Message router: the central dispatcher for every inbound frame.
//!
//! Pipeline routing between the worker roles:
//!
//! ```text
//! bar              connector publishes -> preditor
//! signal           preditor publishes  -> executor + dashboard + admin
//! order_command    executor publishes  -> connector
//! order_result     connector publishes -> executor + dashboard
//! position_event   connector publishes -> executor + dashboard
//! account_update   connector publishes -> executor + dashboard
//! history_response connector publishes -> preditor
//! telemetry        any worker          -> dashboard + admin (+ sink)
//! ```
//!
//! The router never fails: every path yields either no reply
//! (fire-and-forget) or a single reply frame, with failures expressed as
//! error frames. Side effects are fan-out writes, telemetry ingestion, and
//! command bookkeeping.

use std::sync::Arc;

use serde_json::{json, Value};

use tradehub_core::{
    ack_frame, ack_relay_frame, close_code, error_frame, forward_frame, AuthPayload,
    CommandRequest, InboundEnvelope, MessageKind, Role,
};

use crate::auth::validate_token;
use crate::config::HubConfig;
use crate::correlator::CommandCorrelator;
use crate::registry::ConnectionRegistry;
use crate::telemetry::TelemetryStore;

static BAR_SUBSCRIBERS: [Role; 1] = [Role::Preditor];
static SIGNAL_SUBSCRIBERS: [Role; 3] = [Role::Executor, Role::Dashboard, Role::Admin];
static ORDER_COMMAND_SUBSCRIBERS: [Role; 1] = [Role::Connector];
static EXECUTION_SUBSCRIBERS: [Role; 2] = [Role::Executor, Role::Dashboard];
static HISTORY_SUBSCRIBERS: [Role; 1] = [Role::Preditor];
static TELEMETRY_SUBSCRIBERS: [Role; 2] = [Role::Dashboard, Role::Admin];

/// Fallback resolution order when a command names no target: the first
/// authenticated peer of the first non-empty role wins.
static COMMAND_TARGET_ORDER: [Role; 4] =
    [Role::Bot, Role::Preditor, Role::Executor, Role::Connector];

/// The role-keyed subscription table. Returns `None` for kinds that are
/// not plain pipeline fan-outs (auth, telemetry, ack, command, unknown).
fn subscribers(kind: &MessageKind) -> Option<&'static [Role]> {
    match kind {
        MessageKind::Bar => Some(&BAR_SUBSCRIBERS),
        MessageKind::Signal => Some(&SIGNAL_SUBSCRIBERS),
        MessageKind::OrderCommand => Some(&ORDER_COMMAND_SUBSCRIBERS),
        MessageKind::OrderResult | MessageKind::PositionEvent | MessageKind::AccountUpdate => {
            Some(&EXECUTION_SUBSCRIBERS)
        }
        MessageKind::HistoryResponse => Some(&HISTORY_SUBSCRIBERS),
        _ => None,
    }
}

/// Central dispatcher over the hub's shared state.
pub struct MessageRouter {
    registry: Arc<ConnectionRegistry>,
    correlator: Arc<CommandCorrelator>,
    telemetry: Arc<TelemetryStore>,
    config: Arc<HubConfig>,
}

impl MessageRouter {
    /// Builds a router over explicitly injected state, so tests can stand
    /// up a fresh hub per case.
    #[must_use]
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        correlator: Arc<CommandCorrelator>,
        telemetry: Arc<TelemetryStore>,
        config: Arc<HubConfig>,
    ) -> Self {
        Self {
            registry,
            correlator,
            telemetry,
            config,
        }
    }

    /// Routes one raw frame from `instance_id`.
    ///
    /// Returns the reply frame to write back, or `None` for
    /// fire-and-forget traffic.
    pub fn route(&self, raw: &str, instance_id: &str) -> Option<String> {
        let Ok(envelope) = InboundEnvelope::parse(raw) else {
            return Some(error_frame("Invalid JSON", None, None));
        };

        // Activity stamp before dispatch.
        if let Some(conn) = self.registry.get(instance_id) {
            conn.touch();
        }

        match &envelope.kind {
            MessageKind::Auth => self.handle_auth(&envelope, instance_id),
            _ if !self.registry.is_authenticated(instance_id) => Some(error_frame(
                "Not authenticated. Send 'auth' first.",
                envelope.ref_id(),
                Some(close_code::UNAUTHORIZED),
            )),
            MessageKind::Telemetry => self.handle_telemetry(&envelope, instance_id),
            MessageKind::Ack => self.handle_ack(&envelope, instance_id),
            MessageKind::Command => self.handle_command(&envelope, instance_id),
            MessageKind::Unknown(kind) => Some(error_frame(
                &format!("Unknown type: {kind}"),
                envelope.ref_id(),
                None,
            )),
            kind => {
                if let Some(roles) = subscribers(kind) {
                    let frame = forward_frame(kind.as_type(), instance_id, &envelope.payload);
                    for role in roles {
                        self.registry.broadcast(&frame, Some(role), None);
                    }
                }
                None
            }
        }
    }

    fn handle_auth(&self, envelope: &InboundEnvelope, instance_id: &str) -> Option<String> {
        let auth: AuthPayload =
            serde_json::from_value(envelope.payload.clone()).unwrap_or_default();
        if validate_token(&self.config.shared_secret, &auth.token) {
            let role = Role::parse(&auth.role);
            self.registry.authenticate(instance_id, role.clone());
            Some(ack_frame(
                envelope.ref_id(),
                "authenticated",
                json!({"instance_id": instance_id, "role": role}),
            ))
        } else {
            Some(error_frame(
                "Invalid token",
                envelope.ref_id(),
                Some(close_code::UNAUTHORIZED),
            ))
        }
    }

    fn handle_telemetry(&self, envelope: &InboundEnvelope, instance_id: &str) -> Option<String> {
        let receipt = self.telemetry.process(instance_id, &envelope.payload);
        let frame = forward_frame("telemetry", instance_id, &envelope.payload);
        for role in &TELEMETRY_SUBSCRIBERS {
            self.registry.broadcast(&frame, Some(role), None);
        }
        Some(ack_frame(
            envelope.ref_id(),
            "telemetry_ok",
            serde_json::to_value(receipt).unwrap_or(Value::Null),
        ))
    }

    fn handle_ack(&self, envelope: &InboundEnvelope, instance_id: &str) -> Option<String> {
        if let Some((origin, payload)) =
            self.correlator.process_ack(instance_id, &envelope.payload)
        {
            if !origin.is_empty() {
                // Point-to-point relay; a vanished issuer is dropped silently.
                let _ = self.registry.send_to(&origin, &ack_relay_frame(&payload));
            }
        }
        None
    }

    fn handle_command(&self, envelope: &InboundEnvelope, instance_id: &str) -> Option<String> {
        let issuer_role = self.registry.get(instance_id).map(|conn| conn.role());
        if !issuer_role.is_some_and(|role| role.can_issue_commands()) {
            return Some(error_frame(
                "Only admin/dashboard can send commands",
                envelope.ref_id(),
                None,
            ));
        }

        let request: CommandRequest =
            serde_json::from_value(envelope.payload.clone()).unwrap_or_default();
        let Some(action) = request.action() else {
            return Some(error_frame(
                "Command requires 'action'",
                envelope.ref_id(),
                None,
            ));
        };

        let target = match request.target() {
            Some(explicit) => explicit.to_owned(),
            None => match self.resolve_target() {
                Some(fallback) => fallback,
                None => {
                    return Some(error_frame("No target connected", envelope.ref_id(), None));
                }
            },
        };

        let Some(command) = self.correlator.create_command(
            action,
            &target,
            instance_id,
            request.params.clone(),
            envelope.ref_id(),
        ) else {
            return Some(error_frame(
                &format!("Invalid action: {action}"),
                envelope.ref_id(),
                None,
            ));
        };

        if self.registry.send_to(&target, &command.to_string()) {
            None
        } else {
            // The pending entry stays until the expiry sweep drops it.
            Some(error_frame(
                &format!("Target {target} not connected"),
                envelope.ref_id(),
                None,
            ))
        }
    }

    fn resolve_target(&self) -> Option<String> {
        COMMAND_TARGET_ORDER
            .iter()
            .find_map(|role| self.registry.by_role(role).into_iter().next())
    }
}
