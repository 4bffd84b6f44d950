//! REST surface: status readout, telemetry lookup, one-shot command
//! injection.
//!
//! Commands injected here route through the same correlator and registry
//! as WebSocket-originated ones; the issuer is the literal origin
//! `"rest-api"`, which has no connection, so acks for REST commands land
//! in history without being relayed anywhere.

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::validate_token;

use super::AppState;

/// Origin recorded for commands injected over REST.
const REST_ORIGIN: &str = "rest-api";

/// `GET /api/v1/status` -- detailed snapshot for dashboards.
pub async fn status_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "connections": state.registry.list(),
        "telemetry": state.telemetry.all_latest(),
        "active_instances": state.telemetry.active_instances(),
        "pending_commands": state.correlator.pending(),
    }))
}

/// `GET /api/v1/telemetry/{instance_id}` -- latest payload for one
/// instance, or `{"error": "not found"}`.
pub async fn telemetry_handler(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
) -> Json<Value> {
    match state.telemetry.latest(&instance_id) {
        Some(latest) => Json(latest),
        None => Json(json!({"error": "not found"})),
    }
}

/// Body of `POST /api/v1/command`.
#[derive(Debug, Deserialize)]
pub struct CommandBody {
    #[serde(default)]
    token: String,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    params: Option<Value>,
}

/// `POST /api/v1/command` -- inject a command without a WebSocket session.
pub async fn command_handler(
    State(state): State<AppState>,
    Json(body): Json<CommandBody>,
) -> Json<Value> {
    if !validate_token(&state.config.shared_secret, &body.token) {
        return Json(json!({"error": "unauthorized"}));
    }

    let target = body.target.as_deref().filter(|t| !t.is_empty());
    let action = body.action.as_deref().filter(|a| !a.is_empty());
    let (Some(target), Some(action)) = (target, action) else {
        return Json(json!({"error": "target and action required"}));
    };

    let Some(command) =
        state
            .correlator
            .create_command(action, target, REST_ORIGIN, body.params, None)
    else {
        return Json(json!({"error": format!("invalid action: {action}")}));
    };

    let sent = state.registry.send_to(target, &command.to_string());
    Json(json!({
        "status": if sent { "sent" } else { "target_not_connected" },
        "cmd_id": command["id"],
    }))
}
