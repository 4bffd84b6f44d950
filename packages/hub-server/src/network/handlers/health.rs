//! Service identity, health, and orchestration probe handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use crate::network::shutdown::HealthState;

use super::AppState;

/// `GET /` -- service identity.
pub async fn root_handler() -> Json<serde_json::Value> {
    Json(json!({
        "service": "TradeHub",
        "version": env!("CARGO_PKG_VERSION"),
        "docs": "/docs",
    }))
}

/// `GET /health` -- connection counts and uptime.
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "connections": state.registry.count(),
        "authenticated": state.registry.authenticated_count(),
        "uptime_s": state.started_at.elapsed().as_secs(),
    }))
}

/// Liveness probe -- always 200. A failed liveness probe restarts the
/// process, so it checks nothing beyond "we answered".
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe -- 200 while accepting traffic, 503 during startup and
/// drain so the hub drops out of load-balancer rotation.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.shutdown.health_state() == HealthState::Ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::handlers::test_support::test_state;

    #[tokio::test]
    async fn root_names_the_service() {
        let json = root_handler().await.0;
        assert_eq!(json["service"], "TradeHub");
        assert!(json["version"].is_string());
    }

    #[tokio::test]
    async fn health_reports_counts_and_uptime() {
        let state = test_state();
        let (_h, _rx) = state.registry.register("bot-01", 8);

        let json = health_handler(State(state)).await.0;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["connections"], 1);
        assert_eq!(json["authenticated"], 0);
        assert!(json["uptime_s"].is_number());
    }

    #[tokio::test]
    async fn liveness_is_always_ok() {
        assert_eq!(liveness_handler().await, StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_follows_health_state() {
        let state = test_state();
        assert_eq!(
            readiness_handler(State(state.clone())).await,
            StatusCode::SERVICE_UNAVAILABLE
        );
        state.shutdown.set_ready();
        assert_eq!(readiness_handler(State(state.clone())).await, StatusCode::OK);
        state.shutdown.trigger_shutdown();
        assert_eq!(
            readiness_handler(State(state)).await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
