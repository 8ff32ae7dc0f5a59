use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::info;

use guildmind_discord::ConnectionMonitor;

#[derive(Clone)]
pub struct ProbeState {
    pub monitor: Arc<ConnectionMonitor>,
}

/// Thin HTTP server for external liveness probes.
pub async fn serve(monitor: Arc<ConnectionMonitor>, port: u16) -> anyhow::Result<()> {
    let state = ProbeState { monitor };
    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/status", get(status_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{port}");
    info!(%addr, "health server listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

/// GET /health — always 200 while the process runs.
async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": guildmind_core::types::iso(&chrono::Utc::now()),
    }))
}

/// GET /ready — 503 until the gateway has emitted READY.
async fn ready_handler(State(state): State<ProbeState>) -> (StatusCode, Json<Value>) {
    if state.monitor.is_ready() {
        (
            StatusCode::OK,
            Json(json!({
                "status": "ready",
                "timestamp": guildmind_core::types::iso(&chrono::Utc::now()),
            })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not_ready",
                "timestamp": guildmind_core::types::iso(&chrono::Utc::now()),
            })),
        )
    }
}

/// GET /status — session detail for humans and dashboards.
async fn status_handler(State(state): State<ProbeState>) -> Json<Value> {
    let status = state.monitor.status();
    Json(json!({
        "status": if status.ready { "ready" } else { "starting" },
        "healthy": status.healthy,
        "uptime_seconds": status.uptime_secs,
        "latency_ms": status.latency_ms,
        "session_id": status.session_id,
        "resumed_count": status.resumed_count,
        "invalid_session_count": status.invalid_session_count,
        "last_heartbeat_age_seconds": status.last_heartbeat_age_secs,
        "timestamp": guildmind_core::types::iso(&chrono::Utc::now()),
    }))
}
