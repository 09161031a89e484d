// Speed Guard Control API
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Thin HTTP surface over the shared GuardContext. Every response is JSON
// with a "status" field; failures come from GuardError's IntoResponse.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::{GuardError, GuardResult};
use crate::guard::sampler;
use crate::state::GuardContext;

pub type AppState = Arc<GuardContext>;

/// Samples returned by /api/cpu_history.
const HISTORY_LIMIT: usize = 50;
/// Alerts returned by /api/alerts.
const ALERT_LIMIT: usize = 20;
const ALERT_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/system_info", get(system_info))
        .route("/api/cpu_history", get(cpu_history))
        .route("/api/alerts", get(alerts))
        .route("/api/increase_load", get(increase_load))
        .route("/api/cancel_load", get(cancel_load))
        .route("/api/speed_guard/toggle", get(toggle_guard))
        .route("/api/speed_guard/status", get(guard_status))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve the control API until `shutdown` fires.
pub async fn start_server(
    port: u16,
    state: AppState,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("[SERVER] Speed Guard API listening on http://127.0.0.1:{}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("control API server failed")?;

    info!("[SERVER] Control API stopped");
    Ok(())
}

async fn system_info(State(state): State<AppState>) -> GuardResult<Json<Value>> {
    let sample = state.current_sample().await?;
    let host = tokio::task::spawn_blocking(sampler::host_snapshot)
        .await
        .map_err(|e| GuardError::SamplingUnavailable(format!("host snapshot failed: {}", e)))?;

    Ok(Json(json!({
        "status": "success",
        "timestamp": sample.timestamp,
        "cpu_percent": sample.cpu_percent,
        "memory_percent": sample.memory_percent,
        "temperature_celsius": sample.temperature_celsius,
        "disk_percent": host.disk_percent,
        "core_count": host.core_count,
        "host_uptime_secs": host.host_uptime_secs,
        "load_workers": state.load.active_count(),
        "max_workers": state.load.max_workers(),
        "speed_guard_enabled": state.is_enabled(),
        "uptime_secs": state.uptime().as_secs(),
    })))
}

async fn cpu_history(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "success",
        "history": state.history.recent(HISTORY_LIMIT),
    }))
}

async fn alerts(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "success",
        "alerts": state.alerts.recent(ALERT_WINDOW, ALERT_LIMIT),
    }))
}

async fn increase_load(State(state): State<AppState>) -> GuardResult<Json<Value>> {
    let worker = state.load.start_one()?;
    let active = state.load.active_count();

    Ok(Json(json!({
        "status": "success",
        "message": format!("Started load worker {} ({} active)", worker.id, active),
        "worker_id": worker.id,
        "pid": worker.pid,
        "active_workers": active,
    })))
}

async fn cancel_load(State(state): State<AppState>) -> Json<Value> {
    let terminated = state.load.cancel_all().await;
    Json(json!({
        "status": "success",
        "message": format!("Terminated {} load worker(s)", terminated),
        "terminated": terminated,
    }))
}

async fn toggle_guard(State(state): State<AppState>) -> Json<Value> {
    let enabled = state.toggle();
    Json(json!({
        "status": "success",
        "message": format!("Speed Guard {}", if enabled { "enabled" } else { "disabled" }),
        "enabled": enabled,
    }))
}

async fn guard_status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "success",
        "speed_guard": state.guard_state(),
    }))
}
