use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use eval_tracker_core::catalog::{catalog_section, portal_catalog};
use serde::Serialize;
use serde_json::Value;

use crate::state::{envelope, ServiceEnvelope, ServiceFailure, ServiceState, ServiceTelemetrySnapshot};

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    telemetry: ServiceTelemetrySnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsResponse {
    uptime_seconds: u64,
    active_sessions: usize,
    telemetry: ServiceTelemetrySnapshot,
}

pub async fn health(State(state): State<ServiceState>) -> Json<ServiceEnvelope<HealthResponse>> {
    Json(envelope(HealthResponse {
        status: "ok",
        telemetry: state.telemetry.snapshot(),
    }))
}

pub async fn metrics(
    State(state): State<ServiceState>,
) -> Result<Json<ServiceEnvelope<MetricsResponse>>, ServiceFailure> {
    let sessions = state.sessions.clone();
    let active_sessions = state
        .run_blocking("count_sessions", move || sessions.count_active())
        .await?;
    Ok(Json(envelope(MetricsResponse {
        uptime_seconds: state.started_at.elapsed().as_secs(),
        active_sessions,
        telemetry: state.telemetry.snapshot(),
    })))
}

pub async fn config() -> Json<Value> {
    Json(portal_catalog())
}

pub async fn config_section(
    State(state): State<ServiceState>,
    Path(section): Path<String>,
) -> Result<Json<Value>, ServiceFailure> {
    catalog_section(&section).map(Json).ok_or_else(|| {
        state.reject(
            StatusCode::NOT_FOUND,
            "config_section_not_found",
            format!("unknown config section: {section}"),
        )
    })
}
