use super::{ApiError, AppState};
use crate::config::{validate_stages, RunOptions};
use axum::Json;
use axum::extract::{Path, State};
use cce_core::{
    reconstruct, ComplianceEvent, Policy, RunReport, RunType, StageNumber, TrailSummary,
    Violation,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    /// Defaults to every stage of the configured pipeline.
    #[serde(default)]
    pub stages: Option<Vec<StageNumber>>,
    /// Defaults to true: HTTP-triggered runs are audited.
    #[serde(default)]
    pub emit_events: Option<bool>,
    #[serde(default)]
    pub use_registry: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResponse {
    pub report: RunReport,
    pub violations: Vec<Violation>,
    pub event_failures: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrailResponse {
    pub check_id: String,
    pub events: Vec<ComplianceEvent>,
    pub summary: TrailSummary,
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn list_policies(State(state): State<AppState>) -> Result<Json<Vec<Policy>>, ApiError> {
    let registry = state.coordinator.registry().clone();
    let loaded = tokio::task::spawn_blocking(move || registry.load_policies())
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    let policies = loaded.map_err(|e| ApiError::registry_unavailable(e.to_string()))?;
    Ok(Json(policies))
}

pub async fn create_run(
    State(state): State<AppState>,
    Json(req): Json<RunRequest>,
) -> Result<Json<RunResponse>, ApiError> {
    let stage_count = state.coordinator.config().stage_count;
    let stages = req
        .stages
        .unwrap_or_else(|| state.coordinator.config().all_stages());
    validate_stages(&stages, stage_count).map_err(|e| ApiError::bad_request(e.to_string()))?;

    let options = RunOptions {
        stages,
        run_type: RunType::OnDemand,
        emit_events: req.emit_events.unwrap_or(true),
        use_registry: req.use_registry.unwrap_or(true),
    };

    match state.coordinator.run(&options).await {
        Ok(outcome) => {
            info!(check_id = %outcome.report.check_id, passing = outcome.passing(), "on-demand run finished");
            Ok(Json(RunResponse {
                report: outcome.report,
                violations: outcome.violations,
                event_failures: outcome.event_failures,
            }))
        }
        Err(err) => {
            error!(error = %err, "on-demand run failed");
            Err(err.into())
        }
    }
}

pub async fn get_run(
    State(state): State<AppState>,
    Path(check_id): Path<String>,
) -> Result<Json<TrailResponse>, ApiError> {
    let Some(log) = state.coordinator.event_log().cloned() else {
        return Err(ApiError::not_found(format!("no events recorded for {check_id}")));
    };

    let lookup = check_id.clone();
    let events = tokio::task::spawn_blocking(move || log.events_for_check(&lookup))
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?
        .map_err(|e| ApiError::event_log_unavailable(e.to_string()))?;

    let Some(summary) = reconstruct(&events) else {
        return Err(ApiError::not_found(format!("no events recorded for {check_id}")));
    };

    Ok(Json(TrailResponse {
        check_id,
        events,
        summary,
    }))
}
