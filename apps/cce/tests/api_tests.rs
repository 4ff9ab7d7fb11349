//! Integration tests for the HTTP trigger surface.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use axum::http::StatusCode;
use axum_test::TestServer;
use cce::api::{build_router, AppState, RunResponse, TrailResponse};
use cce::cli::{build_coordinator, cmd_init};
use cce::config::EngineConfig;
use cce_core::{Policy, RunType};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

fn create_temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

fn server_for(db_path: &Path, api_key: Option<&str>) -> TestServer {
    let config = EngineConfig::new(db_path.to_path_buf(), 80, 4, 2_000).unwrap();
    let state = AppState::new(
        Arc::new(build_coordinator(&config)),
        api_key.map(str::to_string),
    );
    TestServer::new(build_router(state)).unwrap()
}

fn seeded_server(temp: &TempDir, api_key: Option<&str>) -> TestServer {
    let db_path = temp.path().join("cce.redb");
    cmd_init(&db_path, false, true).unwrap();
    server_for(&db_path, api_key)
}

// =============================================================================
// OPEN ROUTES
// =============================================================================

#[tokio::test]
async fn test_health() {
    let temp = create_temp_dir();
    let server = seeded_server(&temp, Some("secret"));

    let response = server.get("/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["status"], "ok");
}

#[tokio::test]
async fn test_list_policies() {
    let temp = create_temp_dir();
    let server = seeded_server(&temp, None);

    let response = server.get("/policies").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let policies: Vec<Policy> = response.json();
    assert_eq!(policies.len(), 6);
    assert_eq!(policies[0].policy_id, "CREWAI-001");
}

#[tokio::test]
async fn test_list_policies_unreachable_registry() {
    let temp = create_temp_dir();
    let server = server_for(&temp.path().join("missing.redb"), None);

    let response = server.get("/policies").await;
    assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
}

// =============================================================================
// RUNS
// =============================================================================

#[tokio::test]
async fn test_run_requires_bearer_token() {
    let temp = create_temp_dir();
    let server = seeded_server(&temp, Some("secret"));

    let response = server.post("/runs").json(&json!({})).await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);

    let response = server
        .post("/runs")
        .authorization_bearer("wrong")
        .json(&json!({}))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_run_on_demand_and_fetch_trail() {
    let temp = create_temp_dir();
    let server = seeded_server(&temp, Some("secret"));

    let response = server
        .post("/runs")
        .authorization_bearer("secret")
        .json(&json!({"stages": [1, 2]}))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let run: RunResponse = response.json();
    assert_eq!(run.report.run_type, RunType::OnDemand);
    assert_eq!(run.report.stages, vec![1, 2]);
    assert_eq!(run.report.critical_score, 80);

    let response = server
        .get(&format!("/runs/{}", run.report.check_id))
        .authorization_bearer("secret")
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let trail: TrailResponse = response.json();
    assert_eq!(trail.events.len(), run.violations.len() + 2);
    assert!(trail.summary.completed);
    assert_eq!(trail.summary.report.as_ref(), Some(&run.report));
}

#[tokio::test]
async fn test_run_without_events_has_no_trail() {
    let temp = create_temp_dir();
    let server = seeded_server(&temp, None);

    let run: RunResponse = server
        .post("/runs")
        .json(&json!({"stages": [1], "emitEvents": false}))
        .await
        .json();

    let response = server.get(&format!("/runs/{}", run.report.check_id)).await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_run_rejects_bad_stages() {
    let temp = create_temp_dir();
    let server = seeded_server(&temp, None);

    let response = server.post("/runs").json(&json!({"stages": [41]})).await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let response = server.post("/runs").json(&json!({"stages": []})).await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_run_checks_each_stage_once() {
    let temp = create_temp_dir();
    let server = seeded_server(&temp, None);

    let run: RunResponse = server
        .post("/runs")
        .json(&json!({"stages": [1, 1, 1], "emitEvents": false}))
        .await
        .json();

    assert_eq!(run.report.stages, vec![1]);
    assert_eq!(run.report.total_stages, 1);
    assert_eq!(run.violations.len(), 5);
    assert_eq!(run.report.critical_score, 90);

    let run: RunResponse = server
        .post("/runs")
        .json(&json!({"stages": [2, 1, 2], "emitEvents": false}))
        .await
        .json();
    assert_eq!(run.report.stages, vec![2, 1]);
}

#[tokio::test]
async fn test_run_follows_configured_stage_count() {
    let temp = create_temp_dir();
    let db_path = temp.path().join("cce.redb");
    cmd_init(&db_path, false, true).unwrap();
    let config = EngineConfig::new(db_path, 80, 4, 2_000)
        .unwrap()
        .with_stage_count(3)
        .unwrap();
    let server = TestServer::new(build_router(AppState::new(
        Arc::new(build_coordinator(&config)),
        None,
    )))
    .unwrap();

    let run: RunResponse = server
        .post("/runs")
        .json(&json!({"emitEvents": false}))
        .await
        .json();
    assert_eq!(run.report.stages, vec![1, 2, 3]);

    let response = server.post("/runs").json(&json!({"stages": [4]})).await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_run_unreachable_registry() {
    let temp = create_temp_dir();
    let server = server_for(&temp.path().join("missing.redb"), None);

    let response = server.post("/runs").json(&json!({"stages": [1]})).await;
    assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.json::<Value>()["error"], "REGISTRY_UNAVAILABLE");

    // The built-in catalog still runs without the store.
    let response = server
        .post("/runs")
        .json(&json!({"stages": [1], "useRegistry": false}))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let run: RunResponse = response.json();
    assert_eq!(run.report.probe_errors, 6);
}

#[tokio::test]
async fn test_trail_unreachable_event_log() {
    let temp = create_temp_dir();
    let server = server_for(&temp.path().join("missing.redb"), None);

    let response = server.get("/runs/chk-manual-x").await;
    assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.json::<Value>()["error"], "EVENT_LOG_UNAVAILABLE");
}

#[tokio::test]
async fn test_unknown_run_is_not_found() {
    let temp = create_temp_dir();
    let server = seeded_server(&temp, None);

    let response = server.get("/runs/chk-missing").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}
