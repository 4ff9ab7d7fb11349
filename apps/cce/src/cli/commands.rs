//! Command implementations.

use crate::api::{build_router, AppState};
use crate::config::{EngineConfig, RunOptions};
use crate::coordinator::{RunCoordinator, RunOutcome};
use crate::error::{ArgumentError, EngineError};
use cce_core::{
    default_policies, reconstruct, ComplianceEvent, ComplianceStore, EventLog, Policy,
    PolicyRegistry, PredicateRegistry, UnreachableStore,
};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

// =============================================================================
// STORE LIFECYCLE
// =============================================================================

/// Create the store file, optionally seeding the default policies.
///
/// Returns the number of policies seeded.
pub fn cmd_init(db_path: &Path, force: bool, seed_defaults: bool) -> Result<usize, EngineError> {
    if db_path.exists() {
        if !force {
            return Err(ArgumentError::Invalid(format!(
                "{} already exists (use --force to replace it)",
                db_path.display()
            ))
            .into());
        }
        std::fs::remove_file(db_path)?;
    }

    let store = ComplianceStore::create(db_path)?;
    let mut seeded = 0;
    if seed_defaults {
        for policy in default_policies() {
            store.put_policy(&policy)?;
            seeded += 1;
        }
    }

    info!(path = %db_path.display(), seeded, "store initialized");
    Ok(seeded)
}

/// Open an existing store.
pub fn open_store(db_path: &Path) -> Result<ComplianceStore, EngineError> {
    Ok(ComplianceStore::open(db_path)?)
}

// =============================================================================
// POLICIES
// =============================================================================

/// Store every policy in `file` as a new version.
pub fn cmd_policy_import(db_path: &Path, file: &Path) -> Result<Vec<Policy>, EngineError> {
    let content = std::fs::read_to_string(file)?;
    let policies: Vec<Policy> = match serde_json::from_str::<Value>(&content)? {
        Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Policy>, _>>()?,
        single => vec![serde_json::from_value(single)?],
    };

    let store = open_store(db_path)?;
    let mut stored = Vec::with_capacity(policies.len());
    for policy in &policies {
        let saved = store.put_policy(policy)?;
        info!(policy = %saved.policy_id, version = saved.version, "policy stored");
        stored.push(saved);
    }
    Ok(stored)
}

/// Stored policies. Only active versions unless `all`.
pub fn cmd_policy_list(db_path: &Path, all: bool) -> Result<Vec<Policy>, EngineError> {
    let store = open_store(db_path)?;
    let mut policies = store.all_policies()?;
    if !all {
        policies.retain(|p| p.is_active);
    }
    Ok(policies)
}

pub fn cmd_policy_deactivate(db_path: &Path, policy_id: &str) -> Result<bool, EngineError> {
    let store = open_store(db_path)?;
    Ok(store.deactivate_policy(policy_id)?)
}

// =============================================================================
// GOVERNED DATA
// =============================================================================

/// Append the rows in `file` (a JSON array of objects) to `table`.
pub fn cmd_ingest(db_path: &Path, table: &str, file: &Path) -> Result<usize, EngineError> {
    let content = std::fs::read_to_string(file)?;
    let Value::Array(rows) = serde_json::from_str::<Value>(&content)? else {
        return Err(ArgumentError::Invalid(format!(
            "{} must contain a JSON array of objects",
            file.display()
        ))
        .into());
    };

    let store = open_store(db_path)?;
    let count = store.insert_rows(table, &rows)?;
    info!(table, count, "rows ingested");
    Ok(count)
}

// =============================================================================
// AUDIT TRAIL
// =============================================================================

/// Events of one run in emission order.
pub fn cmd_events(db_path: &Path, check_id: &str) -> Result<Vec<ComplianceEvent>, EngineError> {
    let store = open_store(db_path)?;
    Ok(store.events_for_check(check_id)?)
}

// =============================================================================
// RUNS
// =============================================================================

/// Wire a coordinator to the store at `config.db_path`.
///
/// A store that cannot be opened leaves the registry unreachable, so runs
/// that need it fail while `--no-registry` runs still complete with every
/// data probe reported as a probe error. Built-in predicates see the
/// configured pipeline length.
pub fn build_coordinator(config: &EngineConfig) -> RunCoordinator {
    match ComplianceStore::open(&config.db_path) {
        Ok(store) => {
            let predicates = PredicateRegistry::with_builtins_for(config.stage_count);
            let store = Arc::new(store.with_predicates(predicates));
            RunCoordinator::new(
                PolicyRegistry::from_source(store.clone()),
                store.clone(),
                config.clone(),
            )
            .with_event_log(store)
        }
        Err(err) => {
            let reason = err.to_string();
            warn!(path = %config.db_path.display(), %reason, "store unavailable");
            let offline = Arc::new(UnreachableStore::new(reason.clone()));
            RunCoordinator::new(
                PolicyRegistry::Unreachable(reason),
                offline.clone(),
                config.clone(),
            )
            .with_event_log(offline)
        }
    }
}

/// Run once and print the report.
pub async fn cmd_run(
    config: &EngineConfig,
    options: &RunOptions,
    json: bool,
) -> Result<RunOutcome, EngineError> {
    let coordinator = build_coordinator(config);
    let outcome = coordinator.run(options).await?;
    println!("{}", render_run(&outcome, json)?);
    Ok(outcome)
}

/// What a watch loop did before it stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchSummary {
    pub runs: u64,
    pub failed_runs: u64,
    pub last_passing: Option<bool>,
}

/// Run on `interval` until `max_runs` is reached, or forever.
///
/// A run that cannot load its policies is logged and retried on the next
/// tick, reopening the store if it was never opened. Argument errors end the
/// loop.
pub async fn cmd_watch(
    config: &EngineConfig,
    options: &RunOptions,
    interval: Duration,
    max_runs: Option<u64>,
    json: bool,
) -> Result<WatchSummary, EngineError> {
    let mut coordinator = build_coordinator(config);
    let mut summary = WatchSummary::default();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        if max_runs.is_some_and(|max| summary.runs >= max) {
            return Ok(summary);
        }
        ticker.tick().await;
        summary.runs += 1;

        let result = coordinator.run(options).await;
        match result {
            Ok(outcome) => {
                summary.last_passing = Some(outcome.passing());
                if !outcome.passing() {
                    summary.failed_runs += 1;
                }
                println!("{}", render_run(&outcome, json)?);
            }
            Err(EngineError::Registry(err)) => {
                error!(error = %err, run = summary.runs, "scheduled run skipped");
                summary.failed_runs += 1;
                summary.last_passing = Some(false);
                // Never opened: try again next tick.
                if matches!(coordinator.registry(), PolicyRegistry::Unreachable(_)) {
                    coordinator = build_coordinator(config);
                }
            }
            Err(err) => return Err(err),
        }
    }
}

/// Serve the HTTP surface until Ctrl-C.
pub async fn cmd_serve(
    config: &EngineConfig,
    addr: &str,
    api_key: Option<String>,
) -> Result<(), EngineError> {
    if api_key.is_none() {
        warn!("CCE_API_KEY is not set; run requests are unauthenticated");
    }
    let state = AppState::new(Arc::new(build_coordinator(config)), api_key);
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;
    Ok(())
}

// =============================================================================
// RENDERING
// =============================================================================

pub fn render_run(outcome: &RunOutcome, json: bool) -> Result<String, EngineError> {
    if json {
        Ok(serde_json::to_string_pretty(&json!({
            "report": outcome.report,
            "violations": outcome.violations,
        }))?)
    } else {
        Ok(outcome.report.to_text(&outcome.violations))
    }
}

pub fn render_policies(policies: &[Policy]) -> String {
    if policies.is_empty() {
        return "No policies stored.\n".to_string();
    }

    let mut output = String::new();
    output.push_str(&format!(
        "{:<14} {:>4} {:<9} {:<8} {:<12} {}\n",
        "ID", "VER", "SEVERITY", "ACTIVE", "CHECK", "NAME"
    ));
    for p in policies {
        output.push_str(&format!(
            "{:<14} {:>4} {:<9} {:<8} {:<12} {}\n",
            p.policy_id,
            p.version,
            p.severity.as_str(),
            if p.is_active { "yes" } else { "no" },
            p.rule_config.kind(),
            p.name
        ));
    }
    output
}

pub fn render_events(check_id: &str, events: &[ComplianceEvent]) -> String {
    let Some(trail) = reconstruct(events) else {
        return format!("No events recorded for {check_id}.\n");
    };

    let mut output = String::new();
    for event in events {
        output.push_str(&format!(
            "{} {:<18} {:<8} {}\n",
            event.created_at.format("%Y-%m-%dT%H:%M:%SZ"),
            event.event_type,
            event.severity.as_str(),
            event.summary
        ));
    }
    output.push_str(&format!(
        "\n{} event(s); {} violation(s); trail scores critical {}/100, overall {}/100; {}\n",
        events.len(),
        trail.violation_events,
        trail.trail_scores.critical_score,
        trail.trail_scores.overall_score,
        if trail.completed { "completed" } else { "incomplete" }
    ));
    output
}
