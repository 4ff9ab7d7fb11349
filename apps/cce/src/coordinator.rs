//! # Run Coordinator
//!
//! Orchestrates one compliance run end to end:
//!
//! 1. Load the active policy catalog (registry or built-in defaults).
//! 2. Compile it into rules and emit `check_started`.
//! 3. Fan out every applicable (stage, rule) cell under a concurrency bound.
//! 4. Record results as they arrive, emitting `violation_detected` per
//!    failure.
//! 5. Score, classify, emit `check_completed`, and return the report.
//!
//! Only an unreachable registry or bad arguments end a run early. Per-cell
//! failures are absorbed by the dispatcher.

use crate::config::{dedupe_stages, validate_stages, EngineConfig, RunOptions};
use crate::dispatcher::{join_failure_message, CheckDispatcher};
use crate::emitter::EventEmitter;
use crate::error::EngineError;
use cce_core::{
    policies_to_rules, CheckResult, Datastore, EventLog, PolicyRegistry, ProbeError, Rule,
    RunLedger, RunReport, RunType, StageNumber, Violation,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::{Id, JoinSet};
use tracing::{error, info, warn};
use uuid::Uuid;

/// What a finished run hands back to its caller.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: RunReport,
    /// Sorted by stage, then rule key.
    pub violations: Vec<Violation>,
    /// Audit events that could not be written.
    pub event_failures: u64,
}

impl RunOutcome {
    #[must_use]
    pub fn passing(&self) -> bool {
        self.report.passing
    }
}

pub struct RunCoordinator {
    registry: PolicyRegistry,
    builtin: PolicyRegistry,
    dispatcher: CheckDispatcher,
    event_log: Option<Arc<dyn EventLog>>,
    config: EngineConfig,
}

impl std::fmt::Debug for RunCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunCoordinator")
            .field("registry", &self.registry)
            .field("dispatcher", &self.dispatcher)
            .field("events", &self.event_log.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RunCoordinator {
    /// The concurrency bound in `config` is shared by every run of this
    /// coordinator.
    pub fn new(registry: PolicyRegistry, datastore: Arc<dyn Datastore>, config: EngineConfig) -> Self {
        let dispatcher =
            CheckDispatcher::new(datastore, config.check_timeout, config.concurrency);
        Self {
            registry,
            builtin: PolicyRegistry::Builtin,
            dispatcher,
            event_log: None,
            config,
        }
    }

    /// Attach the audit log used when a run asks for events.
    #[must_use]
    pub fn with_event_log(mut self, event_log: Arc<dyn EventLog>) -> Self {
        self.event_log = Some(event_log);
        self
    }

    #[must_use]
    pub fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }

    #[must_use]
    pub fn event_log(&self) -> Option<&Arc<dyn EventLog>> {
        self.event_log.as_ref()
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Execute one run.
    ///
    /// Repeated stages are checked once, in first-seen order.
    pub async fn run(&self, options: &RunOptions) -> Result<RunOutcome, EngineError> {
        let stages = dedupe_stages(&options.stages);
        validate_stages(&stages, self.config.stage_count)?;

        let registry = if options.use_registry {
            &self.registry
        } else {
            &self.builtin
        };
        let policies = registry.load_policies().map_err(|err| {
            error!(error = %err, "policy registry unavailable; run aborted");
            err
        })?;

        let rules: Vec<Arc<Rule>> = policies_to_rules(&policies)
            .into_values()
            .map(Arc::new)
            .collect();

        let started_at = Utc::now();
        let check_id = new_check_id(options.run_type, started_at);
        let emitter = self.emitter_for(&check_id, options.emit_events);

        info!(
            check_id = %check_id,
            run_type = %options.run_type,
            stages = stages.len(),
            rules = rules.len(),
            builtin = registry.is_builtin(),
            "compliance run started"
        );
        emitter
            .run_started(options.run_type, &stages, rules.len())
            .await;

        let mut ledger = RunLedger::start(
            check_id.clone(),
            options.run_type,
            stages.clone(),
            rules.len(),
            started_at,
        );

        let mut tasks = JoinSet::new();
        let mut cells: HashMap<Id, (usize, StageNumber)> = HashMap::new();

        for &stage in &stages {
            for (index, rule) in rules.iter().enumerate() {
                if !rule.applies_to(stage) {
                    continue;
                }
                let dispatcher = self.dispatcher.clone();
                let rule = Arc::clone(rule);
                let handle = tasks.spawn(async move {
                    let result = dispatcher.dispatch(rule, stage).await;
                    (index, stage, result)
                });
                cells.insert(handle.id(), (index, stage));
            }
        }

        while let Some(joined) = tasks.join_next().await {
            let (index, stage, result) = match joined {
                Ok(cell) => cell,
                Err(join_error) => {
                    let Some(&(index, stage)) = cells.get(&join_error.id()) else {
                        warn!("lost track of a failed check task");
                        continue;
                    };
                    let error = ProbeError::Panicked(join_failure_message(join_error));
                    let result = CheckResult::probe_error("check task failed", &error);
                    (index, stage, result)
                }
            };
            let Some(rule) = rules.get(index) else {
                continue;
            };
            if let Some(violation) = ledger.record(rule, stage, &result) {
                info!(
                    check_id = %check_id,
                    policy = %violation.policy_id,
                    stage,
                    severity = %violation.severity,
                    "violation detected"
                );
                emitter.violation_detected(&violation).await;
            }
        }

        let (report, violations) = ledger.finalize(Utc::now(), self.config.pass_threshold);
        info!(
            check_id = %report.check_id,
            critical = report.critical_score,
            overall = report.overall_score,
            violations = report.violations,
            probe_errors = report.probe_errors,
            tier = %report.tier,
            passing = report.passing,
            "compliance run completed"
        );
        emitter.run_completed(&report).await;

        Ok(RunOutcome {
            report,
            violations,
            event_failures: emitter.failures(),
        })
    }

    fn emitter_for(&self, check_id: &str, emit_events: bool) -> EventEmitter {
        match (&self.event_log, emit_events) {
            (Some(log), true) => EventEmitter::new(Arc::clone(log), check_id),
            (None, true) => {
                warn!(check_id, "events requested but no event log is attached");
                EventEmitter::disabled(check_id)
            }
            (_, false) => EventEmitter::disabled(check_id),
        }
    }
}

/// Run id: `chk-<run type>-<utc timestamp>-<8 hex>`.
#[must_use]
pub fn new_check_id(run_type: RunType, started_at: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "chk-{}-{}-{}",
        run_type.as_str(),
        started_at.format("%Y%m%dT%H%M%SZ"),
        suffix.get(..8).unwrap_or(&suffix)
    )
}
