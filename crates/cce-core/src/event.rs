//! # Event Module
//!
//! Immutable audit records of run lifecycle moments.
//!
//! Constructors take the event id and timestamp from the caller; this crate
//! never reads the clock or generates ids itself.

use crate::primitives::{RunType, Severity, StageNumber};
use crate::report::RunReport;
use crate::violation::Violation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Lifecycle moment an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    CheckStarted,
    ViolationDetected,
    CheckCompleted,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EventType::CheckStarted => "check_started",
            EventType::ViolationDetected => "violation_detected",
            EventType::CheckCompleted => "check_completed",
        })
    }
}

/// One append-only audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceEvent {
    pub event_id: String,
    pub event_type: EventType,
    /// Identifies the run.
    pub check_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_number: Option<StageNumber>,
    pub severity: Severity,
    pub summary: String,
    #[serde(default)]
    pub details: Value,
    pub created_at: DateTime<Utc>,
}

impl ComplianceEvent {
    /// `check_started`, carrying the run type and requested stages.
    pub fn check_started(
        event_id: impl Into<String>,
        check_id: impl Into<String>,
        run_type: RunType,
        stages: &[StageNumber],
        rule_count: usize,
        created_at: DateTime<Utc>,
    ) -> Self {
        let check_id = check_id.into();
        Self {
            event_id: event_id.into(),
            event_type: EventType::CheckStarted,
            summary: format!(
                "{run_type} compliance run {check_id} started: {} stage(s), {rule_count} rule(s)",
                stages.len()
            ),
            check_id,
            policy_id: None,
            stage_number: None,
            severity: Severity::Info,
            details: json!({
                "runType": run_type,
                "stages": stages,
                "ruleCount": rule_count,
            }),
            created_at,
        }
    }

    /// `violation_detected` for one violation.
    pub fn violation_detected(
        event_id: impl Into<String>,
        check_id: impl Into<String>,
        violation: &Violation,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: EventType::ViolationDetected,
            check_id: check_id.into(),
            policy_id: Some(violation.policy_id.clone()),
            stage_number: Some(violation.stage_number),
            severity: violation.severity,
            summary: violation.summary.clone(),
            details: json!({
                "ruleKey": violation.rule_key,
                "policyName": violation.policy_name,
                "remediation": violation.remediation,
                "probeError": violation.probe_error,
                "evidence": violation.details,
            }),
            created_at,
        }
    }

    /// `check_completed`, carrying the finalized report in `details`.
    pub fn check_completed(
        event_id: impl Into<String>,
        report: &RunReport,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: EventType::CheckCompleted,
            check_id: report.check_id.clone(),
            policy_id: None,
            stage_number: None,
            severity: report.tier,
            summary: report.summary_line(),
            details: serde_json::to_value(report).unwrap_or(Value::Null),
            created_at,
        }
    }
}
