//! # Violation Module
//!
//! The record produced when a rule fails for a stage.

use crate::check::CheckResult;
use crate::primitives::{Severity, StageNumber};
use crate::rules::Rule;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A failed rule for one stage.
///
/// `severity` is copied from the rule when the violation is created and is
/// never looked up again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub policy_id: String,
    pub rule_key: String,
    pub policy_name: String,
    pub stage_number: StageNumber,
    pub severity: Severity,
    pub summary: String,
    /// Structured evidence payload.
    pub details: Value,
    #[serde(default)]
    pub remediation: String,
    /// True when the probe failed rather than the rule.
    #[serde(default)]
    pub probe_error: bool,
}

impl Violation {
    /// Build a violation from a failing check result.
    pub fn from_check(rule: &Rule, stage: StageNumber, result: &CheckResult) -> Self {
        let summary = if result.is_probe_error() {
            format!("{} ({}) could not be evaluated for stage {stage}", rule.name, rule.id)
        } else {
            format!("{} ({}) failed for stage {stage}", rule.name, rule.id)
        };

        Self {
            policy_id: rule.id.clone(),
            rule_key: rule.key.clone(),
            policy_name: rule.name.clone(),
            stage_number: stage,
            severity: rule.severity,
            summary,
            details: json!({
                "evidence": result.evidence,
                "error": result.error,
                "category": rule.category,
            }),
            remediation: rule.remediation_for(stage),
            probe_error: result.is_probe_error(),
        }
    }

    /// Minimal violation, mostly for scoring.
    pub fn new(policy_id: impl Into<String>, stage: StageNumber, severity: Severity) -> Self {
        let policy_id = policy_id.into();
        Self {
            rule_key: crate::rules::rule_key(&policy_id),
            policy_name: policy_id.clone(),
            summary: format!("{policy_id} failed for stage {stage}"),
            policy_id,
            stage_number: stage,
            severity,
            details: Value::Null,
            remediation: String::new(),
            probe_error: false,
        }
    }
}
