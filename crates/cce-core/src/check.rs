//! # Check Module
//!
//! Executable check kinds and their evaluation against a [`Datastore`].
//!
//! Evaluation is total: every outcome, including probe failures, comes back
//! as a [`CheckResult`]. Nothing here returns `Err` to the caller.

use crate::condition::Expectation;
use crate::datastore::{Datastore, ProbeError};
use crate::primitives::StageNumber;
use serde::{Deserialize, Serialize};

// =============================================================================
// CHECK RESULT
// =============================================================================

/// Outcome of one rule against one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub passed: bool,
    /// Human-readable explanation.
    pub evidence: String,
    /// Set when the probe itself failed rather than the rule logically failing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckResult {
    pub fn pass(evidence: impl Into<String>) -> Self {
        Self {
            passed: true,
            evidence: evidence.into(),
            error: None,
        }
    }

    pub fn fail(evidence: impl Into<String>) -> Self {
        Self {
            passed: false,
            evidence: evidence.into(),
            error: None,
        }
    }

    /// A failing result caused by a probe error.
    pub fn probe_error(evidence: impl Into<String>, error: &ProbeError) -> Self {
        Self {
            passed: false,
            evidence: evidence.into(),
            error: Some(error.to_string()),
        }
    }

    #[must_use]
    pub fn is_probe_error(&self) -> bool {
        self.error.is_some()
    }
}

// =============================================================================
// CHECK SPEC
// =============================================================================

/// The closed set of runnable checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckSpec {
    RowCount {
        table: String,
        stage_column: String,
        expectation: Expectation,
    },
    TableExists {
        table: String,
    },
    Custom {
        name: String,
    },
    /// A policy whose configuration could not be compiled. Always fails as a
    /// probe error so the rest of the run is unaffected.
    Invalid {
        reason: String,
    },
}

impl CheckSpec {
    /// Evaluate against `store` for `stage`.
    pub fn evaluate(&self, store: &dyn Datastore, stage: StageNumber) -> CheckResult {
        match self {
            CheckSpec::RowCount {
                table,
                stage_column,
                expectation,
            } => match store.count_rows(table, stage_column, stage) {
                Ok(count) => {
                    let evidence = format!(
                        "{table}: {count} row(s) with {stage_column} = {stage}, expected {expectation}"
                    );
                    if expectation.holds(count) {
                        CheckResult::pass(evidence)
                    } else {
                        CheckResult::fail(evidence)
                    }
                }
                Err(err) => CheckResult::probe_error(
                    format!("row count probe on {table} failed for stage {stage}"),
                    &err,
                ),
            },

            CheckSpec::TableExists { table } => match store.probe_table(table) {
                Ok(()) => CheckResult::pass(format!("table {table} exists")),
                Err(err) if err.is_relation_missing() => {
                    CheckResult::fail(format!("table {table} does not exist ({err})"))
                }
                Err(err) => {
                    CheckResult::probe_error(format!("existence probe on {table} failed"), &err)
                }
            },

            CheckSpec::Custom { name } => match store.probe_custom(name, stage) {
                Ok(result) => result,
                Err(err) => CheckResult::probe_error(
                    format!("custom predicate {name} could not run for stage {stage}"),
                    &err,
                ),
            },

            CheckSpec::Invalid { reason } => CheckResult::probe_error(
                "rule could not be compiled",
                &ProbeError::InvalidRule(reason.clone()),
            ),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
