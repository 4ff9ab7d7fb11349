//! # Report Module
//!
//! Run accounting, the completion tier table, and reconstruction of a report
//! from an event trail.
//!
//! A [`RunLedger`] is opened when a run starts, only ever appended to while
//! the stage×rule matrix is scanned, and consumed exactly once by
//! [`RunLedger::finalize`] to produce the [`RunReport`].

use crate::check::CheckResult;
use crate::event::{ComplianceEvent, EventType};
use crate::primitives::{RunType, Severity, StageNumber};
use crate::rules::Rule;
use crate::scoring::{calculate_scores, score_severities, Scores};
use crate::violation::Violation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default minimum `criticalScore` for a passing run.
pub const DEFAULT_PASS_THRESHOLD: u32 = 80;

// =============================================================================
// COMPLETION TIER
// =============================================================================

/// Severity attached to the `check_completed` event. First match wins:
///
/// | Condition             | Tier     |
/// |-----------------------|----------|
/// | critical score < 50   | critical |
/// | critical score < 80   | high     |
/// | overall score < 70    | medium   |
/// | any violation         | low      |
/// | otherwise             | info     |
#[must_use]
pub fn completion_tier(scores: Scores, violation_count: usize) -> Severity {
    if scores.critical_score < 50 {
        Severity::Critical
    } else if scores.critical_score < 80 {
        Severity::High
    } else if scores.overall_score < 70 {
        Severity::Medium
    } else if violation_count > 0 {
        Severity::Low
    } else {
        Severity::Info
    }
}

// =============================================================================
// RUN REPORT
// =============================================================================

/// Finalized result of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub check_id: String,
    pub run_type: RunType,
    pub stages: Vec<StageNumber>,
    pub total_stages: usize,
    pub rules_evaluated: usize,
    pub total_checks: usize,
    pub passed: usize,
    pub failed: usize,
    pub probe_errors: usize,
    pub critical_score: u32,
    pub overall_score: u32,
    pub violations: usize,
    pub tier: Severity,
    pub pass_threshold: u32,
    pub passing: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub duration_seconds: u64,
}

impl RunReport {
    #[must_use]
    pub fn scores(&self) -> Scores {
        Scores {
            critical_score: self.critical_score,
            overall_score: self.overall_score,
        }
    }

    /// One-line summary used for the completion event and logs.
    #[must_use]
    pub fn summary_line(&self) -> String {
        format!(
            "run {} {}: {} passed, {} failed, critical {}/100, overall {}/100 ({})",
            self.check_id,
            if self.passing { "PASSED" } else { "FAILED" },
            self.passed,
            self.failed,
            self.critical_score,
            self.overall_score,
            self.tier
        )
    }

    /// Plain-text rendering for terminals.
    #[must_use]
    pub fn to_text(&self, violations: &[Violation]) -> String {
        let mut output = String::new();

        output.push_str("┌─────────────────────────────────────┐\n");
        output.push_str("│ COMPLIANCE RUN                      │\n");
        output.push_str(&format!("│ check id: {}\n", self.check_id));
        output.push_str(&format!("│ run type: {}\n", self.run_type));
        output.push_str(&format!(
            "│ stages:   {} ({} rule(s), {} check(s))\n",
            self.total_stages, self.rules_evaluated, self.total_checks
        ));
        output.push_str("├─────────────────────────────────────┤\n");
        output.push_str("│ SCORES                              │\n");
        output.push_str(&format!("│ critical: {}/100\n", self.critical_score));
        output.push_str(&format!("│ overall:  {}/100\n", self.overall_score));
        output.push_str(&format!(
            "│ checks:   {} passed, {} failed ({} probe error(s))\n",
            self.passed, self.failed, self.probe_errors
        ));
        output.push_str(&format!(
            "│ verdict:  {} (tier {}, threshold {})\n",
            if self.passing { "PASS" } else { "FAIL" },
            self.tier,
            self.pass_threshold
        ));
        output.push_str("├─────────────────────────────────────┤\n");
        output.push_str("│ VIOLATIONS                          │\n");

        if violations.is_empty() {
            output.push_str("│ - (none)                            │\n");
        } else {
            for v in violations {
                output.push_str(&format!(
                    "│ - [{}] stage {} {}: {}\n",
                    v.severity, v.stage_number, v.policy_id, v.summary
                ));
            }
        }

        output.push_str("└─────────────────────────────────────┘\n");
        output.push_str(&format!("duration: {} ms\n", self.duration_ms));

        output
    }
}

// =============================================================================
// RUN LEDGER
// =============================================================================

/// Append-only accumulator for one run.
#[derive(Debug, Clone)]
pub struct RunLedger {
    check_id: String,
    run_type: RunType,
    stages: Vec<StageNumber>,
    rules_evaluated: usize,
    started_at: DateTime<Utc>,
    passed: usize,
    failed: usize,
    probe_errors: usize,
    violations: Vec<Violation>,
}

impl RunLedger {
    /// Open the ledger at run start.
    pub fn start(
        check_id: impl Into<String>,
        run_type: RunType,
        stages: Vec<StageNumber>,
        rules_evaluated: usize,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            check_id: check_id.into(),
            run_type,
            stages,
            rules_evaluated,
            started_at,
            passed: 0,
            failed: 0,
            probe_errors: 0,
            violations: Vec::new(),
        }
    }

    #[must_use]
    pub fn check_id(&self) -> &str {
        &self.check_id
    }

    /// Record one cell. Returns the violation when the check failed.
    pub fn record(&mut self, rule: &Rule, stage: StageNumber, result: &CheckResult) -> Option<Violation> {
        if result.passed {
            self.passed = self.passed.saturating_add(1);
            return None;
        }

        self.failed = self.failed.saturating_add(1);
        if result.is_probe_error() {
            self.probe_errors = self.probe_errors.saturating_add(1);
        }
        let violation = Violation::from_check(rule, stage, result);
        self.violations.push(violation.clone());
        Some(violation)
    }

    #[must_use]
    pub fn violation_count(&self) -> usize {
        self.violations.len()
    }

    /// Score and close the run. Violations come back sorted by stage, then
    /// rule key.
    pub fn finalize(
        mut self,
        completed_at: DateTime<Utc>,
        pass_threshold: u32,
    ) -> (RunReport, Vec<Violation>) {
        self.violations.sort_by(|a, b| {
            a.stage_number
                .cmp(&b.stage_number)
                .then_with(|| a.rule_key.cmp(&b.rule_key))
        });

        let scores = calculate_scores(&self.violations);
        let tier = completion_tier(scores, self.violations.len());
        let duration_ms = completed_at
            .signed_duration_since(self.started_at)
            .num_milliseconds()
            .max(0) as u64;

        let report = RunReport {
            check_id: self.check_id,
            run_type: self.run_type,
            total_stages: self.stages.len(),
            stages: self.stages,
            rules_evaluated: self.rules_evaluated,
            total_checks: self.passed.saturating_add(self.failed),
            passed: self.passed,
            failed: self.failed,
            probe_errors: self.probe_errors,
            critical_score: scores.critical_score,
            overall_score: scores.overall_score,
            violations: self.violations.len(),
            tier,
            pass_threshold,
            passing: scores.critical_score >= pass_threshold,
            started_at: self.started_at,
            completed_at,
            duration_ms,
            duration_seconds: duration_ms / 1000,
        };

        (report, self.violations)
    }
}

// =============================================================================
// RECONSTRUCTION
// =============================================================================

/// What an event trail says about one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrailSummary {
    pub check_id: String,
    pub started: bool,
    pub completed: bool,
    pub violation_events: usize,
    /// Scores recomputed from `violation_detected` events alone. For a run
    /// that never completed these are the scores of the partial trail.
    pub trail_scores: Scores,
    /// The report stored with `check_completed`, when present.
    pub report: Option<RunReport>,
}

/// Summarize the trail of one run. Returns `None` for an empty trail.
pub fn reconstruct(events: &[ComplianceEvent]) -> Option<TrailSummary> {
    let first = events.first()?;

    let started = events
        .iter()
        .any(|e| e.event_type == EventType::CheckStarted);
    let report = events
        .iter()
        .rev()
        .find(|e| e.event_type == EventType::CheckCompleted)
        .and_then(|e| serde_json::from_value::<RunReport>(e.details.clone()).ok());
    let violations: Vec<Severity> = events
        .iter()
        .filter(|e| e.event_type == EventType::ViolationDetected)
        .map(|e| e.severity)
        .collect();

    Some(TrailSummary {
        check_id: first.check_id.clone(),
        started,
        completed: report.is_some(),
        violation_events: violations.len(),
        trail_scores: score_severities(violations),
        report,
    })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{Policy, RuleConfig};
    use chrono::TimeZone;

    fn rule(id: &str, severity: Severity) -> Rule {
        let policy = Policy::new(
            id,
            id,
            severity,
            RuleConfig::TableExists {
                table: "t".to_string(),
            },
        );
        Rule::compile(crate::rules::rule_key(id), &policy)
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    #[test]
    fn tier_table() {
        let s = |c, o| Scores {
            critical_score: c,
            overall_score: o,
        };
        assert_eq!(completion_tier(s(40, 80), 6), Severity::Critical);
        assert_eq!(completion_tier(s(70, 85), 3), Severity::High);
        assert_eq!(completion_tier(s(100, 60), 40), Severity::Medium);
        assert_eq!(completion_tier(s(100, 99), 1), Severity::Low);
        assert_eq!(completion_tier(s(100, 100), 0), Severity::Info);
    }

    #[test]
    fn ledger_counts_and_scores() {
        let critical = rule("C-1", Severity::Critical);
        let high = rule("H-1", Severity::High);
        let mut ledger = RunLedger::start("chk", RunType::Manual, vec![1, 2], 2, at(0));

        assert!(ledger.record(&critical, 1, &CheckResult::pass("ok")).is_none());
        assert!(ledger.record(&critical, 2, &CheckResult::fail("missing")).is_some());
        let probe = CheckResult::probe_error(
            "down",
            &crate::datastore::ProbeError::Unavailable("x".to_string()),
        );
        assert!(ledger.record(&high, 1, &probe).is_some());
        assert!(ledger.record(&high, 2, &CheckResult::pass("ok")).is_none());

        let (report, violations) = ledger.finalize(at(3), DEFAULT_PASS_THRESHOLD);

        assert_eq!(report.total_checks, 4);
        assert_eq!(report.passed, 2);
        assert_eq!(report.failed, 2);
        assert_eq!(report.probe_errors, 1);
        assert_eq!(report.critical_score, 90);
        assert_eq!(report.overall_score, 92);
        assert!(report.passing);
        assert_eq!(report.duration_seconds, 3);
        assert_eq!(report.total_stages, 2);
        // Sorted by stage first.
        let order: Vec<_> = violations.iter().map(|v| v.stage_number).collect();
        assert_eq!(order, vec![1, 2]);
    }

    #[test]
    fn empty_ledger_is_perfect() {
        let ledger = RunLedger::start("chk", RunType::Manual, vec![1], 0, at(0));
        let (report, violations) = ledger.finalize(at(0), DEFAULT_PASS_THRESHOLD);
        assert!(violations.is_empty());
        assert_eq!(report.critical_score, 100);
        assert_eq!(report.tier, Severity::Info);
        assert!(report.passing);
    }

    #[test]
    fn below_threshold_fails() {
        let critical = rule("C-1", Severity::Critical);
        let mut ledger = RunLedger::start("chk", RunType::Manual, vec![1, 2, 3], 1, at(0));
        for stage in 1..=3 {
            ledger.record(&critical, stage, &CheckResult::fail("no"));
        }
        let (report, _) = ledger.finalize(at(1), DEFAULT_PASS_THRESHOLD);
        assert_eq!(report.critical_score, 70);
        assert!(!report.passing);
        assert_eq!(report.tier, Severity::High);
    }

    #[test]
    fn reconstruct_completed_trail() {
        let critical = rule("C-1", Severity::Critical);
        let mut ledger = RunLedger::start("chk-9", RunType::OnDemand, vec![1], 1, at(0));
        let violation = ledger.record(&critical, 1, &CheckResult::fail("no"));
        let (report, _) = ledger.finalize(at(1), DEFAULT_PASS_THRESHOLD);

        let mut events = vec![ComplianceEvent::check_started(
            "e1",
            "chk-9",
            RunType::OnDemand,
            &[1],
            1,
            at(0),
        )];
        if let Some(v) = violation {
            events.push(ComplianceEvent::violation_detected("e2", "chk-9", &v, at(0)));
        }
        events.push(ComplianceEvent::check_completed("e3", &report, at(1)));

        let summary = reconstruct(&events);
        assert_eq!(summary.as_ref().map(|s| s.completed), Some(true));
        assert_eq!(summary.as_ref().map(|s| s.violation_events), Some(1));
        assert_eq!(summary.as_ref().and_then(|s| s.report.clone()), Some(report.clone()));
        assert_eq!(summary.map(|s| s.trail_scores), Some(report.scores()));
    }

    #[test]
    fn reconstruct_partial_trail() {
        let v = Violation::new("C-1", 1, Severity::Critical);
        let events = vec![
            ComplianceEvent::check_started("e1", "chk", RunType::Manual, &[1], 1, at(0)),
            ComplianceEvent::violation_detected("e2", "chk", &v, at(0)),
        ];
        let summary = reconstruct(&events);
        assert_eq!(summary.as_ref().map(|s| s.completed), Some(false));
        assert_eq!(summary.map(|s| s.trail_scores.critical_score), Some(90));
        assert!(reconstruct(&[]).is_none());
    }
}
