//! # Scoring Module
//!
//! Severity-weighted, clamped compliance scores.
//!
//! | Severity | criticalScore | overallScore |
//! |----------|---------------|--------------|
//! | critical | -10           | -5           |
//! | high     | 0             | -3           |
//! | medium   | 0             | -1           |
//! | low/info | 0             | 0            |
//!
//! Both scores start at 100 and are clamped to `[0, 100]`.

use crate::primitives::Severity;
use crate::violation::Violation;
use serde::{Deserialize, Serialize};

/// Starting value of both scores.
pub const MAX_SCORE: u32 = 100;

/// The pair of scores for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scores {
    pub critical_score: u32,
    pub overall_score: u32,
}

impl Default for Scores {
    fn default() -> Self {
        Self {
            critical_score: MAX_SCORE,
            overall_score: MAX_SCORE,
        }
    }
}

/// Deductions for one severity: `(critical, overall)`.
#[must_use]
pub fn deduction(severity: Severity) -> (u32, u32) {
    match severity {
        Severity::Critical => (10, 5),
        Severity::High => (0, 3),
        Severity::Medium => (0, 1),
        Severity::Low | Severity::Info => (0, 0),
    }
}

/// Score a list of violations.
///
/// Deductions are summed first and subtracted once, so the result does not
/// depend on the order of `violations`.
#[must_use]
pub fn calculate_scores(violations: &[Violation]) -> Scores {
    score_severities(violations.iter().map(|v| v.severity))
}

/// Score a stream of severities.
pub fn score_severities(severities: impl IntoIterator<Item = Severity>) -> Scores {
    let (critical, overall) = severities
        .into_iter()
        .map(deduction)
        .fold((0u64, 0u64), |(c, o), (dc, doverall)| {
            (c.saturating_add(dc as u64), o.saturating_add(doverall as u64))
        });

    Scores {
        critical_score: (MAX_SCORE as u64).saturating_sub(critical) as u32,
        overall_score: (MAX_SCORE as u64).saturating_sub(overall) as u32,
    }
}

// =============================================================================
// TESTS
// =============================================================================
