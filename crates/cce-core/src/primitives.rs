//! # Primitives
//!
//! Shared scalar types: stage numbers, severity tiers, run types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// STAGES
// =============================================================================

/// Identifier of one unit in the governed pipeline (1..=N).
pub type StageNumber = u32;

/// Number of stages in the default pipeline.
pub const DEFAULT_STAGE_COUNT: StageNumber = 40;

/// The full default stage range `1..=40`.
#[must_use]
pub fn default_stages() -> Vec<StageNumber> {
    stage_range(DEFAULT_STAGE_COUNT)
}

/// Every stage of a pipeline with `count` stages: `1..=count`.
#[must_use]
pub fn stage_range(count: StageNumber) -> Vec<StageNumber> {
    (1..=count).collect()
}

// =============================================================================
// SEVERITY
// =============================================================================

/// Severity tier of a policy, violation, or event.
///
/// Declaration order is the sort order: `Critical` sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    /// All tiers, most severe first.
    pub const ALL: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
    ];

    /// Stable lowercase name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }

    /// Advisory tiers never move a score.
    #[must_use]
    pub fn is_advisory(&self) -> bool {
        matches!(self, Severity::Low | Severity::Info)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" => Ok(Severity::Critical),
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            "info" => Ok(Severity::Info),
            other => Err(UnknownVariant::new("severity", other)),
        }
    }
}

// =============================================================================
// RUN TYPE
// =============================================================================

/// How a run was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunType {
    #[default]
    Manual,
    Scheduled,
    OnDemand,
}

impl RunType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RunType::Manual => "manual",
            RunType::Scheduled => "scheduled",
            RunType::OnDemand => "on_demand",
        }
    }
}

impl fmt::Display for RunType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "manual" => Ok(RunType::Manual),
            "scheduled" => Ok(RunType::Scheduled),
            "on_demand" | "on-demand" => Ok(RunType::OnDemand),
            other => Err(UnknownVariant::new("run type", other)),
        }
    }
}

/// A string that did not name any variant of a closed enum.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
