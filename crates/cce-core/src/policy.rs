//! # Policy Module
//!
//! The source-of-truth governance record.
//!
//! A `Policy` is versioned per `policy_id`: at most one version is active at
//! a time, and superseded versions stay in the store for audit.

use crate::condition::Expectation;
use crate::primitives::{Severity, StageNumber};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Column a row-count probe filters on when a policy does not name one.
pub const DEFAULT_STAGE_COLUMN: &str = "stage_number";

/// Placeholder substituted in remediation templates.
pub const STAGE_PLACEHOLDER: &str = "${stage}";

// =============================================================================
// RULE CONFIG
// =============================================================================

/// Declarative check configuration, tagged by `checkType`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "checkType", rename_all = "snake_case")]
pub enum RuleConfig {
    /// Count rows of `table` whose `stage_column` equals the stage.
    #[serde(rename_all = "camelCase")]
    RowCount {
        table: String,
        #[serde(default = "default_stage_column")]
        stage_column: String,
        #[serde(default)]
        expected_condition: Option<String>,
    },

    /// Probe that `table` exists.
    #[serde(rename_all = "camelCase")]
    TableExists { table: String },

    /// Delegate to a named predicate.
    #[serde(rename_all = "camelCase")]
    Custom { custom_function: String },
}

fn default_stage_column() -> String {
    DEFAULT_STAGE_COLUMN.to_string()
}

impl RuleConfig {
    /// Short name of the check kind, as stored.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            RuleConfig::RowCount { .. } => "row_count",
            RuleConfig::TableExists { .. } => "table_exists",
            RuleConfig::Custom { .. } => "custom",
        }
    }
}

// =============================================================================
// POLICY
// =============================================================================

/// A versioned, declarative governance rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub policy_id: String,
    pub name: String,
    #[serde(default = "first_version")]
    pub version: u32,
    #[serde(default)]
    pub category: String,
    pub severity: Severity,
    #[serde(default = "active_by_default")]
    pub is_active: bool,
    #[serde(default)]
    pub description: String,
    pub rule_config: RuleConfig,
    /// Empty means every stage.
    #[serde(default)]
    pub applicable_stages: BTreeSet<StageNumber>,
    #[serde(default)]
    pub remediation_template: String,
}

fn first_version() -> u32 {
    1
}

fn active_by_default() -> bool {
    true
}

impl Policy {
    /// Create an active version-1 policy with no stage restriction.
    pub fn new(
        policy_id: impl Into<String>,
        name: impl Into<String>,
        severity: Severity,
        rule_config: RuleConfig,
    ) -> Self {
        Self {
            policy_id: policy_id.into(),
            name: name.into(),
            version: 1,
            category: String::new(),
            severity,
            is_active: true,
            description: String::new(),
            rule_config,
            applicable_stages: BTreeSet::new(),
            remediation_template: String::new(),
        }
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_stages(mut self, stages: impl IntoIterator<Item = StageNumber>) -> Self {
        self.applicable_stages = stages.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_remediation(mut self, template: impl Into<String>) -> Self {
        self.remediation_template = template.into();
        self
    }

    #[must_use]
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Whether this policy governs `stage`.
    #[must_use]
    pub fn applies_to(&self, stage: StageNumber) -> bool {
        self.applicable_stages.is_empty() || self.applicable_stages.contains(&stage)
    }

    /// Remediation text for one stage.
    #[must_use]
    pub fn remediation_for(&self, stage: StageNumber) -> String {
        self.remediation_template
            .replace(STAGE_PLACEHOLDER, &stage.to_string())
    }

    /// Basic shape checks run before a policy is written to the store.
    pub fn validate(&self) -> Result<(), String> {
        if self.policy_id.trim().is_empty() {
            return Err("policyId must not be empty".to_string());
        }
        if self.name.trim().is_empty() {
            return Err(format!("policy {} has an empty name", self.policy_id));
        }
        if self.version == 0 {
            return Err(format!("policy {} has version 0", self.policy_id));
        }
        if self.applicable_stages.contains(&0) {
            return Err(format!("policy {} lists stage 0", self.policy_id));
        }
        let target_empty = match &self.rule_config {
            RuleConfig::RowCount { table, .. } | RuleConfig::TableExists { table } => {
                table.trim().is_empty()
            }
            RuleConfig::Custom { custom_function } => custom_function.trim().is_empty(),
        };
        if target_empty {
            return Err(format!(
                "policy {} has an empty {} target",
                self.policy_id,
                self.rule_config.kind()
            ));
        }
        if let RuleConfig::RowCount {
            expected_condition: Some(condition),
            ..
        } = &self.rule_config
        {
            condition.parse::<Expectation>().map_err(|err| {
                format!("policy {} has an invalid expectedCondition: {err}", self.policy_id)
            })?;
        }
        Ok(())
    }
}

/// Sort policies critical-first, then by id for a stable order.
pub fn sort_by_severity(policies: &mut [Policy]) {
    policies.sort_by(|a, b| {
        a.severity
            .cmp(&b.severity)
            .then_with(|| a.policy_id.cmp(&b.policy_id))
    });
}

// =============================================================================
// TESTS
// =============================================================================
