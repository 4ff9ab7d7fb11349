//! # Rules Module
//!
//! Compiles stored policies into run-scoped executable rules.
//!
//! Rules are rebuilt from the policy snapshot at the start of every run and
//! are never persisted or shared across runs.

use crate::check::{CheckResult, CheckSpec};
use crate::condition::{Expectation, DEFAULT_CONDITION};
use crate::datastore::Datastore;
use crate::policy::{Policy, RuleConfig};
use crate::primitives::{Severity, StageNumber};
use std::collections::{BTreeMap, BTreeSet};

/// Delimiter that replaces every separator in a rule key.
pub const KEY_DELIMITER: char = '_';

/// Derive the lookup key for a policy id.
///
/// ASCII alphanumerics are upper-cased; everything else becomes `_`.
/// `CREWAI-001` → `CREWAI_001`.
#[must_use]
pub fn rule_key(policy_id: &str) -> String {
    policy_id
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                KEY_DELIMITER
            }
        })
        .collect()
}

// =============================================================================
// RULE
// =============================================================================

/// The compiled, executable form of a policy for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub key: String,
    /// The originating `policy_id`.
    pub id: String,
    pub name: String,
    pub severity: Severity,
    pub category: String,
    pub description: String,
    pub applicable_stages: BTreeSet<StageNumber>,
    pub remediation_template: String,
    pub check: CheckSpec,
}

impl Rule {
    /// Compile one policy under the given key.
    pub fn compile(key: String, policy: &Policy) -> Self {
        Self {
            key,
            id: policy.policy_id.clone(),
            name: policy.name.clone(),
            severity: policy.severity,
            category: policy.category.clone(),
            description: policy.description.clone(),
            applicable_stages: policy.applicable_stages.clone(),
            remediation_template: policy.remediation_template.clone(),
            check: compile_check(&policy.rule_config),
        }
    }

    #[must_use]
    pub fn applies_to(&self, stage: StageNumber) -> bool {
        self.applicable_stages.is_empty() || self.applicable_stages.contains(&stage)
    }

    /// Run this rule's check for `stage`.
    pub fn check(&self, store: &dyn Datastore, stage: StageNumber) -> CheckResult {
        self.check.evaluate(store, stage)
    }

    #[must_use]
    pub fn remediation_for(&self, stage: StageNumber) -> String {
        self.remediation_template
            .replace(crate::policy::STAGE_PLACEHOLDER, &stage.to_string())
    }
}

fn compile_check(config: &RuleConfig) -> CheckSpec {
    match config {
        RuleConfig::RowCount {
            table,
            stage_column,
            expected_condition,
        } => {
            let raw = expected_condition.as_deref().unwrap_or(DEFAULT_CONDITION);
            match raw.parse::<Expectation>() {
                Ok(expectation) => CheckSpec::RowCount {
                    table: table.clone(),
                    stage_column: stage_column.clone(),
                    expectation,
                },
                Err(err) => CheckSpec::Invalid {
                    reason: err.to_string(),
                },
            }
        }
        RuleConfig::TableExists { table } => CheckSpec::TableExists {
            table: table.clone(),
        },
        RuleConfig::Custom { custom_function } => CheckSpec::Custom {
            name: custom_function.clone(),
        },
    }
}

// =============================================================================
// COMPILER
// =============================================================================

/// Compile policies into a key → rule map with exactly one entry per policy.
///
/// Keys that collide after the transform (`A-1` and `A.1`) are disambiguated
/// in input order by appending `__2`, `__3`, ...
pub fn policies_to_rules(policies: &[Policy]) -> BTreeMap<String, Rule> {
    let mut rules = BTreeMap::new();

    for policy in policies {
        let base = rule_key(&policy.policy_id);
        let mut key = base.clone();
        let mut suffix: u32 = 2;
        while rules.contains_key(&key) {
            key = format!("{base}__{suffix}");
            suffix = suffix.saturating_add(1);
        }
        let rule = Rule::compile(key.clone(), policy);
        rules.insert(key, rule);
    }

    rules
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn table_policy(id: &str) -> Policy {
        Policy::new(
            id,
            format!("policy {id}"),
            Severity::Medium,
            RuleConfig::TableExists {
                table: "t".to_string(),
            },
        )
    }

    #[test]
    fn key_transform_examples() {
        assert_eq!(rule_key("CREWAI-001"), "CREWAI_001");
        assert_eq!(rule_key("gov.stage-2"), "GOV_STAGE_2");
        assert_eq!(rule_key(" A B "), "A_B");
    }

    #[test]
    fn key_transform_is_deterministic() {
        assert_eq!(rule_key("SEC-042"), rule_key("SEC-042"));
    }

    #[test]
    fn one_rule_per_policy() {
        let policies = vec![table_policy("CREWAI-001"), table_policy("CREWAI-002")];
        let rules = policies_to_rules(&policies);
        assert_eq!(rules.len(), 2);
        assert!(rules.contains_key("CREWAI_001"));
        assert_eq!(rules.get("CREWAI_002").map(|r| r.id.as_str()), Some("CREWAI-002"));
    }

    #[test]
    fn colliding_keys_are_disambiguated() {
        let policies = vec![table_policy("A-1"), table_policy("A.1"), table_policy("a_1")];
        let rules = policies_to_rules(&policies);
        assert_eq!(rules.len(), 3);
        assert_eq!(rules.get("A_1").map(|r| r.id.as_str()), Some("A-1"));
        assert_eq!(rules.get("A_1__2").map(|r| r.id.as_str()), Some("A.1"));
        assert_eq!(rules.get("A_1__3").map(|r| r.id.as_str()), Some("a_1"));
    }

    #[test]
    fn missing_condition_defaults_to_at_least_one() {
        let policy = Policy::new(
            "P-1",
            "p",
            Severity::High,
            RuleConfig::RowCount {
                table: "agents".to_string(),
                stage_column: "stage_number".to_string(),
                expected_condition: None,
            },
        );
        let rule = Rule::compile("P_1".to_string(), &policy);
        assert_eq!(
            rule.check,
            CheckSpec::RowCount {
                table: "agents".to_string(),
                stage_column: "stage_number".to_string(),
                expectation: Expectation::default(),
            }
        );
    }

    #[test]
    fn bad_condition_compiles_to_invalid_check() {
        let policy = Policy::new(
            "P-1",
            "p",
            Severity::High,
            RuleConfig::RowCount {
                table: "agents".to_string(),
                stage_column: "stage_number".to_string(),
                expected_condition: Some("lots".to_string()),
            },
        );
        let rule = Rule::compile("P_1".to_string(), &policy);
        assert!(matches!(rule.check, CheckSpec::Invalid { .. }));
    }

    #[test]
    fn rule_carries_policy_metadata() {
        let policy = table_policy("GOV-9")
            .with_stages([3])
            .with_remediation("stage ${stage}");
        let rules = policies_to_rules(std::slice::from_ref(&policy));
        let rule = rules.get("GOV_9");
        assert_eq!(rule.map(|r| r.severity), Some(Severity::Medium));
        assert_eq!(rule.map(|r| r.applies_to(3)), Some(true));
        assert_eq!(rule.map(|r| r.applies_to(4)), Some(false));
        assert_eq!(rule.map(|r| r.remediation_for(3)), Some("stage 3".to_string()));
    }
}
