//! # Defaults Module
//!
//! The built-in policy catalog used when the registry is bypassed, and the
//! built-in custom predicates.

use crate::check::CheckResult;
use crate::datastore::{Datastore, ProbeError};
use crate::policy::{Policy, RuleConfig, DEFAULT_STAGE_COLUMN};
use crate::primitives::{Severity, StageNumber, DEFAULT_STAGE_COUNT};
use std::collections::BTreeMap;
use std::sync::Arc;

// =============================================================================
// DEFAULT POLICIES
// =============================================================================

fn row_count(table: &str, condition: &str) -> RuleConfig {
    RuleConfig::RowCount {
        table: table.to_string(),
        stage_column: DEFAULT_STAGE_COLUMN.to_string(),
        expected_condition: Some(condition.to_string()),
    }
}

/// Built-in catalog for `--no-registry` runs, critical first.
#[must_use]
pub fn default_policies() -> Vec<Policy> {
    vec![
        Policy::new(
            "CREWAI-001",
            "Stage agents registered",
            Severity::Critical,
            row_count("crewai_agents", "count >= 1"),
        )
        .with_category("agents")
        .with_description("Every stage must have at least one registered agent.")
        .with_remediation("Register an agent for stage ${stage} in crewai_agents."),
        Policy::new(
            "CREWAI-002",
            "Stage crews configured",
            Severity::High,
            row_count("crewai_crews", "count >= 1"),
        )
        .with_category("agents")
        .with_description("Every stage must have a configured crew.")
        .with_remediation("Configure a crew for stage ${stage} in crewai_crews."),
        Policy::new(
            "GOV-001",
            "No open stage blockers",
            Severity::High,
            row_count("stage_blockers", "count == 0"),
        )
        .with_category("governance")
        .with_description("A stage must not carry open blockers.")
        .with_remediation("Resolve the open blockers recorded for stage ${stage}."),
        Policy::new(
            "CREWAI-003",
            "Task table present",
            Severity::Medium,
            RuleConfig::TableExists {
                table: "crewai_tasks".to_string(),
            },
        )
        .with_category("schema")
        .with_description("The task table must exist.")
        .with_remediation("Create the crewai_tasks table before running stage ${stage}."),
        Policy::new(
            "GOV-002",
            "Stage documented",
            Severity::Low,
            RuleConfig::Custom {
                custom_function: STAGE_HAS_DOCUMENTATION.to_string(),
            },
        )
        .with_category("documentation")
        .with_description("Each stage should have at least one documentation record.")
        .with_remediation("Add a stage_documentation row for stage ${stage}."),
        Policy::new(
            "GOV-003",
            "Stage within pipeline range",
            Severity::Info,
            RuleConfig::Custom {
                custom_function: STAGE_IN_PIPELINE_RANGE.to_string(),
            },
        )
        .with_category("governance")
        .with_description("Stage numbers must fall inside the configured pipeline."),
    ]
}

// =============================================================================
// CUSTOM PREDICATES
// =============================================================================

/// Name of the documentation predicate.
pub const STAGE_HAS_DOCUMENTATION: &str = "stage_has_documentation";

/// Name of the range predicate.
pub const STAGE_IN_PIPELINE_RANGE: &str = "stage_in_pipeline_range";

/// A custom predicate: sees the datastore and the stage, reports pass/fail.
pub type PredicateFn =
    Arc<dyn Fn(&dyn Datastore, StageNumber) -> Result<CheckResult, ProbeError> + Send + Sync>;

/// Name → predicate lookup.
#[derive(Clone, Default)]
pub struct PredicateRegistry {
    predicates: BTreeMap<String, PredicateFn>,
}

impl std::fmt::Debug for PredicateRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredicateRegistry")
            .field("names", &self.predicates.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PredicateRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in predicates for the default pipeline.
    #[must_use]
    pub fn with_builtins() -> Self {
        Self::with_builtins_for(DEFAULT_STAGE_COUNT)
    }

    /// The built-in predicates for a pipeline of `stage_count` stages.
    #[must_use]
    pub fn with_builtins_for(stage_count: StageNumber) -> Self {
        let mut registry = Self::new();
        registry.register(STAGE_HAS_DOCUMENTATION, |store, stage| {
            let count = store.count_rows("stage_documentation", DEFAULT_STAGE_COLUMN, stage)?;
            let evidence = format!("{count} documentation record(s) for stage {stage}");
            Ok(if count > 0 {
                CheckResult::pass(evidence)
            } else {
                CheckResult::fail(evidence)
            })
        });
        registry.register(STAGE_IN_PIPELINE_RANGE, move |_store, stage| {
            Ok(if (1..=stage_count).contains(&stage) {
                CheckResult::pass(format!("stage {stage} is within 1..={stage_count}"))
            } else {
                CheckResult::fail(format!("stage {stage} is outside 1..={stage_count}"))
            })
        });
        registry
    }

    /// Register (or replace) a predicate.
    pub fn register<F>(&mut self, name: impl Into<String>, predicate: F)
    where
        F: Fn(&dyn Datastore, StageNumber) -> Result<CheckResult, ProbeError> + Send + Sync + 'static,
    {
        self.predicates.insert(name.into(), Arc::new(predicate));
    }

    /// Run `name` against `store` for `stage`.
    pub fn invoke(
        &self,
        name: &str,
        store: &dyn Datastore,
        stage: StageNumber,
    ) -> Result<CheckResult, ProbeError> {
        let predicate = self
            .predicates
            .get(name)
            .ok_or_else(|| ProbeError::UnknownPredicate(name.to_string()))?;
        predicate(store, stage)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.predicates.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.predicates.keys().map(String::as_str)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::policies_to_rules;

    struct DocsStore(u64);

    impl Datastore for DocsStore {
        fn count_rows(&self, table: &str, _column: &str, _stage: StageNumber) -> Result<u64, ProbeError> {
            if table == "stage_documentation" {
                Ok(self.0)
            } else {
                Err(ProbeError::RelationMissing(table.to_string()))
            }
        }

        fn probe_table(&self, _table: &str) -> Result<(), ProbeError> {
            Ok(())
        }

        fn probe_custom(&self, name: &str, _stage: StageNumber) -> Result<CheckResult, ProbeError> {
            Err(ProbeError::UnknownPredicate(name.to_string()))
        }
    }

    #[test]
    fn defaults_are_valid_and_critical_first() {
        let policies = default_policies();
        assert!(policies.iter().all(|p| p.validate().is_ok()));
        assert_eq!(policies.first().map(|p| p.severity), Some(Severity::Critical));

        let mut sorted = policies.clone();
        crate::policy::sort_by_severity(&mut sorted);
        let severities: Vec<_> = sorted.iter().map(|p| p.severity).collect();
        let original: Vec<_> = policies.iter().map(|p| p.severity).collect();
        assert_eq!(severities, original);
    }

    #[test]
    fn defaults_compile_to_distinct_rules() {
        let rules = policies_to_rules(&default_policies());
        assert_eq!(rules.len(), default_policies().len());
        assert!(rules.contains_key("CREWAI_001"));
        assert!(rules.contains_key("GOV_003"));
    }

    #[test]
    fn builtin_predicates() {
        let registry = PredicateRegistry::with_builtins();
        assert!(registry.contains(STAGE_HAS_DOCUMENTATION));

        let documented = registry.invoke(STAGE_HAS_DOCUMENTATION, &DocsStore(2), 1);
        assert_eq!(documented.map(|r| r.passed), Ok(true));
        let undocumented = registry.invoke(STAGE_HAS_DOCUMENTATION, &DocsStore(0), 1);
        assert_eq!(undocumented.map(|r| r.passed), Ok(false));

        let in_range = registry.invoke(STAGE_IN_PIPELINE_RANGE, &DocsStore(0), 40);
        assert_eq!(in_range.map(|r| r.passed), Ok(true));
        let out_of_range = registry.invoke(STAGE_IN_PIPELINE_RANGE, &DocsStore(0), 41);
        assert_eq!(out_of_range.map(|r| r.passed), Ok(false));
    }

    #[test]
    fn pipeline_range_follows_stage_count() {
        let registry = PredicateRegistry::with_builtins_for(50);
        let stage_41 = registry.invoke(STAGE_IN_PIPELINE_RANGE, &DocsStore(0), 41);
        assert_eq!(stage_41.map(|r| r.passed), Ok(true));
        let stage_51 = registry.invoke(STAGE_IN_PIPELINE_RANGE, &DocsStore(0), 51);
        assert_eq!(stage_51.map(|r| r.passed), Ok(false));
    }

    #[test]
    fn unknown_predicate_is_probe_error() {
        let registry = PredicateRegistry::new();
        assert_eq!(
            registry.invoke("missing", &DocsStore(0), 1),
            Err(ProbeError::UnknownPredicate("missing".to_string()))
        );
    }
}
