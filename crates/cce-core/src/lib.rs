//! # CCE Core
//!
//! The deterministic engine behind the Continuous Compliance Engine.
//!
//! A run compiles the active policy catalog into [`Rule`]s, evaluates every
//! applicable (stage, rule) cell against a [`Datastore`], accumulates
//! [`Violation`]s in a [`RunLedger`], and scores them into a [`RunReport`].
//!
//! ## Constraints
//!
//! - No async, no logging, no clock reads: callers pass timestamps and ids in.
//! - `BTreeMap`/`BTreeSet` only, so iteration order is stable.
//! - Check evaluation is total; probe failures become failing results.
//!
//! ## Modules
//!
//! | Module | Role |
//! |--------|------|
//! | [`policy`] | Stored, versioned policy records |
//! | [`rules`] | Policy → rule compilation and key derivation |
//! | [`check`] | Check kinds and their evaluation |
//! | [`datastore`] | The probe capability checks depend on |
//! | [`scoring`] | Clamped severity scoring |
//! | [`report`] | Run ledger, tier table, trail reconstruction |
//! | [`event`] | Audit events |
//! | [`registry`] | Policy loading |
//! | [`storage`] | redb-backed store |

pub mod check;
pub mod condition;
pub mod datastore;
pub mod defaults;
pub mod event;
pub mod policy;
pub mod primitives;
pub mod registry;
pub mod report;
pub mod rules;
pub mod scoring;
pub mod storage;
pub mod violation;

pub use check::{CheckResult, CheckSpec};
pub use condition::{Comparison, ConditionError, Expectation};
pub use datastore::{Datastore, ProbeError, UnreachableStore};
pub use defaults::{default_policies, PredicateFn, PredicateRegistry};
pub use event::{ComplianceEvent, EventType};
pub use policy::{Policy, RuleConfig};
pub use primitives::{
    default_stages, stage_range, RunType, Severity, StageNumber, UnknownVariant,
    DEFAULT_STAGE_COUNT,
};
pub use registry::{PolicyRegistry, PolicySource, RegistryLoadError};
pub use report::{
    completion_tier, reconstruct, RunLedger, RunReport, TrailSummary, DEFAULT_PASS_THRESHOLD,
};
pub use rules::{policies_to_rules, rule_key, Rule};
pub use scoring::{calculate_scores, Scores};
pub use storage::{ComplianceStore, EventLog, StoreError};
pub use violation::Violation;
