//! # Datastore Module
//!
//! The narrow probe capability that check evaluation depends on.
//!
//! Production runs use the redb-backed [`crate::storage::ComplianceStore`];
//! tests substitute in-memory fakes. [`UnreachableStore`] stands in when the
//! store cannot be opened at all, so a degraded run still scores every cell.

use crate::check::CheckResult;
use crate::primitives::StageNumber;
use thiserror::Error;

// =============================================================================
// PROBE ERRORS
// =============================================================================

/// A probe that failed to produce an answer.
///
/// These never abort a run; the dispatcher turns each one into a failing
/// [`CheckResult`] with `error` set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    /// The named table does not exist.
    #[error("relation \"{0}\" does not exist")]
    RelationMissing(String),

    /// The datastore could not be reached or failed mid-probe.
    #[error("datastore unavailable: {0}")]
    Unavailable(String),

    /// No predicate registered under this name.
    #[error("no custom predicate named '{0}'")]
    UnknownPredicate(String),

    /// A predicate ran and reported a failure of its own.
    #[error("predicate '{name}' failed: {message}")]
    Predicate { name: String, message: String },

    /// The probe did not finish in time.
    #[error("check timed out after {0} ms")]
    Timeout(u64),

    /// The probe panicked.
    #[error("check panicked: {0}")]
    Panicked(String),

    /// The rule could not be compiled into a runnable check.
    #[error("invalid rule: {0}")]
    InvalidRule(String),
}

impl ProbeError {
    /// Whether this is the "relation does not exist" class of error.
    #[must_use]
    pub fn is_relation_missing(&self) -> bool {
        matches!(self, ProbeError::RelationMissing(_))
    }
}

// =============================================================================
// DATASTORE TRAIT
// =============================================================================

/// Probe-by-table and probe-custom-by-name, nothing else.
pub trait Datastore: Send + Sync {
    /// Count rows of `table` whose `column` equals `stage`.
    fn count_rows(&self, table: &str, column: &str, stage: StageNumber) -> Result<u64, ProbeError>;

    /// Minimal existence probe of `table`.
    fn probe_table(&self, table: &str) -> Result<(), ProbeError>;

    /// Run the custom predicate registered as `name` for `stage`.
    fn probe_custom(&self, name: &str, stage: StageNumber) -> Result<CheckResult, ProbeError>;
}

// =============================================================================
// UNREACHABLE STORE
// =============================================================================

/// A datastore that fails every probe with the same reason.
#[derive(Debug, Clone)]
pub struct UnreachableStore {
    reason: String,
}

impl UnreachableStore {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl Datastore for UnreachableStore {
    fn count_rows(&self, _table: &str, _column: &str, _stage: StageNumber) -> Result<u64, ProbeError> {
        Err(ProbeError::Unavailable(self.reason.clone()))
    }

    fn probe_table(&self, _table: &str) -> Result<(), ProbeError> {
        Err(ProbeError::Unavailable(self.reason.clone()))
    }

    fn probe_custom(&self, _name: &str, _stage: StageNumber) -> Result<CheckResult, ProbeError> {
        Err(ProbeError::Unavailable(self.reason.clone()))
    }
}
