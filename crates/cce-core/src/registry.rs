//! # Registry Module
//!
//! Loads the active policy catalog for a run.
//!
//! The registry is a plain value handed to the run coordinator; it holds no
//! cached state, so every run sees a fresh snapshot.

use crate::defaults::default_policies;
use crate::policy::{sort_by_severity, Policy};
use crate::storage::StoreError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Anything that can list stored policies.
pub trait PolicySource: Send + Sync {
    /// Every active policy version.
    fn active_policies(&self) -> Result<Vec<Policy>, StoreError>;
}

/// The registry datastore could not be read. Fatal for a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("policy registry unreachable: {0}")]
pub struct RegistryLoadError(pub String);

/// Where a run gets its policies from.
#[derive(Clone)]
pub enum PolicyRegistry {
    /// A policy store.
    Store(Arc<dyn PolicySource>),
    /// The built-in catalog; no datastore involved.
    Builtin,
    /// A store that could not be opened; loading always fails.
    Unreachable(String),
}

impl fmt::Debug for PolicyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyRegistry::Store(_) => f.write_str("PolicyRegistry::Store"),
            PolicyRegistry::Builtin => f.write_str("PolicyRegistry::Builtin"),
            PolicyRegistry::Unreachable(reason) => {
                write!(f, "PolicyRegistry::Unreachable({reason})")
            }
        }
    }
}

impl PolicyRegistry {
    pub fn from_source(source: Arc<dyn PolicySource>) -> Self {
        PolicyRegistry::Store(source)
    }

    /// Load active policies, critical first.
    ///
    /// `Ok(vec![])` means "no active policies" and is a valid state.
    /// `Err` means the registry could not be read at all.
    pub fn load_policies(&self) -> Result<Vec<Policy>, RegistryLoadError> {
        let mut policies = match self {
            PolicyRegistry::Store(source) => source
                .active_policies()
                .map_err(|e| RegistryLoadError(e.to_string()))?,
            PolicyRegistry::Builtin => default_policies(),
            PolicyRegistry::Unreachable(reason) => {
                return Err(RegistryLoadError(reason.clone()));
            }
        };

        policies.retain(|p| p.is_active);
        sort_by_severity(&mut policies);
        Ok(policies)
    }

    #[must_use]
    pub fn is_builtin(&self) -> bool {
        matches!(self, PolicyRegistry::Builtin)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::RuleConfig;
    use crate::primitives::Severity;

    struct Fixed(Result<Vec<Policy>, String>);

    impl PolicySource for Fixed {
        fn active_policies(&self) -> Result<Vec<Policy>, StoreError> {
            self.0.clone().map_err(StoreError::Unavailable)
        }
    }

    fn policy(id: &str, severity: Severity, active: bool) -> Policy {
        let mut p = Policy::new(
            id,
            id,
            severity,
            RuleConfig::TableExists {
                table: "t".to_string(),
            },
        );
        p.is_active = active;
        p
    }

    #[test]
    fn unreachable_is_distinct_from_empty() {
        let down = PolicyRegistry::from_source(Arc::new(Fixed(Err("io".to_string()))));
        let empty = PolicyRegistry::from_source(Arc::new(Fixed(Ok(Vec::new()))));

        assert!(down.load_policies().is_err());
        assert_eq!(empty.load_policies(), Ok(Vec::new()));
    }

    #[test]
    fn orders_by_severity_and_drops_inactive() {
        let registry = PolicyRegistry::from_source(Arc::new(Fixed(Ok(vec![
            policy("LOW-1", Severity::Low, true),
            policy("OLD-1", Severity::Critical, false),
            policy("CRIT-1", Severity::Critical, true),
        ]))));
        let loaded = registry.load_policies().unwrap_or_default();
        let ids: Vec<_> = loaded.iter().map(|p| p.policy_id.as_str()).collect();
        assert_eq!(ids, vec!["CRIT-1", "LOW-1"]);
    }

    #[test]
    fn builtin_needs_no_store() {
        let loaded = PolicyRegistry::Builtin.load_policies();
        assert_eq!(loaded.map(|p| p.len()), Ok(default_policies().len()));
    }

    #[test]
    fn unreachable_variant_always_fails() {
        let registry = PolicyRegistry::Unreachable("missing file".to_string());
        assert_eq!(
            registry.load_policies(),
            Err(RegistryLoadError("missing file".to_string()))
        );
    }
}
