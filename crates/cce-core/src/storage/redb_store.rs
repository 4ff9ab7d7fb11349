//! redb-backed compliance store.
//!
//! Tables:
//! - `policies`: `(policy_id, version)` → policy JSON
//! - `events`: `(check_id, sequence)` → event JSON, insert-only
//! - `relations`: table name → next row sequence
//! - `rows`: `(table, row_sequence)` → row JSON object

use super::{EventLog, StoreError};
use crate::check::CheckResult;
use crate::datastore::{Datastore, ProbeError};
use crate::defaults::PredicateRegistry;
use crate::event::ComplianceEvent;
use crate::policy::Policy;
use crate::primitives::StageNumber;
use crate::registry::PolicySource;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde_json::Value;
use std::path::Path;

const POLICIES: TableDefinition<(&str, u32), &str> = TableDefinition::new("policies");
const EVENTS: TableDefinition<(&str, u64), &str> = TableDefinition::new("events");
const RELATIONS: TableDefinition<&str, u64> = TableDefinition::new("relations");
const ROWS: TableDefinition<(&str, u64), &str> = TableDefinition::new("rows");

/// The engine's single durable store.
pub struct ComplianceStore {
    db: Database,
    predicates: PredicateRegistry,
}

impl std::fmt::Debug for ComplianceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComplianceStore")
            .field("predicates", &self.predicates)
            .finish()
    }
}

impl ComplianceStore {
    /// Create (or open) a store file and make sure every table exists.
    pub fn create(path: &Path) -> Result<Self, StoreError> {
        let db = Database::create(path)?;
        Self::from_database(db)
    }

    /// Open an existing store file. Fails if the file is missing.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Err(StoreError::NotFound(path.display().to_string()));
        }
        let db = Database::open(path)?;
        Self::from_database(db)
    }

    fn from_database(db: Database) -> Result<Self, StoreError> {
        let txn = db.begin_write()?;
        {
            txn.open_table(POLICIES)?;
            txn.open_table(EVENTS)?;
            txn.open_table(RELATIONS)?;
            txn.open_table(ROWS)?;
        }
        txn.commit()?;

        Ok(Self {
            db,
            predicates: PredicateRegistry::with_builtins(),
        })
    }

    /// Replace the custom predicate registry.
    #[must_use]
    pub fn with_predicates(mut self, predicates: PredicateRegistry) -> Self {
        self.predicates = predicates;
        self
    }

    // =========================================================================
    // POLICIES
    // =========================================================================

    /// Store a policy as a new version.
    ///
    /// The stored version is `max(policy.version, latest + 1)`. When the new
    /// version is active every other version of the same id is deactivated.
    /// Nothing is ever deleted.
    pub fn put_policy(&self, policy: &Policy) -> Result<Policy, StoreError> {
        policy.validate().map_err(StoreError::InvalidPolicy)?;
        let id = policy.policy_id.as_str();

        let txn = self.db.begin_write()?;
        let stored = {
            let mut table = txn.open_table(POLICIES)?;

            let mut existing = Vec::new();
            for entry in table.range((id, 0u32)..=(id, u32::MAX))? {
                let (_, value) = entry?;
                existing.push(serde_json::from_str::<Policy>(value.value())?);
            }

            let latest = existing.iter().map(|p| p.version).max().unwrap_or(0);
            let mut stored = policy.clone();
            stored.version = policy.version.max(latest.saturating_add(1));

            if stored.is_active {
                for mut old in existing.into_iter().filter(|p| p.is_active) {
                    old.is_active = false;
                    let json = serde_json::to_string(&old)?;
                    table.insert((id, old.version), json.as_str())?;
                }
            }

            let json = serde_json::to_string(&stored)?;
            table.insert((id, stored.version), json.as_str())?;
            stored
        };
        txn.commit()?;

        Ok(stored)
    }

    /// Deactivate the active version of `policy_id`. Returns whether one was active.
    pub fn deactivate_policy(&self, policy_id: &str) -> Result<bool, StoreError> {
        let txn = self.db.begin_write()?;
        let changed = {
            let mut table = txn.open_table(POLICIES)?;

            let mut active = Vec::new();
            for entry in table.range((policy_id, 0u32)..=(policy_id, u32::MAX))? {
                let (_, value) = entry?;
                let policy: Policy = serde_json::from_str(value.value())?;
                if policy.is_active {
                    active.push(policy);
                }
            }

            let changed = !active.is_empty();
            for mut policy in active {
                policy.is_active = false;
                let json = serde_json::to_string(&policy)?;
                table.insert((policy_id, policy.version), json.as_str())?;
            }
            changed
        };
        txn.commit()?;

        Ok(changed)
    }

    /// Every stored policy version, ordered by id then version.
    pub fn all_policies(&self) -> Result<Vec<Policy>, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(POLICIES)?;

        let mut policies = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            policies.push(serde_json::from_str(value.value())?);
        }
        Ok(policies)
    }

    // =========================================================================
    // GOVERNED TABLES
    // =========================================================================

    /// Declare `table` so existence probes see it, even while empty.
    pub fn declare_table(&self, table: &str) -> Result<(), StoreError> {
        let txn = self.db.begin_write()?;
        {
            let mut relations = txn.open_table(RELATIONS)?;
            let known = relations.get(table)?.is_some();
            if !known {
                relations.insert(table, 0u64)?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Append JSON object rows to `table`, declaring it if needed.
    pub fn insert_rows(&self, table: &str, rows: &[Value]) -> Result<usize, StoreError> {
        if table.trim().is_empty() {
            return Err(StoreError::InvalidRow {
                table: table.to_string(),
                reason: "table name is empty".to_string(),
            });
        }
        if let Some(position) = rows.iter().position(|r| !r.is_object()) {
            return Err(StoreError::InvalidRow {
                table: table.to_string(),
                reason: format!("row {position} is not a JSON object"),
            });
        }

        let txn = self.db.begin_write()?;
        {
            let mut relations = txn.open_table(RELATIONS)?;
            let mut next = relations.get(table)?.map(|g| g.value()).unwrap_or(0);

            let mut row_table = txn.open_table(ROWS)?;
            for row in rows {
                let json = serde_json::to_string(row)?;
                row_table.insert((table, next), json.as_str())?;
                next = next.saturating_add(1);
            }
            relations.insert(table, next)?;
        }
        txn.commit()?;

        Ok(rows.len())
    }

    /// Declared table names.
    pub fn tables(&self) -> Result<Vec<String>, StoreError> {
        let txn = self.db.begin_read()?;
        let relations = txn.open_table(RELATIONS)?;

        let mut names = Vec::new();
        for entry in relations.iter()? {
            let (key, _) = entry?;
            names.push(key.value().to_string());
        }
        Ok(names)
    }

    fn has_table(&self, table: &str) -> Result<bool, StoreError> {
        let txn = self.db.begin_read()?;
        let relations = txn.open_table(RELATIONS)?;
        let found = relations.get(table)?.is_some();
        Ok(found)
    }

    /// `None` when the table is not declared.
    fn count_matching(
        &self,
        table: &str,
        column: &str,
        stage: StageNumber,
    ) -> Result<Option<u64>, StoreError> {
        let txn = self.db.begin_read()?;
        let relations = txn.open_table(RELATIONS)?;
        if relations.get(table)?.is_none() {
            return Ok(None);
        }

        let rows = txn.open_table(ROWS)?;
        let mut count: u64 = 0;
        for entry in rows.range((table, 0u64)..=(table, u64::MAX))? {
            let (_, value) = entry?;
            let row: Value = serde_json::from_str(value.value())?;
            if row.get(column).is_some_and(|v| stage_matches(v, stage)) {
                count = count.saturating_add(1);
            }
        }
        Ok(Some(count))
    }
}

/// Stage columns may hold numbers or numeric strings.
fn stage_matches(value: &Value, stage: StageNumber) -> bool {
    match value {
        Value::Number(n) => n.as_u64() == Some(stage as u64),
        Value::String(s) => s.trim().parse::<u64>().ok() == Some(stage as u64),
        _ => false,
    }
}

// =============================================================================
// TRAIT IMPLEMENTATIONS
// =============================================================================

impl PolicySource for ComplianceStore {
    fn active_policies(&self) -> Result<Vec<Policy>, StoreError> {
        Ok(self
            .all_policies()?
            .into_iter()
            .filter(|p| p.is_active)
            .collect())
    }
}

impl EventLog for ComplianceStore {
    fn append(&self, sequence: u64, event: &ComplianceEvent) -> Result<(), StoreError> {
        let check_id = event.check_id.as_str();
        let json = serde_json::to_string(event)?;

        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(EVENTS)?;
            if table.get((check_id, sequence))?.is_some() {
                return Err(StoreError::DuplicateEvent {
                    check_id: check_id.to_string(),
                    sequence,
                });
            }
            table.insert((check_id, sequence), json.as_str())?;
        }
        txn.commit()?;
        Ok(())
    }

    fn events_for_check(&self, check_id: &str) -> Result<Vec<ComplianceEvent>, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(EVENTS)?;

        let mut events = Vec::new();
        for entry in table.range((check_id, 0u64)..=(check_id, u64::MAX))? {
            let (_, value) = entry?;
            events.push(serde_json::from_str(value.value())?);
        }
        Ok(events)
    }
}

impl Datastore for ComplianceStore {
    fn count_rows(&self, table: &str, column: &str, stage: StageNumber) -> Result<u64, ProbeError> {
        match self.count_matching(table, column, stage) {
            Ok(Some(count)) => Ok(count),
            Ok(None) => Err(ProbeError::RelationMissing(table.to_string())),
            Err(err) => Err(ProbeError::Unavailable(err.to_string())),
        }
    }

    fn probe_table(&self, table: &str) -> Result<(), ProbeError> {
        match self.has_table(table) {
            Ok(true) => Ok(()),
            Ok(false) => Err(ProbeError::RelationMissing(table.to_string())),
            Err(err) => Err(ProbeError::Unavailable(err.to_string())),
        }
    }

    fn probe_custom(&self, name: &str, stage: StageNumber) -> Result<CheckResult, ProbeError> {
        self.predicates.invoke(name, self, stage)
    }
}

// =============================================================================
// TESTS
// =============================================================================
