//! # Storage Module
//!
//! Durable state for the engine using redb.
//!
//! Uses redb embedded database for:
//! - ACID transactions
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! One store file holds the policy table, the append-only event table, and
//! the governed tables that checks probe.

mod redb_store;

pub use redb_store::ComplianceStore;

use crate::datastore::UnreachableStore;
use crate::event::ComplianceEvent;
use thiserror::Error;

/// Errors raised by the compliance store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    #[error("invalid row for table {table}: {reason}")]
    InvalidRow { table: String, reason: String },

    #[error("event {sequence} of run {check_id} already exists")]
    DuplicateEvent { check_id: String, sequence: u64 },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Append-only sink and source of compliance events.
pub trait EventLog: Send + Sync {
    /// Append `event` as entry `sequence` of its run. Never overwrites.
    fn append(&self, sequence: u64, event: &ComplianceEvent) -> Result<(), StoreError>;

    /// Every event of one run, in sequence order.
    fn events_for_check(&self, check_id: &str) -> Result<Vec<ComplianceEvent>, StoreError>;
}

impl EventLog for UnreachableStore {
    fn append(&self, _sequence: u64, _event: &ComplianceEvent) -> Result<(), StoreError> {
        Err(StoreError::Unavailable(self.reason().to_string()))
    }

    fn events_for_check(&self, _check_id: &str) -> Result<Vec<ComplianceEvent>, StoreError> {
        Err(StoreError::Unavailable(self.reason().to_string()))
    }
}
