//! # Event Emitter
//!
//! Writes the audit trail of one run.
//!
//! Emission is best-effort. A failed write is logged and counted but never
//! surfaces to the caller; the run continues with its score unchanged.

use crate::error::EventEmissionError;
use cce_core::{ComplianceEvent, EventLog, RunReport, RunType, StageNumber, Violation};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

pub struct EventEmitter {
    sink: Option<Arc<dyn EventLog>>,
    check_id: String,
    sequence: AtomicU64,
    emitted: AtomicU64,
    failures: AtomicU64,
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("check_id", &self.check_id)
            .field("enabled", &self.is_enabled())
            .field("failures", &self.failures())
            .finish()
    }
}

impl EventEmitter {
    /// Emitter that appends to `sink`.
    pub fn new(sink: Arc<dyn EventLog>, check_id: impl Into<String>) -> Self {
        Self::with_sink(Some(sink), check_id.into())
    }

    /// Emitter that drops every event.
    pub fn disabled(check_id: impl Into<String>) -> Self {
        Self::with_sink(None, check_id.into())
    }

    fn with_sink(sink: Option<Arc<dyn EventLog>>, check_id: String) -> Self {
        Self {
            sink,
            check_id,
            sequence: AtomicU64::new(0),
            emitted: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    #[must_use]
    pub fn check_id(&self) -> &str {
        &self.check_id
    }

    /// Events written so far.
    #[must_use]
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    /// Events that could not be written.
    #[must_use]
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub async fn run_started(&self, run_type: RunType, stages: &[StageNumber], rule_count: usize) {
        if !self.is_enabled() {
            return;
        }
        let event = ComplianceEvent::check_started(
            new_event_id(),
            self.check_id.as_str(),
            run_type,
            stages,
            rule_count,
            Utc::now(),
        );
        self.emit(event).await;
    }

    pub async fn violation_detected(&self, violation: &Violation) {
        if !self.is_enabled() {
            return;
        }
        let event = ComplianceEvent::violation_detected(
            new_event_id(),
            self.check_id.as_str(),
            violation,
            Utc::now(),
        );
        self.emit(event).await;
    }

    pub async fn run_completed(&self, report: &RunReport) {
        if !self.is_enabled() {
            return;
        }
        let event = ComplianceEvent::check_completed(new_event_id(), report, Utc::now());
        self.emit(event).await;
    }

    /// Append one event. Returns whether it was written.
    pub async fn emit(&self, event: ComplianceEvent) -> bool {
        match self.append(event).await {
            Ok(()) => {
                self.emitted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(error) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!(%error, "event dropped");
                false
            }
        }
    }

    async fn append(&self, event: ComplianceEvent) -> Result<(), EventEmissionError> {
        let Some(sink) = &self.sink else {
            return Ok(());
        };
        let sink = Arc::clone(sink);
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let event_type = event.event_type;

        let failure = |reason: String| EventEmissionError {
            check_id: self.check_id.clone(),
            event_type: event_type.to_string(),
            reason,
        };

        match tokio::task::spawn_blocking(move || sink.append(sequence, &event)).await {
            Ok(Ok(())) => {
                debug!(check_id = %self.check_id, sequence, %event_type, "event appended");
                Ok(())
            }
            Ok(Err(store_error)) => Err(failure(store_error.to_string())),
            Err(join_error) => Err(failure(join_error.to_string())),
        }
    }
}

/// Fresh globally unique event id.
#[must_use]
pub fn new_event_id() -> String {
    Uuid::new_v4().to_string()
}
