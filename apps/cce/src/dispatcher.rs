//! # Check Dispatcher
//!
//! Runs one (rule, stage) check off the async runtime with a deadline,
//! bounded by a shared concurrency limit.
//!
//! Every outcome is a [`CheckResult`]. A slow probe becomes a timeout probe
//! error and a panicking predicate becomes a panic probe error, so one bad
//! check never takes the run down with it.
//!
//! The concurrency slot travels with the blocking closure. A check that
//! outlives its deadline keeps its slot until it actually returns, so hung
//! checks cannot pile up beyond the limit.

use cce_core::{CheckResult, Datastore, ProbeError, Rule, StageNumber};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct CheckDispatcher {
    store: Arc<dyn Datastore>,
    timeout: Duration,
    slots: Arc<Semaphore>,
}

impl std::fmt::Debug for CheckDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckDispatcher")
            .field("timeout", &self.timeout)
            .field("free_slots", &self.slots.available_permits())
            .finish_non_exhaustive()
    }
}

impl CheckDispatcher {
    /// At most `concurrency` checks run at once across every clone.
    pub fn new(store: Arc<dyn Datastore>, timeout: Duration, concurrency: usize) -> Self {
        Self {
            store,
            timeout,
            slots: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Evaluate `rule` for `stage` once a slot is free.
    ///
    /// The timeout covers only the check itself, not the wait for a slot. A
    /// timed-out check keeps running on the blocking pool, still holding its
    /// slot, until it returns; its result is dropped.
    pub async fn dispatch(&self, rule: Arc<Rule>, stage: StageNumber) -> CheckResult {
        // The semaphore is never closed.
        let slot = Arc::clone(&self.slots).acquire_owned().await.ok();
        let store = Arc::clone(&self.store);
        let task_rule = Arc::clone(&rule);
        let handle = tokio::task::spawn_blocking(move || {
            let _slot = slot;
            task_rule.check(store.as_ref(), stage)
        });

        match tokio::time::timeout(self.timeout, handle).await {
            Ok(Ok(result)) => {
                debug!(rule = %rule.key, stage, passed = result.passed, "check evaluated");
                result
            }
            Ok(Err(join_error)) => {
                let error = ProbeError::Panicked(join_failure_message(join_error));
                warn!(rule = %rule.key, stage, %error, "check task failed");
                CheckResult::probe_error(format!("{} could not be evaluated", rule.name), &error)
            }
            Err(_) => {
                let millis = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                let error = ProbeError::Timeout(millis);
                warn!(rule = %rule.key, stage, timeout_ms = millis, "check timed out");
                CheckResult::probe_error(format!("{} did not finish in time", rule.name), &error)
            }
        }
    }
}

/// Describe a failed check task.
pub(crate) fn join_failure_message(error: JoinError) -> String {
    if error.is_panic() {
        panic_message(error.into_panic())
    } else {
        "check task was cancelled".to_string()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
