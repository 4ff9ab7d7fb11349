//! # Configuration
//!
//! Engine settings and per-run options, built from the parsed CLI.

use crate::error::ArgumentError;
use cce_core::{
    stage_range, RunType, StageNumber, DEFAULT_PASS_THRESHOLD, DEFAULT_STAGE_COUNT,
};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

/// Default store file.
pub const DEFAULT_DB_PATH: &str = "cce.redb";

/// Default number of checks in flight at once.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Default per-check timeout.
pub const DEFAULT_CHECK_TIMEOUT_MS: u64 = 5_000;

/// Settings shared by every run of one process.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub db_path: PathBuf,
    /// Minimum critical score for a passing run.
    pub pass_threshold: u32,
    pub concurrency: usize,
    pub check_timeout: Duration,
    /// Stages in the governed pipeline; runs accept `1..=stage_count`.
    pub stage_count: StageNumber,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            pass_threshold: DEFAULT_PASS_THRESHOLD,
            concurrency: DEFAULT_CONCURRENCY,
            check_timeout: Duration::from_millis(DEFAULT_CHECK_TIMEOUT_MS),
            stage_count: DEFAULT_STAGE_COUNT,
        }
    }
}

impl EngineConfig {
    pub fn new(
        db_path: PathBuf,
        pass_threshold: u32,
        concurrency: usize,
        check_timeout_ms: u64,
    ) -> Result<Self, ArgumentError> {
        if pass_threshold > 100 {
            return Err(ArgumentError::Invalid(format!(
                "pass threshold {pass_threshold} is above 100"
            )));
        }
        if concurrency == 0 {
            return Err(ArgumentError::Invalid("concurrency must be at least 1".to_string()));
        }
        if check_timeout_ms == 0 {
            return Err(ArgumentError::Invalid("check timeout must be at least 1 ms".to_string()));
        }
        Ok(Self {
            db_path,
            pass_threshold,
            concurrency,
            check_timeout: Duration::from_millis(check_timeout_ms),
            stage_count: DEFAULT_STAGE_COUNT,
        })
    }

    /// Govern a pipeline of `stage_count` stages instead of the default 40.
    pub fn with_stage_count(mut self, stage_count: StageNumber) -> Result<Self, ArgumentError> {
        if stage_count == 0 {
            return Err(ArgumentError::Invalid("stage count must be at least 1".to_string()));
        }
        self.stage_count = stage_count;
        Ok(self)
    }

    /// Every stage of the configured pipeline.
    #[must_use]
    pub fn all_stages(&self) -> Vec<StageNumber> {
        stage_range(self.stage_count)
    }
}

/// Options for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub stages: Vec<StageNumber>,
    pub run_type: RunType,
    pub emit_events: bool,
    pub use_registry: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            stages: stage_range(DEFAULT_STAGE_COUNT),
            run_type: RunType::Manual,
            emit_events: false,
            use_registry: true,
        }
    }
}

impl RunOptions {
    /// Build options from raw CLI values for a pipeline of `stage_count`
    /// stages.
    pub fn from_args(
        stages: Option<&str>,
        run_type: &str,
        emit_events: bool,
        no_registry: bool,
        stage_count: StageNumber,
    ) -> Result<Self, ArgumentError> {
        Ok(Self {
            stages: parse_stages(stages, stage_count)?,
            run_type: run_type.parse()?,
            emit_events,
            use_registry: !no_registry,
        })
    }
}

/// Parse `--stages`.
///
/// `None` yields `1..=stage_count`. Tokens are trimmed; duplicates are
/// dropped keeping first-seen order.
pub fn parse_stages(
    input: Option<&str>,
    stage_count: StageNumber,
) -> Result<Vec<StageNumber>, ArgumentError> {
    let Some(raw) = input else {
        return Ok(stage_range(stage_count));
    };

    let parsed = raw
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|token| {
            token
                .parse::<StageNumber>()
                .map_err(|_| ArgumentError::InvalidStage(token.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let stages = dedupe_stages(&parsed);
    validate_stages(&stages, stage_count)?;
    Ok(stages)
}

/// Drop repeated stages, keeping first-seen order.
#[must_use]
pub fn dedupe_stages(stages: &[StageNumber]) -> Vec<StageNumber> {
    let mut seen = BTreeSet::new();
    stages.iter().copied().filter(|&s| seen.insert(s)).collect()
}

/// Reject empty lists and stages outside `1..=stage_count`.
pub fn validate_stages(stages: &[StageNumber], stage_count: StageNumber) -> Result<(), ArgumentError> {
    if stages.is_empty() {
        return Err(ArgumentError::EmptyStages);
    }
    if let Some(&stage) = stages.iter().find(|&&s| s == 0 || s > stage_count) {
        return Err(ArgumentError::StageOutOfRange {
            stage,
            max: stage_count,
        });
    }
    Ok(())
}
