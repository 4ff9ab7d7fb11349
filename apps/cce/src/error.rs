//! # Errors
//!
//! Run-level error taxonomy and exit-code mapping.
//!
//! Only argument and registry errors end a run. Probe failures are absorbed
//! into the score by the dispatcher and event write failures are logged by
//! the emitter; neither reaches this type.

use cce_core::{RegistryLoadError, StageNumber, StoreError, UnknownVariant};
use thiserror::Error;

/// Process exit codes.
pub mod exit_codes {
    pub const PASS: i32 = 0;
    pub const FAILING: i32 = 1;
    pub const ARGUMENT: i32 = 2;
    pub const REGISTRY: i32 = 3;
    pub const STORE: i32 = 4;
    pub const CANCELLED: i32 = 130;
}

/// Malformed CLI or request input. Raised before the registry is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    #[error("no stages given")]
    EmptyStages,

    #[error("invalid stage '{0}': expected a positive integer")]
    InvalidStage(String),

    #[error("stage {stage} is outside 1..={max}")]
    StageOutOfRange { stage: StageNumber, max: StageNumber },

    #[error(transparent)]
    UnknownVariant(#[from] UnknownVariant),

    #[error("{0}")]
    Invalid(String),
}

/// A non-absorbed failure of an engine command.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid arguments: {0}")]
    Argument(#[from] ArgumentError),

    #[error(transparent)]
    Registry(#[from] RegistryLoadError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("run cancelled")]
    Cancelled,
}

impl EngineError {
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            EngineError::Argument(_) => exit_codes::ARGUMENT,
            EngineError::Registry(_) => exit_codes::REGISTRY,
            EngineError::Store(_) | EngineError::Io(_) | EngineError::Json(_) => exit_codes::STORE,
            EngineError::Cancelled => exit_codes::CANCELLED,
        }
    }
}

/// An audit event could not be written. Logged, never propagated.
#[derive(Debug, Error)]
#[error("failed to emit {event_type} event for run {check_id}: {reason}")]
pub struct EventEmissionError {
    pub check_id: String,
    pub event_type: String,
    pub reason: String,
}
