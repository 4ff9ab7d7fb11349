//! # CCE Library
//!
//! This library exposes the engine's runtime modules for testing and
//! integration.
//!
//! The main binary uses these modules through the `main.rs` entry point.

pub mod api;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod dispatcher;
pub mod emitter;
pub mod error;
pub mod logging;

// Re-export cce_core for convenience
pub use cce_core;
