//! Tempora - a multi-frequency loop kernel with a temporal continuity engine.
//!
//! Independent processing loops run at their own rates under one
//! orchestrator, which merges their results once per master cycle. Each
//! merged state feeds a pipeline that turns repeated signals into patterns,
//! patterns into intuitions, and accepted intuitions into durable plans
//! that survive across sessions.

pub mod config;
pub mod domain;
pub mod error;
pub mod id;
pub mod kernel;
pub mod ledger;
pub mod loops;
pub mod observe;
pub mod storage;
pub mod stream;
pub mod temporal;

pub use error::{Result, TemporaError};
