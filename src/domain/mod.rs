//! Domain types for Tempora
//!
//! This module contains the core records that flow through the kernel:
//! - CycleCatalyst: immutable input to one master cycle
//! - SignalRecord: a fingerprinted entry in the signal stream
//! - Pattern: a scored cluster of recent signals
//! - Intuition: a confidence-scored insight born from a pattern
//! - Plan / Action: the durable, resumable task list built from an intuition
//! - EventRecord: structured observability records

pub mod catalyst;
pub mod event;
pub mod intuition;
pub mod pattern;
pub mod plan;
pub mod signal;

pub use catalyst::CycleCatalyst;
pub use event::{EventRecord, event_types};
pub use intuition::Intuition;
pub use pattern::{Pattern, PatternClass, PatternKind};
pub use plan::{Action, ActionKind, Plan, PlanComplexity, PlanIntent, PlanStatus, Vision};
pub use signal::{FEELING_DIMENSIONS, FeatureMap, Signature, SignalRecord};
