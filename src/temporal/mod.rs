//! Temporal continuity engine.
//!
//! Turns short-lived, repeated signals into durable plans:
//! signal stream -> pattern recognizer -> intuition synthesizer -> choice
//! gate -> plan builder / execution tracker.

pub mod gate;
pub mod pipeline;
pub mod recognizer;
pub mod synthesizer;
pub mod workspace;

pub use gate::{ChoiceGate, Decision, Deferred, DeferredQueue, GateContext, ThresholdGate};
pub use pipeline::{PassReport, TemporalPipeline, WISDOM_CONTEXT};
pub use recognizer::{PatternRecognizer, rank_patterns};
pub use synthesizer::{IntuitionSynthesizer, creative_potential};
pub use workspace::{Advance, ExecutionTracker, PlanBuilder};
