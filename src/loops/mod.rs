//! Processing loops.
//!
//! Each loop is an independent worker with one `step` operation. A loop owns
//! its private state and sees the rest of the system only through the
//! read-only `StepInput` handed to it: the current catalyst and the previous
//! merged state. Loops never touch each other, the ledger or the stream.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::domain::{CycleCatalyst, FeatureMap};
use crate::error::Result;
use crate::kernel::MergedState;

pub mod awareness;
pub mod context;
pub mod resonance;
pub mod structural;

pub use awareness::AwarenessLoop;
pub use context::ContextLoop;
pub use resonance::ResonanceLoop;
pub use structural::StructuralLoop;

/// Loop identifier, unique within one orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoopId(String);

impl LoopId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LoopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LoopId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Typed output of one loop step. One variant per loop kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoopPayload {
    Awareness {
        /// Smoothed emotional resonance
        presence: f64,
        /// Share of catalyst keys not seen before
        novelty: f64,
        emotional_resonance: f64,
    },
    Structural {
        /// Catalyst key count
        complexity: usize,
        /// Live share of the previous merged state
        coherence: f64,
        creative_tension: f64,
    },
    Resonance {
        /// Smoothed resonance
        harmony: f64,
        aesthetic_attraction: f64,
        resonance: f64,
    },
    Context {
        source: String,
        /// Grows while the catalyst source stays the same
        continuity: f64,
        meaning_resonance: f64,
        sacred_quality: f64,
    },
}

impl LoopPayload {
    /// Features this payload contributes to the signal stream.
    ///
    /// Only raw catalyst-derived values take part so that equal inputs give
    /// equal signatures regardless of loop history.
    pub fn signal_extract(&self) -> FeatureMap {
        let pairs: Vec<(&str, f64)> = match self {
            LoopPayload::Awareness {
                emotional_resonance, ..
            } => vec![("emotional_resonance", *emotional_resonance)],
            LoopPayload::Structural { creative_tension, .. } => vec![("creative_tension", *creative_tension)],
            LoopPayload::Resonance {
                aesthetic_attraction,
                resonance,
                ..
            } => vec![("aesthetic_attraction", *aesthetic_attraction), ("resonance", *resonance)],
            LoopPayload::Context {
                meaning_resonance,
                sacred_quality,
                ..
            } => vec![("meaning_resonance", *meaning_resonance), ("sacred_quality", *sacred_quality)],
        };
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    /// Context tag for signals built from this payload, if it has one
    pub fn context_tag(&self) -> Option<&str> {
        match self {
            LoopPayload::Context { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// One loop's output for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopResult {
    pub loop_id: LoopId,
    pub payload: LoopPayload,
    /// Frequency the loop actually achieved, once measurable
    pub measured_hz: Option<f64>,
    /// Master cycle that produced it
    pub cycle: u64,
    /// Unix ms
    pub produced_at: i64,
}

/// Read-only input to one step.
#[derive(Debug, Clone)]
pub struct StepInput {
    pub cycle: u64,
    /// The step must finish (or give up) by this instant
    pub deadline: Instant,
    pub catalyst: Arc<CycleCatalyst>,
    pub previous: Arc<MergedState>,
}

impl StepInput {
    /// True once the deadline has passed
    pub fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// An independently scheduled worker producing one payload per step.
#[async_trait]
pub trait ProcessingLoop: Send {
    fn id(&self) -> &LoopId;

    /// Produce this cycle's payload.
    ///
    /// May suspend, but must honour `input.deadline`; the orchestrator stops
    /// waiting at the deadline and discards a late reply.
    async fn step(&mut self, input: &StepInput) -> Result<LoopPayload>;
}

/// Exponentially weighted moving average step.
pub fn ewma(previous: f64, sample: f64, alpha: f64) -> f64 {
    previous + alpha * (sample - previous)
}

/// The four standard loops, in configuration order.
pub fn standard_loops() -> Vec<Box<dyn ProcessingLoop>> {
    vec![
        Box::new(AwarenessLoop::new()),
        Box::new(StructuralLoop::new()),
        Box::new(ResonanceLoop::new()),
        Box::new(ContextLoop::new()),
    ]
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_extract_per_kind() {
        let awareness = LoopPayload::Awareness {
            presence: 0.3,
            novelty: 1.0,
            emotional_resonance: 0.8,
        };
        assert_eq!(awareness.signal_extract().get("emotional_resonance"), Some(&0.8));
        assert_eq!(awareness.signal_extract().len(), 1);

        let context = LoopPayload::Context {
            source: "sensor".into(),
            continuity: 0.5,
            meaning_resonance: 0.4,
            sacred_quality: 0.1,
        };
        assert_eq!(context.signal_extract().len(), 2);
        assert_eq!(context.context_tag(), Some("sensor"));
        assert_eq!(awareness.context_tag(), None);
    }

    #[test]
    fn test_payload_serialization_tagged() {
        let payload = LoopPayload::Structural {
            complexity: 3,
            coherence: 1.0,
            creative_tension: 0.2,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["kind"], "structural");
        let restored: LoopPayload = serde_json::from_value(json).unwrap();
        assert_eq!(restored, payload);
    }

    #[test]
    fn test_ewma() {
        assert_eq!(ewma(0.0, 1.0, 0.5), 0.5);
        assert_eq!(ewma(0.5, 0.5, 0.3), 0.5);
    }

    #[test]
    fn test_standard_loop_ids() {
        let ids: Vec<String> = standard_loops().iter().map(|l| l.id().to_string()).collect();
        assert_eq!(ids, vec!["awareness", "structural", "resonance", "context"]);
    }
}
