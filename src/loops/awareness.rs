//! Awareness loop - tracks emotional presence and catalyst novelty.

use std::collections::HashSet;

use async_trait::async_trait;

use super::{LoopId, LoopPayload, ProcessingLoop, StepInput, ewma};
use crate::error::Result;

const PRESENCE_ALPHA: f64 = 0.3;

pub struct AwarenessLoop {
    id: LoopId,
    presence: f64,
    seen_keys: HashSet<String>,
    steps: u64,
}

impl AwarenessLoop {
    pub fn new() -> Self {
        Self {
            id: LoopId::from("awareness"),
            presence: 0.0,
            seen_keys: HashSet::new(),
            steps: 0,
        }
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }
}

impl Default for AwarenessLoop {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessingLoop for AwarenessLoop {
    fn id(&self) -> &LoopId {
        &self.id
    }

    async fn step(&mut self, input: &StepInput) -> Result<LoopPayload> {
        let catalyst = &input.catalyst;
        let emotional_resonance = catalyst.unit_feature("emotional_resonance", 0.0);

        let keys = catalyst.payload().keys();
        let total = keys.len();
        let fresh = keys.filter(|k| self.seen_keys.insert((*k).clone())).count();
        let novelty = if total == 0 { 0.0 } else { fresh as f64 / total as f64 };

        self.presence = ewma(self.presence, emotional_resonance, PRESENCE_ALPHA);
        self.steps += 1;

        Ok(LoopPayload::Awareness {
            presence: self.presence,
            novelty,
            emotional_resonance,
        })
    }
}
