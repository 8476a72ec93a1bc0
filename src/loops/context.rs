//! Context loop - where catalysts come from and what they mean.

use async_trait::async_trait;

use super::{LoopId, LoopPayload, ProcessingLoop, StepInput};
use crate::error::Result;

const CONTINUITY_STEP: f64 = 0.1;

pub struct ContextLoop {
    id: LoopId,
    last_source: Option<String>,
    continuity: f64,
}

impl ContextLoop {
    pub fn new() -> Self {
        Self {
            id: LoopId::from("context"),
            last_source: None,
            continuity: 0.0,
        }
    }
}

impl Default for ContextLoop {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessingLoop for ContextLoop {
    fn id(&self) -> &LoopId {
        &self.id
    }

    async fn step(&mut self, input: &StepInput) -> Result<LoopPayload> {
        let catalyst = &input.catalyst;
        let source = catalyst.source().to_string();

        self.continuity = if self.last_source.as_deref() == Some(source.as_str()) {
            (self.continuity + CONTINUITY_STEP).min(1.0)
        } else {
            0.0
        };
        self.last_source = Some(source.clone());

        Ok(LoopPayload::Context {
            source,
            continuity: self.continuity,
            meaning_resonance: catalyst.unit_feature("meaning_resonance", 0.0),
            sacred_quality: catalyst.unit_feature("sacred_quality", 0.0),
        })
    }
}
