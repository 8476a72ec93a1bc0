//! Structural loop - measures catalyst shape and how much of the previous
//! cycle held together.

use async_trait::async_trait;

use super::{LoopId, LoopPayload, ProcessingLoop, StepInput};
use crate::error::Result;

pub struct StructuralLoop {
    id: LoopId,
    steps: u64,
}

impl StructuralLoop {
    pub fn new() -> Self {
        Self {
            id: LoopId::from("structural"),
            steps: 0,
        }
    }
}

impl Default for StructuralLoop {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessingLoop for StructuralLoop {
    fn id(&self) -> &LoopId {
        &self.id
    }

    async fn step(&mut self, input: &StepInput) -> Result<LoopPayload> {
        self.steps += 1;
        let previous = &input.previous;
        // nothing merged yet counts as fully coherent
        let coherence = if previous.slots.is_empty() { 1.0 } else { previous.live_ratio() };
        Ok(LoopPayload::Structural {
            complexity: input.catalyst.len(),
            coherence,
            creative_tension: input.catalyst.unit_feature("creative_tension", 0.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{LoopSlot, MergedState, SlotState};
    use crate::loops::testing::{input, input_from};
    use serde_json::json;

    #[tokio::test]
    async fn test_structural_step() {
        let mut structural = StructuralLoop::new();
        let payload = structural
            .step(&input(1, &[("creative_tension", json!(0.4)), ("x", json!(1))]))
            .await
            .unwrap();
        assert_eq!(
            payload,
            LoopPayload::Structural {
                complexity: 2,
                coherence: 1.0,
                creative_tension: 0.4,
            }
        );
    }

    #[tokio::test]
    async fn test_coherence_follows_previous_state() {
        let mut previous = MergedState::initial();
        previous.slots = vec![
            LoopSlot::new("awareness", SlotState::Degraded { reason: "busy".into() }),
            LoopSlot::new("context", SlotState::Degraded { reason: "deadline exceeded".into() }),
        ];
        let mut structural = StructuralLoop::new();
        let payload = structural.step(&input_from(2, "test", &[], previous)).await.unwrap();
        assert!(matches!(payload, LoopPayload::Structural { coherence, .. } if coherence == 0.0));
    }
}
