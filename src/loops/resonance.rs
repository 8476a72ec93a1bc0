//! Resonance loop - aesthetic attraction and a smoothed harmony level.

use async_trait::async_trait;

use super::{LoopId, LoopPayload, ProcessingLoop, StepInput, ewma};
use crate::error::Result;

const HARMONY_ALPHA: f64 = 0.2;

pub struct ResonanceLoop {
    id: LoopId,
    harmony: f64,
}

impl ResonanceLoop {
    pub fn new() -> Self {
        Self {
            id: LoopId::from("resonance"),
            harmony: 0.0,
        }
    }
}

impl Default for ResonanceLoop {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessingLoop for ResonanceLoop {
    fn id(&self) -> &LoopId {
        &self.id
    }

    async fn step(&mut self, input: &StepInput) -> Result<LoopPayload> {
        let catalyst = &input.catalyst;
        let aesthetic_attraction = catalyst.unit_feature("aesthetic_attraction", 0.0);
        let resonance = catalyst.unit_feature("resonance", 0.0);
        self.harmony = ewma(self.harmony, resonance, HARMONY_ALPHA);
        Ok(LoopPayload::Resonance {
            harmony: self.harmony,
            aesthetic_attraction,
            resonance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loops::testing::input;
    use serde_json::json;

    #[tokio::test]
    async fn test_harmony_smooths_resonance() {
        let mut resonance = ResonanceLoop::new();
        let step = input(1, &[("resonance", json!(1.0)), ("aesthetic_attraction", json!(0.6))]);
        resonance.step(&step).await.unwrap();
        let payload = resonance.step(&step).await.unwrap();
        match payload {
            LoopPayload::Resonance {
                harmony,
                aesthetic_attraction,
                resonance,
            } => {
                assert!((harmony - 0.36).abs() < 1e-9);
                assert_eq!(aesthetic_attraction, 0.6);
                assert_eq!(resonance, 1.0);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_features_default_to_zero() {
        let mut resonance = ResonanceLoop::new();
        let payload = resonance.step(&input(1, &[])).await.unwrap();
        let extract = payload.signal_extract();
        assert_eq!(extract["resonance"], 0.0);
        assert_eq!(extract["aesthetic_attraction"], 0.0);
    }
}
