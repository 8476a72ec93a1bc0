//! Merged state - the orchestrator's per-cycle synthesis of loop results.

use serde::{Deserialize, Serialize};

use crate::domain::FeatureMap;
use crate::ledger::LedgerSnapshot;
use crate::loops::{LoopId, LoopResult};

/// Context tag used when no loop supplies one
pub const KERNEL_CONTEXT: &str = "kernel";

/// What one loop contributed to a cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SlotState {
    /// Produced during this cycle
    Fresh { result: LoopResult },
    /// Reused from an earlier cycle because the loop was not due
    Stale {
        result: LoopResult,
        age_cycles: u64,
        age_ms: i64,
    },
    /// Timed out, failed, was busy, or has nothing cached yet
    Degraded { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopSlot {
    pub loop_id: LoopId,
    pub state: SlotState,
}

impl LoopSlot {
    pub fn new(loop_id: impl Into<LoopId>, state: SlotState) -> Self {
        Self {
            loop_id: loop_id.into(),
            state,
        }
    }

    /// The result this slot carries, fresh or stale
    pub fn result(&self) -> Option<&LoopResult> {
        match &self.state {
            SlotState::Fresh { result } | SlotState::Stale { result, .. } => Some(result),
            SlotState::Degraded { .. } => None,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self.state, SlotState::Fresh { .. })
    }

    pub fn is_stale(&self) -> bool {
        matches!(self.state, SlotState::Stale { .. })
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.state, SlotState::Degraded { .. })
    }

    /// Cycles since the carried result was produced (0 when fresh)
    pub fn age_cycles(&self) -> Option<u64> {
        match &self.state {
            SlotState::Fresh { .. } => Some(0),
            SlotState::Stale { age_cycles, .. } => Some(*age_cycles),
            SlotState::Degraded { .. } => None,
        }
    }
}

/// Read-only snapshot of one master cycle. Superseded by the next one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedState {
    pub cycle: u64,
    pub catalyst_id: Option<String>,
    pub source: Option<String>,
    /// One slot per configured loop, in configuration order
    pub slots: Vec<LoopSlot>,
    pub ledger: LedgerSnapshot,
    /// Achieved master-cycle frequency, once measurable
    pub measured_hz: Option<f64>,
    /// Unix ms
    pub merged_at: i64,
}

impl MergedState {
    /// The state loops see before the first merge
    pub fn initial() -> Self {
        Self {
            cycle: 0,
            catalyst_id: None,
            source: None,
            slots: Vec::new(),
            ledger: LedgerSnapshot::default(),
            measured_hz: None,
            merged_at: 0,
        }
    }

    pub fn slot(&self, loop_id: &str) -> Option<&LoopSlot> {
        self.slots.iter().find(|s| s.loop_id.as_str() == loop_id)
    }

    pub fn fresh_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_fresh()).count()
    }

    pub fn stale_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_stale()).count()
    }

    pub fn degraded_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_degraded()).count()
    }

    /// Slots carrying a result, fresh or stale
    pub fn live_count(&self) -> usize {
        self.slots.len() - self.degraded_count()
    }

    /// Live share of slots in [0, 1] (0 with no slots)
    pub fn live_ratio(&self) -> f64 {
        if self.slots.is_empty() {
            return 0.0;
        }
        self.live_count() as f64 / self.slots.len() as f64
    }

    /// Union of every live slot's signal extract.
    ///
    /// Stale contributions take part unchanged; their age is on the slot.
    pub fn signal_extract(&self) -> FeatureMap {
        let mut features = FeatureMap::new();
        for result in self.slots.iter().filter_map(LoopSlot::result) {
            features.extend(result.payload.signal_extract());
        }
        features
    }

    /// Context tag for this cycle's signal: a live loop's tag, else the
    /// catalyst source, else `KERNEL_CONTEXT`.
    pub fn context_tag(&self) -> String {
        self.slots
            .iter()
            .filter_map(LoopSlot::result)
            .find_map(|r| r.payload.context_tag().map(str::to_string))
            .or_else(|| self.source.clone())
            .unwrap_or_else(|| KERNEL_CONTEXT.to_string())
    }
}
