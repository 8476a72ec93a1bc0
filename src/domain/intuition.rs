//! Intuitions - confidence-scored insights promoted from patterns.

use serde::{Deserialize, Serialize};

use super::pattern::{Pattern, PatternKind};

/// An insight born from a pattern.
///
/// Holds the source pattern by value, so it outlives the window that
/// produced it. Confidence is fixed at birth and never recalculated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intuition {
    pub id: String,
    /// Snapshot of the originating pattern at birth
    pub pattern: Pattern,
    pub insight: String,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Creative/utility potential in [0, 1]
    pub creative_potential: f64,
    /// Unix ms
    pub created_at: i64,
    /// Distinct contexts the pattern was seen in
    pub meaning_threads: Vec<String>,
    /// Suggested directions for action
    pub action_impulses: Vec<String>,
}

impl Intuition {
    pub fn kind(&self) -> PatternKind {
        self.pattern.kind()
    }

    /// Vision slot this intuition would occupy if planned
    pub fn vision_key(&self) -> String {
        self.pattern.class.key()
    }

    /// Age relative to `now` in ms
    pub fn age_ms(&self, now: i64) -> i64 {
        (now - self.created_at).max(0)
    }
}
