//! Patterns detected across the signal window.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::signal::{Signature, SignalRecord};

/// Broad family a pattern belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// The same signature recurring within the window
    Recurring,
    /// A feature trending steadily up or down
    Progression,
    /// High resonance sustained over recent signals
    Resonance,
}

/// Identity of a pattern. Two detections with the same class describe the
/// same underlying pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum PatternClass {
    Signature { signature: Signature },
    Progression { feature: String },
    Resonance,
}

impl PatternClass {
    pub fn kind(&self) -> PatternKind {
        match self {
            PatternClass::Signature { .. } => PatternKind::Recurring,
            PatternClass::Progression { .. } => PatternKind::Progression,
            PatternClass::Resonance => PatternKind::Resonance,
        }
    }

    /// Stable string key, used for vision slots
    pub fn key(&self) -> String {
        match self {
            PatternClass::Signature { signature } => format!("signature:{}", signature),
            PatternClass::Progression { feature } => format!("progression:{}", feature),
            PatternClass::Resonance => "resonance".to_string(),
        }
    }
}

impl fmt::Display for PatternClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// A scored cluster of recent signals sharing a class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub class: PatternClass,
    /// Member records, most recent first, capped
    pub members: Vec<SignalRecord>,
    /// Total matching records in the window (may exceed `members.len()`)
    pub occurrences: usize,
    /// Strength in [0, 1]
    pub strength: f64,
    /// Timestamp of the newest member (Unix ms)
    pub newest_timestamp: i64,
    pub description: String,
}

impl Pattern {
    pub fn kind(&self) -> PatternKind {
        self.class.kind()
    }

    /// Distinct member context tags, in first-seen order
    pub fn contexts(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for member in &self.members {
            if !seen.contains(&member.context) {
                seen.push(member.context.clone());
            }
        }
        seen
    }

    /// Mean of a feature across members (0.0 when there are none)
    pub fn mean_feature(&self, key: &str) -> f64 {
        if self.members.is_empty() {
            return 0.0;
        }
        self.members.iter().map(|m| m.feature(key)).sum::<f64>() / self.members.len() as f64
    }
}
