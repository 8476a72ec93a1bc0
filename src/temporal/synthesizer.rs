//! Intuition synthesizer - promotes strong patterns into intuitions.
//!
//! Birth is ledger-gated: it costs `cost_per_record` per source record and,
//! once paid, rewards the ledger in proportion to the new intuition's
//! confidence. A refused birth leaves no trace besides the ledger's refusal
//! counter.

use std::sync::Arc;

use crate::config::IntuitionConfig;
use crate::domain::{Intuition, Pattern, PatternClass, PatternKind};
use crate::error::{Result, TemporaError};
use crate::id::{generate_intuition_id, now_ms};
use crate::ledger::ResourceLedger;

pub struct IntuitionSynthesizer {
    config: IntuitionConfig,
    ledger: Arc<ResourceLedger>,
}

/// Bonus added to creative potential per pattern kind
pub fn kind_bonus(kind: PatternKind) -> f64 {
    match kind {
        PatternKind::Recurring => 0.2,
        PatternKind::Progression => 0.1,
        PatternKind::Resonance => 0.0,
    }
}

/// Share of distinct contexts among members, in [0, 1].
///
/// 0 when every member shares one context, 1 when no two do.
pub fn context_diversity(pattern: &Pattern) -> f64 {
    let members = pattern.members.len();
    if members < 2 {
        return 0.0;
    }
    (pattern.contexts().len() - 1) as f64 / (members - 1) as f64
}

/// Creative potential heuristic:
/// `strength*0.8 + kind bonus + mean creative_tension*0.2 + context diversity*0.1`, capped at 1.
pub fn creative_potential(pattern: &Pattern) -> f64 {
    let tension = pattern.mean_feature("creative_tension").clamp(0.0, 1.0);
    let score = pattern.strength * 0.8 + kind_bonus(pattern.kind()) + tension * 0.2 + context_diversity(pattern) * 0.1;
    score.clamp(0.0, 1.0)
}

fn insight_for(pattern: &Pattern) -> String {
    match &pattern.class {
        PatternClass::Signature { signature } => {
            format!("The feeling {} keeps returning ({} times)", signature, pattern.occurrences)
        }
        PatternClass::Progression { feature } => {
            format!("{} is moving steadily: {}", feature, pattern.description)
        }
        PatternClass::Resonance => format!("Resonance is holding: {}", pattern.description),
    }
}

fn impulses_for(kind: PatternKind) -> Vec<String> {
    let impulses: &[&str] = match kind {
        PatternKind::Recurring => &["explore what keeps returning", "name the recurring feeling"],
        PatternKind::Progression => &["follow the trend", "build on the momentum"],
        PatternKind::Resonance => &["express what resonates", "share the resonance"],
    };
    impulses.iter().map(|s| s.to_string()).collect()
}

impl IntuitionSynthesizer {
    pub fn new(config: &IntuitionConfig, ledger: Arc<ResourceLedger>) -> Self {
        Self {
            config: config.clone(),
            ledger,
        }
    }

    pub fn config(&self) -> &IntuitionConfig {
        &self.config
    }

    /// True if `pattern` is strong enough to be born
    pub fn eligible(&self, pattern: &Pattern) -> bool {
        pattern.strength >= self.config.threshold
    }

    /// Ledger cost of birthing `pattern`
    pub fn birth_cost(&self, pattern: &Pattern) -> f64 {
        self.config.cost_per_record * pattern.occurrences as f64
    }

    /// Confidence of an intuition born from a pattern of `strength`
    pub fn confidence_for(&self, strength: f64) -> f64 {
        (strength * self.config.dampening).clamp(0.0, 1.0)
    }

    /// Promote `pattern` into an intuition stamped now.
    pub fn birth(&self, pattern: &Pattern) -> Result<Intuition> {
        self.birth_at(pattern, now_ms())
    }

    /// Promote `pattern` into an intuition stamped `at`.
    ///
    /// Fails with `BelowThreshold` (nothing spent) when the pattern is too
    /// weak and with `InsufficientResource` when the ledger refuses the cost.
    pub fn birth_at(&self, pattern: &Pattern, at: i64) -> Result<Intuition> {
        if !self.eligible(pattern) {
            return Err(TemporaError::BelowThreshold {
                strength: pattern.strength,
                threshold: self.config.threshold,
            });
        }

        let cost = self.birth_cost(pattern);
        self.ledger.spend_for("intuition.birth", cost)?;

        let confidence = self.confidence_for(pattern.strength);
        let intuition = Intuition {
            id: generate_intuition_id(),
            pattern: pattern.clone(),
            insight: insight_for(pattern),
            confidence,
            creative_potential: creative_potential(pattern),
            created_at: at,
            meaning_threads: pattern.contexts(),
            action_impulses: impulses_for(pattern.kind()),
        };

        self.ledger.reward(self.config.reward * confidence);
        tracing::debug!(
            intuition_id = %intuition.id,
            class = %pattern.class,
            confidence,
            cost,
            "intuition born"
        );
        Ok(intuition)
    }
}
