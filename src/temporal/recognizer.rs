//! Pattern recognizer.
//!
//! `detect` groups the window by signature and scores every class seen at
//! least K times. `deepen` looks for trends the signature grouping cannot
//! see: a steady progression in emotional resonance and sustained high
//! resonance. Both are pure functions of the window handed to them; the
//! ledger cost of deepening is paid by the caller.

use std::collections::HashMap;

use crate::config::PatternConfig;
use crate::domain::{Pattern, PatternClass, SignalRecord, Signature};

/// Feature watched for progressions
pub const PROGRESSION_FEATURE: &str = "emotional_resonance";
/// Feature averaged for sustained resonance
pub const RESONANCE_FEATURE: &str = "resonance";
/// Share of steps that must move one way for a trend
pub const TREND_MAJORITY: f64 = 0.6;

#[derive(Debug, Clone)]
pub struct PatternRecognizer {
    config: PatternConfig,
}

/// Sort strongest first; equal strengths go to the class with the later
/// newest member, then by class key so the order is total.
pub fn rank_patterns(patterns: &mut [Pattern]) {
    patterns.sort_by(|a, b| {
        b.strength
            .total_cmp(&a.strength)
            .then_with(|| b.newest_timestamp.cmp(&a.newest_timestamp))
            .then_with(|| a.class.key().cmp(&b.class.key()))
    });
}

fn newest_first(records: &mut [&SignalRecord]) {
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.seq.cmp(&a.seq)));
}

impl PatternRecognizer {
    pub fn new(config: &PatternConfig) -> Self {
        Self { config: config.clone() }
    }

    pub fn config(&self) -> &PatternConfig {
        &self.config
    }

    /// Strength for a class seen `count` times
    pub fn strength_for(&self, count: usize) -> f64 {
        (count as f64 / self.config.saturation_count.max(1) as f64).min(1.0)
    }

    fn assemble(&self, class: PatternClass, mut members: Vec<&SignalRecord>, strength: f64, description: String) -> Pattern {
        newest_first(&mut members);
        let occurrences = members.len();
        let newest_timestamp = members.first().map(|m| m.timestamp).unwrap_or(0);
        Pattern {
            class,
            members: members.into_iter().take(self.config.member_cap).cloned().collect(),
            occurrences,
            strength,
            newest_timestamp,
            description,
        }
    }

    /// Recurring-signature patterns in `window`, ranked.
    pub fn detect(&self, window: &[SignalRecord]) -> Vec<Pattern> {
        let mut classes: HashMap<&Signature, Vec<&SignalRecord>> = HashMap::new();
        for record in window {
            classes.entry(&record.signature).or_default().push(record);
        }

        let mut patterns: Vec<Pattern> = classes
            .into_iter()
            .filter(|(_, members)| members.len() >= self.config.min_occurrences)
            .map(|(signature, members)| {
                let count = members.len();
                let description = format!("signature {} recurred {} times", signature, count);
                self.assemble(
                    PatternClass::Signature {
                        signature: signature.clone(),
                    },
                    members,
                    self.strength_for(count),
                    description,
                )
            })
            .collect();

        rank_patterns(&mut patterns);
        patterns
    }

    /// Progression and sustained-resonance patterns over the newest
    /// `progression_window` records, ranked.
    pub fn deepen(&self, window: &[SignalRecord]) -> Vec<Pattern> {
        let span = self.config.progression_window;
        let mut recent: Vec<&SignalRecord> = window.iter().collect();
        if recent.len() < span {
            return Vec::new();
        }
        newest_first(&mut recent);
        recent.truncate(span);

        let mut patterns = Vec::new();
        if let Some(p) = self.progression(&recent) {
            patterns.push(p);
        }
        if let Some(p) = self.sustained_resonance(&recent) {
            patterns.push(p);
        }
        rank_patterns(&mut patterns);
        patterns
    }

    fn progression(&self, recent: &[&SignalRecord]) -> Option<Pattern> {
        // oldest first for trend direction
        let values: Vec<f64> = recent.iter().rev().map(|r| r.feature(PROGRESSION_FEATURE)).collect();
        let steps = values.len().checked_sub(1).filter(|s| *s > 0)? as f64;
        let ups = values.windows(2).filter(|w| w[1] > w[0]).count() as f64;
        let downs = values.windows(2).filter(|w| w[1] < w[0]).count() as f64;
        let direction = if ups / steps > TREND_MAJORITY {
            "rising"
        } else if downs / steps > TREND_MAJORITY {
            "falling"
        } else {
            return None;
        };

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let strength = (2.0 * variance).min(1.0);
        if strength <= 0.0 {
            return None;
        }

        Some(self.assemble(
            PatternClass::Progression {
                feature: PROGRESSION_FEATURE.to_string(),
            },
            recent.to_vec(),
            strength,
            format!("{} {} over {} signals", PROGRESSION_FEATURE, direction, recent.len()),
        ))
    }

    fn sustained_resonance(&self, recent: &[&SignalRecord]) -> Option<Pattern> {
        let mean = recent.iter().map(|r| r.feature(RESONANCE_FEATURE)).sum::<f64>() / recent.len() as f64;
        if mean <= self.config.resonance_floor {
            return None;
        }
        Some(self.assemble(
            PatternClass::Resonance,
            recent.to_vec(),
            mean.min(1.0),
            format!("resonance sustained at {:.2} over {} signals", mean, recent.len()),
        ))
    }
}
