//! Signal records held by the signal stream.
//!
//! A signal carries a feature payload extracted from a merged cycle. Its
//! signature is a fingerprint of the feeling dimensions, rounded so that
//! near-identical feelings fall into the same equality class.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Named numeric features. Ordered, so equal payloads serialize identically.
pub type FeatureMap = BTreeMap<String, f64>;

/// Dimensions that make up a signature, in canonical order.
pub const FEELING_DIMENSIONS: [&str; 5] = [
    "emotional_resonance",
    "aesthetic_attraction",
    "creative_tension",
    "meaning_resonance",
    "sacred_quality",
];

/// Deterministic fingerprint of a payload's feeling dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(String);

impl Signature {
    /// Derive the signature of a payload.
    ///
    /// Only `FEELING_DIMENSIONS` participate; each is rounded to one decimal
    /// and a missing dimension counts as 0.0. Key order in the payload is
    /// irrelevant.
    pub fn derive(payload: &FeatureMap) -> Self {
        let canonical = canonical_form(payload);
        let digest = Sha256::digest(canonical.as_bytes());
        Self(hex::encode(&digest[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The rounded, `_`-joined dimension values a signature is hashed from.
pub fn canonical_form(payload: &FeatureMap) -> String {
    FEELING_DIMENSIONS
        .iter()
        .map(|dim| {
            let raw = payload.get(*dim).copied().filter(|v| v.is_finite()).unwrap_or(0.0);
            let rounded = (raw * 10.0).round() / 10.0;
            // normalise -0.0 so it hashes like 0.0
            let rounded = if rounded == 0.0 { 0.0 } else { rounded };
            format!("{:.1}", rounded)
        })
        .collect::<Vec<_>>()
        .join("_")
}

/// One entry in the signal stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    /// Insertion sequence number, unique within one stream
    pub seq: u64,
    /// Extracted features
    pub payload: FeatureMap,
    /// Fingerprint of `payload`
    pub signature: Signature,
    /// When the signal was recorded (Unix ms)
    pub timestamp: i64,
    /// Free-form context tag (catalyst source, "wisdom", ...)
    pub context: String,
}

impl SignalRecord {
    pub fn new(seq: u64, payload: FeatureMap, context: impl Into<String>, timestamp: i64) -> Self {
        let signature = Signature::derive(&payload);
        Self {
            seq,
            payload,
            signature,
            timestamp,
            context: context.into(),
        }
    }

    /// Feature value or 0.0
    pub fn feature(&self, key: &str) -> f64 {
        self.payload.get(key).copied().unwrap_or(0.0)
    }

    /// Age relative to `now` in ms (zero for records stamped in the future)
    pub fn age_ms(&self, now: i64) -> i64 {
        (now - self.timestamp).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(pairs: &[(&str, f64)]) -> FeatureMap {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_signature_deterministic() {
        let a = features(&[("emotional_resonance", 0.8), ("creative_tension", 0.3)]);
        assert_eq!(Signature::derive(&a), Signature::derive(&a.clone()));
        assert_eq!(Signature::derive(&a).as_str().len(), 16);
    }

    #[test]
    fn test_signature_order_independent() {
        let mut a = FeatureMap::new();
        a.insert("creative_tension".into(), 0.3);
        a.insert("emotional_resonance".into(), 0.8);
        let mut b = FeatureMap::new();
        b.insert("emotional_resonance".into(), 0.8);
        b.insert("creative_tension".into(), 0.3);
        assert_eq!(Signature::derive(&a), Signature::derive(&b));
    }

    #[test]
    fn test_signature_rounds_to_one_decimal() {
        let a = features(&[("aesthetic_attraction", 0.81)]);
        let b = features(&[("aesthetic_attraction", 0.79)]);
        let c = features(&[("aesthetic_attraction", 0.6)]);
        assert_eq!(Signature::derive(&a), Signature::derive(&b));
        assert_ne!(Signature::derive(&a), Signature::derive(&c));
    }

    #[test]
    fn test_signature_ignores_non_feeling_keys() {
        let a = features(&[("meaning_resonance", 0.5), ("resonance", 0.9)]);
        let b = features(&[("meaning_resonance", 0.5), ("resonance", 0.1)]);
        assert_eq!(Signature::derive(&a), Signature::derive(&b));
    }

    #[test]
    fn test_missing_dimension_equals_zero() {
        let a = features(&[("sacred_quality", 0.0)]);
        let b = FeatureMap::new();
        let c = features(&[("sacred_quality", -0.01)]);
        assert_eq!(Signature::derive(&a), Signature::derive(&b));
        assert_eq!(Signature::derive(&b), Signature::derive(&c));
    }

    #[test]
    fn test_canonical_form() {
        let a = features(&[("emotional_resonance", 0.84), ("sacred_quality", 1.0)]);
        assert_eq!(canonical_form(&a), "0.8_0.0_0.0_0.0_1.0");
    }

    #[test]
    fn test_record_age() {
        let r = SignalRecord::new(1, FeatureMap::new(), "ctx", 1_000);
        assert_eq!(r.age_ms(1_500), 500);
        assert_eq!(r.age_ms(500), 0);
        assert_eq!(r.feature("missing"), 0.0);
    }
}
