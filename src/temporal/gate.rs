//! Choice gate - the owning process's say over which intuitions get planned.
//!
//! The pipeline never decides on its own: every intuition goes through a
//! `ChoiceGate` supplied at construction. Deferred intuitions wait in a
//! bounded `DeferredQueue` and are offered again on later passes until their
//! window runs out.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::Intuition;

/// Outcome of a gate decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// Plan it now
    Accept,
    /// Not now; offer it again while its window lasts
    Defer,
    /// Discard permanently
    Reject,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Accept => "accept",
            Decision::Defer => "defer",
            Decision::Reject => "reject",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the gate knows besides the intuition itself.
#[derive(Debug, Clone, PartialEq)]
pub struct GateContext {
    /// Live plan already holding this intuition's vision slot, if any.
    /// Accepting then folds the insight into that plan.
    pub competing_plan: Option<String>,
    pub ledger_balance: f64,
    /// Times this intuition was deferred before
    pub deferrals: u32,
    /// Unix ms
    pub now: i64,
}

/// Policy hook deciding whether an intuition enters planning.
pub trait ChoiceGate: Send + Sync {
    fn decide(&self, intuition: &Intuition, ctx: &GateContext) -> Decision;
}

impl<F> ChoiceGate for F
where
    F: Fn(&Intuition, &GateContext) -> Decision + Send + Sync,
{
    fn decide(&self, intuition: &Intuition, ctx: &GateContext) -> Decision {
        self(intuition, ctx)
    }
}

/// Confidence-threshold policy.
///
/// Accepts at or above `accept_above`, defers at or above `defer_above`
/// (when set), rejects the rest. An intuition whose vision slot is taken
/// is deferred instead of accepted when `yield_to_live_plans` is set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdGate {
    pub accept_above: f64,
    pub defer_above: Option<f64>,
    pub yield_to_live_plans: bool,
}

impl ThresholdGate {
    pub fn new(accept_above: f64) -> Self {
        Self {
            accept_above,
            defer_above: None,
            yield_to_live_plans: false,
        }
    }

    pub fn with_defer_above(mut self, defer_above: f64) -> Self {
        self.defer_above = Some(defer_above);
        self
    }

    pub fn yielding(mut self) -> Self {
        self.yield_to_live_plans = true;
        self
    }
}

impl ChoiceGate for ThresholdGate {
    fn decide(&self, intuition: &Intuition, ctx: &GateContext) -> Decision {
        if intuition.confidence >= self.accept_above {
            if self.yield_to_live_plans && ctx.competing_plan.is_some() {
                return Decision::Defer;
            }
            return Decision::Accept;
        }
        match self.defer_above {
            Some(floor) if intuition.confidence >= floor => Decision::Defer,
            _ => Decision::Reject,
        }
    }
}

/// An intuition waiting for another chance at the gate.
#[derive(Debug, Clone, PartialEq)]
pub struct Deferred {
    pub intuition: Intuition,
    /// When it was first deferred (Unix ms)
    pub deferred_at: i64,
    pub deferrals: u32,
}

/// Bounded, time-limited holding area for deferred intuitions.
#[derive(Debug)]
pub struct DeferredQueue {
    entries: VecDeque<Deferred>,
    window_ms: i64,
    capacity: usize,
}

impl DeferredQueue {
    pub fn new(window_ms: u64, capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            window_ms: window_ms.min(i64::MAX as u64) as i64,
            capacity,
        }
    }

    /// Queue an entry. Returns whatever had to make room: the oldest entry
    /// when full, or the entry itself when the capacity is zero.
    pub fn push(&mut self, entry: Deferred) -> Option<Deferred> {
        if self.capacity == 0 {
            return Some(entry);
        }
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(entry);
        evicted
    }

    /// Remove and return entries whose window has passed.
    pub fn expire(&mut self, now: i64) -> Vec<Deferred> {
        let window = self.window_ms;
        let (expired, kept): (Vec<Deferred>, Vec<Deferred>) =
            self.entries.drain(..).partition(|d| now - d.deferred_at > window);
        self.entries = kept.into();
        expired
    }

    /// Take everything still waiting, oldest first.
    pub fn take_all(&mut self) -> Vec<Deferred> {
        self.entries.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Deferred> {
        self.entries.iter()
    }
}
