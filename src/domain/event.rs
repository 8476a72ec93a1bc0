//! Event record types for observability.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::id::{generate_event_id, now_ms};

/// Event type constants
pub mod event_types {
    pub const RHYTHM_DEGRADED: &str = "rhythm.degraded";
    pub const RHYTHM_RESTORED: &str = "rhythm.restored";
    pub const LOOP_DEGRADED: &str = "loop.degraded";
    pub const LEDGER_EXHAUSTED: &str = "ledger.exhausted";
    pub const SIGNAL_REFUSED: &str = "signal.refused";
    pub const PATTERN_DETECTED: &str = "pattern.detected";
    pub const INTUITION_BORN: &str = "intuition.born";
    pub const INTUITION_DECIDED: &str = "intuition.decided";
    pub const INTUITION_EXPIRED: &str = "intuition.expired";
    pub const PLAN_TRANSITION: &str = "plan.transition";
    pub const PLAN_STEP_COMPLETED: &str = "plan.step_completed";
    pub const STATE_DROPPED: &str = "kernel.state_dropped";
}

/// Structured record handed to the observability sink.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventRecord {
    /// Unique event identifier
    pub id: String,
    /// Event type (e.g., "rhythm.degraded", "plan.transition")
    pub event_type: String,
    /// Loop, intuition or plan the event concerns (if any)
    pub subject: Option<String>,
    /// Event-specific payload data
    pub payload: Value,
    /// Unix timestamp in milliseconds
    pub created_at: i64,
}

impl EventRecord {
    /// Create a new event with the given type and payload
    pub fn new(event_type: &str, subject: Option<String>, payload: Value) -> Self {
        Self {
            id: generate_event_id(),
            event_type: event_type.to_string(),
            subject,
            payload,
            created_at: now_ms(),
        }
    }

    /// Master cycle rate stayed below the critical threshold
    pub fn rhythm_degraded(measured_hz: f64, critical_hz: f64, consecutive: u32) -> Self {
        Self::new(
            event_types::RHYTHM_DEGRADED,
            None,
            json!({
                "measured_hz": measured_hz,
                "critical_hz": critical_hz,
                "consecutive_cycles": consecutive
            }),
        )
    }

    /// Master cycle rate recovered after a degraded episode
    pub fn rhythm_restored(measured_hz: f64) -> Self {
        Self::new(
            event_types::RHYTHM_RESTORED,
            None,
            json!({ "measured_hz": measured_hz }),
        )
    }

    /// A loop's slot was marked degraded for a cycle
    pub fn loop_degraded(loop_id: &str, cycle: u64, reason: &str) -> Self {
        Self::new(
            event_types::LOOP_DEGRADED,
            Some(loop_id.to_string()),
            json!({ "cycle": cycle, "reason": reason }),
        )
    }

    /// A gated operation was skipped for lack of balance
    pub fn ledger_exhausted(operation: &str, required: f64, available: f64) -> Self {
        Self::new(
            event_types::LEDGER_EXHAUSTED,
            None,
            json!({
                "operation": operation,
                "required": required,
                "available": available
            }),
        )
    }

    /// The signal stream refused an append
    pub fn signal_refused(context: &str, cost: f64) -> Self {
        Self::new(
            event_types::SIGNAL_REFUSED,
            None,
            json!({ "context": context, "cost": cost }),
        )
    }

    pub fn pattern_detected(class: &str, strength: f64, occurrences: usize) -> Self {
        Self::new(
            event_types::PATTERN_DETECTED,
            Some(class.to_string()),
            json!({ "strength": strength, "occurrences": occurrences }),
        )
    }

    pub fn intuition_born(intuition_id: &str, confidence: f64, creative_potential: f64) -> Self {
        Self::new(
            event_types::INTUITION_BORN,
            Some(intuition_id.to_string()),
            json!({
                "confidence": confidence,
                "creative_potential": creative_potential
            }),
        )
    }

    pub fn intuition_decided(intuition_id: &str, decision: &str) -> Self {
        Self::new(
            event_types::INTUITION_DECIDED,
            Some(intuition_id.to_string()),
            json!({ "decision": decision }),
        )
    }

    /// A deferred intuition left its retry window unclaimed
    pub fn intuition_expired(intuition_id: &str) -> Self {
        Self::new(
            event_types::INTUITION_EXPIRED,
            Some(intuition_id.to_string()),
            Value::Null,
        )
    }

    pub fn plan_transition(plan_id: &str, from: &str, to: &str) -> Self {
        Self::new(
            event_types::PLAN_TRANSITION,
            Some(plan_id.to_string()),
            json!({ "from": from, "to": to }),
        )
    }

    pub fn plan_step_completed(plan_id: &str, action_id: &str, remaining: usize) -> Self {
        Self::new(
            event_types::PLAN_STEP_COMPLETED,
            Some(plan_id.to_string()),
            json!({ "action_id": action_id, "remaining": remaining }),
        )
    }

    /// A pending merged state was replaced before the pipeline took it
    pub fn state_dropped(cycle: u64) -> Self {
        Self::new(
            event_types::STATE_DROPPED,
            None,
            json!({ "cycle": cycle }),
        )
    }

    /// Check if this event concerns a plan
    pub fn is_plan_event(&self) -> bool {
        self.event_type.starts_with("plan.")
    }
}
