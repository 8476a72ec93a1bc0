//! Plans and actions - the durable, resumable task list built from an intuition.
//!
//! A Plan is the one record that outlives the process: it must serialize and
//! reload with its status, vision and per-action completion intact.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::now_ms;

/// Lifecycle of a plan.
///
/// `Draft -> Active -> {Suspended <-> Active} -> {Completed | Abandoned}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Draft,
    Active,
    Suspended,
    Completed,
    Abandoned,
}

impl PlanStatus {
    /// Returns true if no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlanStatus::Completed | PlanStatus::Abandoned)
    }

    /// Returns true while the plan still holds its vision slot
    pub fn is_live(&self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Draft => "draft",
            PlanStatus::Active => "active",
            PlanStatus::Suspended => "suspended",
            PlanStatus::Completed => "completed",
            PlanStatus::Abandoned => "abandoned",
        }
    }

    /// Parse from the lowercase name
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "draft" => Some(PlanStatus::Draft),
            "active" => Some(PlanStatus::Active),
            "suspended" => Some(PlanStatus::Suspended),
            "completed" => Some(PlanStatus::Completed),
            "abandoned" => Some(PlanStatus::Abandoned),
            _ => None,
        }
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase an action belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Prepare,
    Execute,
    Validate,
}

/// What a plan sets out to do, chosen from the source pattern's kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanIntent {
    Exploration,
    Construction,
    Expression,
}

impl PlanIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanIntent::Exploration => "exploration",
            PlanIntent::Construction => "construction",
            PlanIntent::Expression => "expression",
        }
    }
}

/// How much work a vision implies. Scales the session estimate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanComplexity {
    /// One session, few steps
    #[default]
    Simple,
    /// A couple of sessions
    Moderate,
    /// Many sessions with chained dependencies
    Complex,
}

impl PlanComplexity {
    /// Assess from the intuition's confidence and creative potential
    pub fn assess(confidence: f64, creative_potential: f64) -> Self {
        let score = confidence * creative_potential;
        if score > 0.8 {
            PlanComplexity::Complex
        } else if score > 0.6 {
            PlanComplexity::Moderate
        } else {
            PlanComplexity::Simple
        }
    }

    pub fn base_sessions(&self) -> u32 {
        match self {
            PlanComplexity::Simple => 1,
            PlanComplexity::Moderate => 2,
            PlanComplexity::Complex => 4,
        }
    }

    /// Base sessions stretched by up to half again for creative potential
    pub fn estimate_sessions(&self, creative_potential: f64) -> u32 {
        let multiplier = 1.0 + creative_potential.clamp(0.0, 1.0) * 0.5;
        ((self.base_sessions() as f64 * multiplier) as u32).max(1)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanComplexity::Simple => "simple",
            PlanComplexity::Moderate => "moderate",
            PlanComplexity::Complex => "complex",
        }
    }
}

/// One step of a plan. Only the execution tracker mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub kind: ActionKind,
    pub description: String,
    /// Ids of actions that must be complete first
    #[serde(default)]
    pub preconditions: Vec<String>,
    pub completed: bool,
    /// Unix ms
    pub completed_at: Option<i64>,
}

impl Action {
    pub fn new(id: impl Into<String>, kind: ActionKind, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            description: description.into(),
            preconditions: Vec::new(),
            completed: false,
            completed_at: None,
        }
    }

    pub fn after(mut self, action_id: impl Into<String>) -> Self {
        self.preconditions.push(action_id.into());
        self
    }

    pub(crate) fn mark_complete(&mut self, at: i64) {
        self.completed = true;
        self.completed_at = Some(at);
    }
}

/// Persistent vision context carried across sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vision {
    /// Slot key (the source pattern class)
    pub key: String,
    pub description: String,
    pub intent: PlanIntent,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Insights from later intuitions folded into this vision
    #[serde(default)]
    pub inspirations: Vec<String>,
    #[serde(default)]
    pub complexity: PlanComplexity,
    pub estimated_sessions: u32,
    #[serde(default)]
    pub success_criteria: Vec<String>,
}

/// Durable plan record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub intuition_id: String,
    /// Confidence of the originating intuition
    pub confidence: f64,
    pub vision: Vision,
    pub actions: Vec<Action>,
    pub status: PlanStatus,
    /// Process lifetimes this plan has been loaded into
    pub sessions: u32,
    /// Ledger reward granted on completion
    pub wisdom_generated: f64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Plan {
    /// Create a draft plan
    pub fn new(
        id: impl Into<String>,
        intuition_id: impl Into<String>,
        confidence: f64,
        vision: Vision,
        actions: Vec<Action>,
    ) -> Self {
        let now = now_ms();
        Self {
            id: id.into(),
            intuition_id: intuition_id.into(),
            confidence,
            vision,
            actions,
            status: PlanStatus::Draft,
            sessions: 1,
            wisdom_generated: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Update the modification timestamp
    pub fn touch(&mut self) {
        self.updated_at = now_ms();
    }

    /// Index of the next action that is pending and whose preconditions are met
    pub fn next_pending(&self) -> Option<usize> {
        self.actions.iter().position(|action| {
            !action.completed
                && action
                    .preconditions
                    .iter()
                    .all(|pre| self.actions.iter().any(|a| &a.id == pre && a.completed))
        })
    }

    pub fn completed_count(&self) -> usize {
        self.actions.iter().filter(|a| a.completed).count()
    }

    pub fn remaining_count(&self) -> usize {
        self.actions.len() - self.completed_count()
    }

    /// True once every action is complete
    pub fn all_actions_complete(&self) -> bool {
        self.actions.iter().all(|a| a.completed)
    }

    /// Notes for picking the plan up again: the next two pending actions
    pub fn next_session_preparation(&self) -> Vec<String> {
        self.actions
            .iter()
            .filter(|a| !a.completed)
            .take(2)
            .map(|a| match a.kind {
                ActionKind::Prepare => format!("prepare for: {}", a.description),
                ActionKind::Execute => format!("ready to execute: {}", a.description),
                ActionKind::Validate => format!("ready to validate: {}", a.description),
            })
            .collect()
    }

    /// Completion percentage in [0, 100]
    pub fn progress(&self) -> f64 {
        if self.actions.is_empty() {
            return 0.0;
        }
        self.completed_count() as f64 / self.actions.len() as f64 * 100.0
    }
}
