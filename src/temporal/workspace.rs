//! Plan builder and execution tracker.
//!
//! `PlanBuilder` turns an accepted intuition into a draft plan. The
//! `ExecutionTracker` owns every plan it has built or loaded and is the only
//! thing that mutates one. Each transition is applied to a copy, saved, and
//! only then committed in memory, so a persistence failure leaves the
//! tracked plan exactly as it was.
//!
//! ```text
//! Draft -> Active -> {Suspended <-> Active} -> {Completed | Abandoned}
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::PlanningConfig;
use crate::domain::{
    Action, ActionKind, EventRecord, Intuition, PatternKind, Plan, PlanComplexity, PlanIntent, PlanStatus, Vision,
};
use crate::error::{Result, TemporaError};
use crate::id::{generate_action_id, generate_plan_id, now_ms};
use crate::ledger::ResourceLedger;
use crate::observe::EventSink;
use crate::storage::PlanStore;

/// Decomposes intuitions into plans. Deterministic for a given intuition and id.
pub struct PlanBuilder;

impl PlanBuilder {
    /// Plan intent for a pattern kind
    pub fn intent_for(kind: PatternKind) -> PlanIntent {
        match kind {
            PatternKind::Recurring => PlanIntent::Exploration,
            PatternKind::Progression => PlanIntent::Construction,
            PatternKind::Resonance => PlanIntent::Expression,
        }
    }

    fn execute_steps(intent: PlanIntent, subject: &str) -> Vec<String> {
        match intent {
            PlanIntent::Exploration => vec![
                format!("explore {}", subject),
                "record what the exploration reveals".to_string(),
            ],
            PlanIntent::Construction => vec![
                format!("outline the structure behind {}", subject),
                "build the first piece".to_string(),
                "extend and connect the pieces".to_string(),
            ],
            PlanIntent::Expression => vec![
                format!("express {}", subject),
                "refine the expression".to_string(),
            ],
        }
    }

    /// What a finished plan should show. Longer visions add criteria.
    pub fn success_criteria(intent: PlanIntent, complexity: PlanComplexity, insight: &str) -> Vec<String> {
        let mut criteria = vec![
            format!("{} intent clearly manifested", intent.as_str()),
            format!("original insight honored: {}", insight),
        ];
        if complexity >= PlanComplexity::Moderate {
            criteria.push("progress carried intact from session to session".to_string());
        }
        if complexity >= PlanComplexity::Complex {
            criteria.push("wisdom generated through the process".to_string());
        }
        criteria
    }

    /// Build a draft plan with a fresh id
    pub fn build(intuition: &Intuition) -> Plan {
        Self::build_with_id(intuition, generate_plan_id())
    }

    /// Build a draft plan: one Prepare, the intent's Execute steps, one
    /// Validate, each step waiting on the one before it.
    pub fn build_with_id(intuition: &Intuition, plan_id: String) -> Plan {
        let intent = Self::intent_for(intuition.kind());
        let subject = &intuition.pattern.description;

        let mut steps = vec![(ActionKind::Prepare, format!("review the intuition: {}", intuition.insight))];
        steps.extend(
            Self::execute_steps(intent, subject)
                .into_iter()
                .map(|d| (ActionKind::Execute, d)),
        );
        steps.push((ActionKind::Validate, "check the result against the vision".to_string()));

        let mut actions: Vec<Action> = Vec::with_capacity(steps.len());
        for (index, (kind, description)) in steps.into_iter().enumerate() {
            let mut action = Action::new(generate_action_id(&plan_id, index), kind, description);
            if let Some(prev) = actions.last() {
                action = action.after(prev.id.clone());
            }
            actions.push(action);
        }

        let mut keywords = vec![intent.as_str().to_string(), intuition.pattern.class.key()];
        keywords.extend(intuition.meaning_threads.iter().cloned());
        keywords.dedup();

        let complexity = PlanComplexity::assess(intuition.confidence, intuition.creative_potential);
        let vision = Vision {
            key: intuition.vision_key(),
            description: intuition.insight.clone(),
            intent,
            keywords,
            inspirations: Vec::new(),
            complexity,
            estimated_sessions: complexity.estimate_sessions(intuition.creative_potential),
            success_criteria: Self::success_criteria(intent, complexity, &intuition.insight),
        };

        Plan::new(plan_id, intuition.id.clone(), intuition.confidence, vision, actions)
    }
}

/// Result of one `advance`.
#[derive(Debug, Clone, PartialEq)]
pub struct Advance {
    /// The plan after the step
    pub plan: Plan,
    /// The action completed by this step, if one was pending
    pub completed: Option<Action>,
    /// Ledger reward granted by this step (non-zero only on completion)
    pub reward: f64,
}

impl Advance {
    pub fn finished(&self) -> bool {
        self.plan.status == PlanStatus::Completed
    }
}

pub struct ExecutionTracker {
    config: PlanningConfig,
    plans: BTreeMap<String, Plan>,
    ledger: Arc<ResourceLedger>,
    store: Arc<dyn PlanStore>,
    sink: Arc<dyn EventSink>,
}

impl ExecutionTracker {
    pub fn new(
        config: &PlanningConfig,
        ledger: Arc<ResourceLedger>,
        store: Arc<dyn PlanStore>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            config: config.clone(),
            plans: BTreeMap::new(),
            ledger,
            store,
            sink,
        }
    }

    pub fn config(&self) -> &PlanningConfig {
        &self.config
    }

    pub fn get(&self, plan_id: &str) -> Option<&Plan> {
        self.plans.get(plan_id)
    }

    /// Tracked plans, oldest first
    pub fn plans(&self) -> Vec<&Plan> {
        let mut plans: Vec<&Plan> = self.plans.values().collect();
        plans.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        plans
    }

    /// Ids of active plans, oldest first
    pub fn active_ids(&self) -> Vec<String> {
        self.plans()
            .into_iter()
            .filter(|p| p.status == PlanStatus::Active)
            .map(|p| p.id.clone())
            .collect()
    }

    /// The live plan holding `vision_key`, if any
    pub fn live_plan_for(&self, vision_key: &str) -> Option<&Plan> {
        self.plans()
            .into_iter()
            .find(|p| p.status.is_live() && p.vision.key == vision_key)
    }

    fn commit(&mut self, plan: Plan) -> Result<Plan> {
        self.store.save(&plan)?;
        self.plans.insert(plan.id.clone(), plan.clone());
        Ok(plan)
    }

    /// Build a draft plan from an accepted intuition and persist it.
    pub fn build(&mut self, intuition: &Intuition) -> Result<Plan> {
        let plan = self.commit(PlanBuilder::build(intuition))?;
        tracing::info!(plan_id = %plan.id, intuition_id = %intuition.id, actions = plan.actions.len(), "plan built");
        self.sink.emit(EventRecord::plan_transition(&plan.id, "none", PlanStatus::Draft.as_str()));
        Ok(plan)
    }

    /// Bring a stored plan into this tracker, counting a new session.
    /// A plan already tracked is returned as is.
    pub fn load(&mut self, plan_id: &str) -> Result<Plan> {
        if let Some(plan) = self.plans.get(plan_id) {
            return Ok(plan.clone());
        }
        let mut plan = self.store.load(plan_id)?;
        plan.sessions += 1;
        plan.touch();
        let plan = self.commit(plan)?;
        tracing::info!(plan_id = %plan.id, status = %plan.status, sessions = plan.sessions, "plan loaded");
        Ok(plan)
    }

    /// Bring every live stored plan into this tracker.
    pub fn load_live(&mut self) -> Result<Vec<String>> {
        let mut loaded = Vec::new();
        for plan in self.store.list(None)? {
            if plan.status.is_live() && !self.plans.contains_key(&plan.id) {
                self.load(&plan.id)?;
                loaded.push(plan.id);
            }
        }
        Ok(loaded)
    }

    fn transition(&mut self, plan_id: &str, action: &str, allowed: &[PlanStatus], to: PlanStatus) -> Result<Plan> {
        self.load(plan_id)?;
        let current = self
            .plans
            .get(plan_id)
            .ok_or_else(|| TemporaError::PlanNotFound(plan_id.to_string()))?;
        let from = current.status;
        if !allowed.contains(&from) {
            return Err(TemporaError::InvalidTransition {
                plan_id: plan_id.to_string(),
                from: from.to_string(),
                action: action.to_string(),
            });
        }

        let mut next = current.clone();
        next.status = to;
        next.touch();
        let plan = self.commit(next)?;
        tracing::info!(plan_id = %plan_id, from = %from, to = %to, "plan transition");
        self.sink.emit(EventRecord::plan_transition(plan_id, from.as_str(), to.as_str()));
        Ok(plan)
    }

    /// Draft -> Active
    pub fn activate(&mut self, plan_id: &str) -> Result<Plan> {
        self.transition(plan_id, "activate", &[PlanStatus::Draft], PlanStatus::Active)
    }

    /// Active -> Suspended
    pub fn suspend(&mut self, plan_id: &str) -> Result<Plan> {
        self.transition(plan_id, "suspend", &[PlanStatus::Active], PlanStatus::Suspended)
    }

    /// Suspended -> Active. Loads the plan from the store first if needed.
    pub fn resume(&mut self, plan_id: &str) -> Result<Plan> {
        self.transition(plan_id, "resume", &[PlanStatus::Suspended], PlanStatus::Active)
    }

    /// Any live status -> Abandoned. Nothing is refunded or rewarded.
    pub fn abandon(&mut self, plan_id: &str) -> Result<Plan> {
        self.transition(
            plan_id,
            "abandon",
            &[PlanStatus::Draft, PlanStatus::Active, PlanStatus::Suspended],
            PlanStatus::Abandoned,
        )
    }

    /// Fold a later insight into a live plan's vision.
    pub fn fold_inspiration(&mut self, plan_id: &str, insight: &str) -> Result<Plan> {
        self.load(plan_id)?;
        let current = self
            .plans
            .get(plan_id)
            .ok_or_else(|| TemporaError::PlanNotFound(plan_id.to_string()))?;
        if !current.status.is_live() {
            return Err(TemporaError::InvalidTransition {
                plan_id: plan_id.to_string(),
                from: current.status.to_string(),
                action: "inspire".to_string(),
            });
        }
        if current.vision.inspirations.iter().any(|i| i == insight) {
            return Ok(current.clone());
        }
        let mut next = current.clone();
        next.vision.inspirations.push(insight.to_string());
        next.touch();
        self.commit(next)
    }

    /// Complete the next pending action of an active plan.
    ///
    /// Costs `step_cost`; a refused spend fails with `InsufficientResource`
    /// and changes nothing. Completing the last action moves the plan to
    /// Completed and rewards `reward_per_action * completed * confidence`.
    pub fn advance(&mut self, plan_id: &str) -> Result<Advance> {
        self.load(plan_id)?;
        let current = self
            .plans
            .get(plan_id)
            .ok_or_else(|| TemporaError::PlanNotFound(plan_id.to_string()))?;
        if current.status != PlanStatus::Active {
            return Err(TemporaError::InvalidTransition {
                plan_id: plan_id.to_string(),
                from: current.status.to_string(),
                action: "advance".to_string(),
            });
        }

        let mut next = current.clone();
        let Some(index) = next.next_pending() else {
            if !next.all_actions_complete() {
                tracing::warn!(plan_id = %plan_id, "no action has its preconditions met");
                return Ok(Advance {
                    plan: next,
                    completed: None,
                    reward: 0.0,
                });
            }
            // nothing left to run; close it out without a step
            return self.finish(next, None);
        };

        let cost = self.config.step_cost;
        if let Err(e) = self.ledger.spend_for("plan.step", cost) {
            self.sink.emit(EventRecord::ledger_exhausted("plan.step", cost, self.ledger.balance()));
            return Err(e);
        }

        next.actions[index].mark_complete(now_ms());
        let completed = next.actions[index].clone();
        next.touch();

        if next.all_actions_complete() {
            match self.finish(next, Some(completed)) {
                Ok(advance) => return Ok(advance),
                Err(e) => {
                    self.ledger.refund(cost);
                    return Err(e);
                }
            }
        }

        let remaining = next.remaining_count();
        if let Err(e) = self.store.save(&next) {
            self.ledger.refund(cost);
            return Err(e);
        }
        self.plans.insert(next.id.clone(), next.clone());
        tracing::debug!(plan_id = %plan_id, action_id = %completed.id, remaining, "plan step completed");
        self.sink.emit(EventRecord::plan_step_completed(plan_id, &completed.id, remaining));
        Ok(Advance {
            plan: next,
            completed: Some(completed),
            reward: 0.0,
        })
    }

    fn finish(&mut self, mut plan: Plan, completed: Option<Action>) -> Result<Advance> {
        let reward = self.config.reward_per_action * plan.completed_count() as f64 * plan.confidence;
        plan.status = PlanStatus::Completed;
        plan.wisdom_generated = reward;
        plan.touch();

        let plan = self.commit(plan)?;
        self.ledger.reward(reward);

        if let Some(action) = &completed {
            self.sink.emit(EventRecord::plan_step_completed(&plan.id, &action.id, 0));
        }
        tracing::info!(plan_id = %plan.id, reward, "plan completed");
        self.sink.emit(EventRecord::plan_transition(
            &plan.id,
            PlanStatus::Active.as_str(),
            PlanStatus::Completed.as_str(),
        ));
        Ok(Advance {
            plan,
            completed,
            reward,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FeatureMap, Pattern, PatternClass, SignalRecord, Signature};
    use crate::observe::NullSink;
    use crate::storage::MemoryPlanStore;

    fn intuition(class: PatternClass) -> Intuition {
        let members = vec![SignalRecord::new(1, FeatureMap::new(), "ctx", 1)];
        Intuition {
            id: "int-1-abcd".into(),
            pattern: Pattern {
                class,
                members,
                occurrences: 5,
                strength: 1.0,
                newest_timestamp: 1,
                description: "a recurring calm".into(),
            },
            insight: "calm returns".into(),
            confidence: 0.9,
            creative_potential: 1.0,
            created_at: 1,
            meaning_threads: vec!["ctx".into()],
            action_impulses: vec![],
        }
    }

    fn recurring() -> Intuition {
        intuition(PatternClass::Signature {
            signature: Signature::derive(&FeatureMap::new()),
        })
    }

    fn tracker(balance: f64, step_cost: f64) -> (ExecutionTracker, Arc<ResourceLedger>) {
        let ledger = Arc::new(ResourceLedger::new(balance));
        let config = PlanningConfig {
            step_cost,
            ..PlanningConfig::default()
        };
        let tracker = ExecutionTracker::new(&config, ledger.clone(), Arc::new(MemoryPlanStore::new()), Arc::new(NullSink));
        (tracker, ledger)
    }

    #[test]
    fn test_build_decomposition_by_intent() {
        let plan = PlanBuilder::build_with_id(&recurring(), "plan-1-ab12".into());
        assert_eq!(plan.vision.intent, PlanIntent::Exploration);
        assert_eq!(plan.actions.len(), 4);
        assert_eq!(plan.actions[0].kind, ActionKind::Prepare);
        assert_eq!(plan.actions[3].kind, ActionKind::Validate);
        assert_eq!(plan.actions[1].preconditions, vec!["ab12-00".to_string()]);
        assert_eq!(plan.status, PlanStatus::Draft);

        let progression = intuition(PatternClass::Progression {
            feature: "emotional_resonance".into(),
        });
        let plan = PlanBuilder::build_with_id(&progression, "plan-2-cd34".into());
        assert_eq!(plan.vision.intent, PlanIntent::Construction);
        assert_eq!(plan.actions.len(), 5);

        let plan = PlanBuilder::build_with_id(&intuition(PatternClass::Resonance), "plan-3-ef56".into());
        assert_eq!(plan.vision.intent, PlanIntent::Expression);
        assert_eq!(plan.actions.len(), 4);
    }

    #[test]
    fn test_high_potential_intuition_plans_complex_vision() {
        // 0.9 * 1.0 is above the complex cut
        let plan = PlanBuilder::build_with_id(&recurring(), "plan-1-ab12".into());
        assert_eq!(plan.vision.complexity, PlanComplexity::Complex);
        assert_eq!(plan.vision.estimated_sessions, 6);
        assert_eq!(plan.vision.success_criteria.len(), 4);
        assert_eq!(plan.vision.success_criteria[0], "exploration intent clearly manifested");

        let mut modest = recurring();
        modest.confidence = 0.6;
        modest.creative_potential = 0.4;
        let plan = PlanBuilder::build_with_id(&modest, "plan-2-cd34".into());
        assert_eq!(plan.vision.complexity, PlanComplexity::Simple);
        assert_eq!(plan.vision.estimated_sessions, 1);
        assert_eq!(plan.vision.success_criteria.len(), 2);
    }

    #[test]
    fn test_build_is_deterministic() {
        let a = PlanBuilder::build_with_id(&recurring(), "plan-1-ab12".into());
        let b = PlanBuilder::build_with_id(&recurring(), "plan-1-ab12".into());
        assert_eq!(a.actions, b.actions);
        assert_eq!(a.vision, b.vision);
    }

    #[test]
    fn test_advance_requires_active() {
        let (mut tracker, _) = tracker(100.0, 0.0);
        let plan = tracker.build(&recurring()).unwrap();
        let err = tracker.advance(&plan.id).unwrap_err();
        assert!(matches!(err, TemporaError::InvalidTransition { ref action, .. } if action == "advance"));
    }

    #[test]
    fn test_full_lifecycle_rewards_on_completion() {
        let (mut tracker, ledger) = tracker(100.0, 3.0);
        let plan = tracker.build(&recurring()).unwrap();
        tracker.activate(&plan.id).unwrap();
        for step in 1..=4 {
            let advance = tracker.advance(&plan.id).unwrap();
            assert!(advance.completed.is_some());
            assert_eq!(advance.finished(), step == 4);
        }
        let done = tracker.get(&plan.id).unwrap();
        assert_eq!(done.status, PlanStatus::Completed);
        // 100 - 4*3 + 5*4*0.9
        assert!((ledger.balance() - 106.0).abs() < 1e-9);
        assert!((done.wisdom_generated - 18.0).abs() < 1e-9);
        assert!(tracker.advance(&plan.id).is_err());
    }

    #[test]
    fn test_step_refused_by_ledger_changes_nothing() {
        let (mut tracker, ledger) = tracker(2.0, 3.0);
        let plan = tracker.build(&recurring()).unwrap();
        tracker.activate(&plan.id).unwrap();
        let err = tracker.advance(&plan.id).unwrap_err();
        assert!(err.is_resource_refusal());
        assert_eq!(tracker.get(&plan.id).unwrap().completed_count(), 0);
        assert_eq!(ledger.balance(), 2.0);
    }

    #[test]
    fn test_suspend_resume_and_abandon() {
        let (mut tracker, ledger) = tracker(100.0, 0.0);
        let plan = tracker.build(&recurring()).unwrap();
        assert!(tracker.suspend(&plan.id).is_err());
        tracker.activate(&plan.id).unwrap();
        tracker.advance(&plan.id).unwrap();
        tracker.suspend(&plan.id).unwrap();
        assert!(tracker.advance(&plan.id).is_err());
        let resumed = tracker.resume(&plan.id).unwrap();
        assert_eq!(resumed.completed_count(), 1);
        let abandoned = tracker.abandon(&plan.id).unwrap();
        assert_eq!(abandoned.status, PlanStatus::Abandoned);
        assert!(tracker.resume(&plan.id).is_err());
        assert_eq!(ledger.balance(), 100.0);
    }

    #[test]
    fn test_live_plan_for_vision_and_fold() {
        let (mut tracker, _) = tracker(100.0, 0.0);
        let first = recurring();
        let plan = tracker.build(&first).unwrap();
        let holder = tracker.live_plan_for(&first.vision_key()).unwrap().id.clone();
        assert_eq!(holder, plan.id);

        let folded = tracker.fold_inspiration(&plan.id, "calm returns again").unwrap();
        assert_eq!(folded.vision.inspirations, vec!["calm returns again".to_string()]);
        // same insight twice is recorded once
        let folded = tracker.fold_inspiration(&plan.id, "calm returns again").unwrap();
        assert_eq!(folded.vision.inspirations.len(), 1);

        tracker.abandon(&plan.id).unwrap();
        assert!(tracker.live_plan_for(&first.vision_key()).is_none());
    }

    #[test]
    fn test_unknown_plan() {
        let (mut tracker, _) = tracker(100.0, 0.0);
        assert!(matches!(tracker.activate("plan-x"), Err(TemporaError::PlanNotFound(_))));
    }
}
