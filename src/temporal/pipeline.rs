//! Post-merge pipeline.
//!
//! One pass per merged state:
//! 1. append the state's signal extract to the stream (ledger-gated)
//! 2. detect patterns, deepening every `deepen_interval_cycles` passes
//! 3. birth intuitions from patterns at or above the threshold
//! 4. offer new and deferred intuitions to the choice gate
//! 5. build plans for accepted intuitions and advance active plans
//!
//! A merged state with no live signal skips steps 1-3 only. Ledger
//! refusals skip the affected step for this pass and surface as events.
//! Persistence failures are returned to the caller; offers the gate has
//! not settled by then wait in the deferred queue for the next pass.

use std::collections::HashSet;
use std::sync::Arc;

use crate::config::Config;
use crate::domain::{EventRecord, FeatureMap, Intuition, Pattern, PatternClass, Plan};
use crate::error::{Result, TemporaError};
use crate::kernel::MergedState;
use crate::ledger::ResourceLedger;
use crate::observe::EventSink;
use crate::storage::PlanStore;
use crate::stream::SignalStream;

use super::gate::{ChoiceGate, Decision, Deferred, DeferredQueue, GateContext};
use super::recognizer::{PatternRecognizer, rank_patterns};
use super::synthesizer::IntuitionSynthesizer;
use super::workspace::ExecutionTracker;

/// Context tag of signals fed back from completed plans
pub const WISDOM_CONTEXT: &str = "wisdom";

/// What one pass did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassReport {
    /// False if the stream refused the signal (or there was none)
    pub appended: bool,
    /// True if a deepening pass ran
    pub deepened: bool,
    pub patterns: Vec<Pattern>,
    /// Ids of intuitions born this pass
    pub born: Vec<String>,
    /// Gate decisions, in the order they were made
    pub decisions: Vec<(String, Decision)>,
    /// Plans built this pass
    pub plans_built: Vec<String>,
    /// Plans whose vision absorbed an accepted intuition
    pub plans_inspired: Vec<String>,
    /// (plan id, action id) for every step taken
    pub steps: Vec<(String, String)>,
    pub plans_completed: Vec<String>,
    /// Intuitions whose defer window closed
    pub expired: Vec<String>,
}

pub struct TemporalPipeline {
    config: Config,
    stream: SignalStream,
    recognizer: PatternRecognizer,
    synthesizer: IntuitionSynthesizer,
    gate: Box<dyn ChoiceGate>,
    deferred: DeferredQueue,
    tracker: ExecutionTracker,
    ledger: Arc<ResourceLedger>,
    sink: Arc<dyn EventSink>,
    /// Classes present in the previous pass
    known: HashSet<PatternClass>,
    /// Classes already promoted while continuously present
    promoted: HashSet<PatternClass>,
    passes: u64,
}

impl TemporalPipeline {
    pub fn new(
        config: &Config,
        ledger: Arc<ResourceLedger>,
        store: Arc<dyn PlanStore>,
        sink: Arc<dyn EventSink>,
        gate: Box<dyn ChoiceGate>,
    ) -> Self {
        Self {
            config: config.clone(),
            stream: SignalStream::new(&config.stream, ledger.clone()),
            recognizer: PatternRecognizer::new(&config.patterns),
            synthesizer: IntuitionSynthesizer::new(&config.intuition, ledger.clone()),
            gate,
            deferred: DeferredQueue::new(config.intuition.defer_window_ms, config.intuition.max_deferred),
            tracker: ExecutionTracker::new(&config.planning, ledger.clone(), store, sink.clone()),
            ledger,
            sink,
            known: HashSet::new(),
            promoted: HashSet::new(),
            passes: 0,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stream(&self) -> &SignalStream {
        &self.stream
    }

    pub fn tracker(&self) -> &ExecutionTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut ExecutionTracker {
        &mut self.tracker
    }

    pub fn deferred(&self) -> &DeferredQueue {
        &self.deferred
    }

    pub fn ledger(&self) -> &Arc<ResourceLedger> {
        &self.ledger
    }

    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Run one pass over a merged state.
    pub fn process(&mut self, state: &MergedState) -> Result<PassReport> {
        let features = state.signal_extract();
        if features.is_empty() {
            tracing::debug!(cycle = state.cycle, "merged state carries no live signal");
            return self.idle_at(state.merged_at);
        }
        let context = state.context_tag();
        self.ingest_at(features, &context, state.merged_at)
    }

    /// Run one pass with no new signal: deferred intuitions still expire or
    /// return to the gate, and active plans still advance.
    pub fn idle_at(&mut self, now: i64) -> Result<PassReport> {
        self.passes += 1;
        let mut report = PassReport::default();
        self.gate_all(Vec::new(), now, &mut report)?;
        self.step_plans(now, &mut report)?;
        Ok(report)
    }

    /// Run one pass over a raw signal observed at `now` (Unix ms).
    pub fn ingest_at(&mut self, payload: FeatureMap, context: &str, now: i64) -> Result<PassReport> {
        self.passes += 1;
        let mut report = PassReport {
            appended: self.append(payload, context, now),
            ..PassReport::default()
        };

        let window = self.stream.window_at(now);
        let mut patterns = self.recognizer.detect(&window);
        let interval = self.config.patterns.deepen_interval_cycles;
        if interval > 0 && self.passes % interval == 0 {
            let cost = self.config.patterns.deepen_cost;
            if self.ledger.try_spend(cost) {
                patterns.extend(self.recognizer.deepen(&window));
                rank_patterns(&mut patterns);
                report.deepened = true;
            } else {
                tracing::debug!(cost, "deepening skipped: ledger exhausted");
                self.sink.emit(EventRecord::ledger_exhausted("pattern.deepen", cost, self.ledger.balance()));
            }
        }

        self.track_classes(&patterns);
        let born = self.birth(&patterns, now);
        report.born = born.iter().map(|i| i.id.clone()).collect();
        report.patterns = patterns;

        self.gate_all(born, now, &mut report)?;
        self.step_plans(now, &mut report)?;
        Ok(report)
    }

    fn append(&mut self, payload: FeatureMap, context: &str, now: i64) -> bool {
        let appended = self.stream.add_at(payload, context, now);
        if !appended {
            let cost = self.config.stream.signal_cost;
            self.sink.emit(EventRecord::signal_refused(context, cost));
        }
        appended
    }

    fn track_classes(&mut self, patterns: &[Pattern]) {
        let present: HashSet<PatternClass> = patterns.iter().map(|p| p.class.clone()).collect();
        for pattern in patterns {
            if !self.known.contains(&pattern.class) {
                tracing::debug!(class = %pattern.class, strength = pattern.strength, "pattern detected");
                self.sink.emit(EventRecord::pattern_detected(
                    &pattern.class.key(),
                    pattern.strength,
                    pattern.occurrences,
                ));
            }
        }
        // a class that left the window may be promoted again when it returns
        self.promoted.retain(|class| present.contains(class));
        self.known = present;
    }

    fn birth(&mut self, patterns: &[Pattern], now: i64) -> Vec<Intuition> {
        let mut born = Vec::new();
        for pattern in patterns {
            if self.promoted.contains(&pattern.class) || !self.synthesizer.eligible(pattern) {
                continue;
            }
            match self.synthesizer.birth_at(pattern, now) {
                Ok(intuition) => {
                    self.promoted.insert(pattern.class.clone());
                    self.sink.emit(EventRecord::intuition_born(
                        &intuition.id,
                        intuition.confidence,
                        intuition.creative_potential,
                    ));
                    born.push(intuition);
                }
                Err(TemporaError::InsufficientResource {
                    operation,
                    required,
                    available,
                }) => {
                    tracing::debug!(class = %pattern.class, required, available, "birth skipped: ledger exhausted");
                    self.sink.emit(EventRecord::ledger_exhausted(&operation, required, available));
                }
                Err(e) => {
                    tracing::warn!(class = %pattern.class, error = %e, "birth refused");
                }
            }
        }
        born
    }

    fn gate_all(&mut self, born: Vec<Intuition>, now: i64, report: &mut PassReport) -> Result<()> {
        for expired in self.deferred.expire(now) {
            self.expire(expired, report);
        }

        let mut offers: Vec<Deferred> = self.deferred.take_all();
        offers.extend(born.into_iter().map(|intuition| Deferred {
            intuition,
            deferred_at: now,
            deferrals: 0,
        }));

        let mut offers = offers.into_iter();
        while let Some(offer) = offers.next() {
            match self.offer(&offer, now, report) {
                Ok(Decision::Defer) => {
                    let entry = Deferred {
                        deferrals: offer.deferrals + 1,
                        ..offer
                    };
                    self.requeue(entry, report);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(intuition_id = %offer.intuition.id, error = %e, "gate pass interrupted");
                    self.requeue(offer, report);
                    for rest in offers.by_ref() {
                        self.requeue(rest, report);
                    }
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Put one offer to the gate and act on an acceptance.
    fn offer(&mut self, offer: &Deferred, now: i64, report: &mut PassReport) -> Result<Decision> {
        let key = offer.intuition.vision_key();
        let ctx = GateContext {
            competing_plan: self.tracker.live_plan_for(&key).map(|p| p.id.clone()),
            ledger_balance: self.ledger.balance(),
            deferrals: offer.deferrals,
            now,
        };
        let decision = self.gate.decide(&offer.intuition, &ctx);
        tracing::debug!(intuition_id = %offer.intuition.id, decision = %decision, "gate decision");
        self.sink.emit(EventRecord::intuition_decided(&offer.intuition.id, decision.as_str()));
        report.decisions.push((offer.intuition.id.clone(), decision));

        if decision == Decision::Accept {
            match ctx.competing_plan {
                Some(plan_id) => {
                    self.tracker.fold_inspiration(&plan_id, &offer.intuition.insight)?;
                    report.plans_inspired.push(plan_id);
                }
                None => {
                    let plan = self.tracker.build(&offer.intuition)?;
                    if self.config.planning.auto_activate {
                        self.tracker.activate(&plan.id)?;
                    }
                    report.plans_built.push(plan.id);
                }
            }
        }
        Ok(decision)
    }

    fn requeue(&mut self, entry: Deferred, report: &mut PassReport) {
        if let Some(evicted) = self.deferred.push(entry) {
            self.expire(evicted, report);
        }
    }

    fn expire(&mut self, expired: Deferred, report: &mut PassReport) {
        tracing::debug!(intuition_id = %expired.intuition.id, "deferred intuition expired");
        self.sink.emit(EventRecord::intuition_expired(&expired.intuition.id));
        report.expired.push(expired.intuition.id);
    }

    fn step_plans(&mut self, now: i64, report: &mut PassReport) -> Result<()> {
        let mut budget = self.config.planning.steps_per_cycle;
        while budget > 0 {
            let active = self.tracker.active_ids();
            if active.is_empty() {
                break;
            }
            let mut progressed = false;
            for plan_id in active {
                if budget == 0 {
                    break;
                }
                let advance = match self.tracker.advance(&plan_id) {
                    Ok(advance) => advance,
                    Err(e) if e.is_resource_refusal() => return Ok(()),
                    Err(e) => return Err(e),
                };
                let Some(action) = &advance.completed else {
                    continue;
                };
                budget -= 1;
                progressed = true;
                report.steps.push((plan_id.clone(), action.id.clone()));
                if advance.finished() {
                    report.plans_completed.push(plan_id.clone());
                    self.feed_back_wisdom(&advance.plan, now);
                }
            }
            if !progressed {
                break;
            }
        }
        Ok(())
    }

    fn feed_back_wisdom(&mut self, plan: &Plan, now: i64) {
        if !self.config.planning.wisdom_feedback {
            return;
        }
        let mut payload = FeatureMap::new();
        payload.insert("meaning_resonance".to_string(), plan.confidence);
        payload.insert("sacred_quality".to_string(), plan.progress() / 100.0);
        payload.insert("wisdom".to_string(), plan.wisdom_generated);
        if self.append(payload, WISDOM_CONTEXT, now) {
            tracing::debug!(plan_id = %plan.id, "wisdom fed back into the stream");
        }
    }
}
