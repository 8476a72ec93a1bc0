//! Orchestrator - fans each master cycle out to the loops and merges what comes back.
//!
//! A cycle never waits past its deadline. Loops that are not due contribute
//! their cached result (stale, with its age); loops that miss the deadline,
//! fail, or are still busy with an earlier step contribute a degraded slot.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::time::error::Elapsed;
use tokio::time::{Instant, timeout_at};

use super::merge::{LoopSlot, MergedState, SlotState};
use super::timing::{Cadence, FrequencyMeter, RhythmChange, RhythmMonitor};
use super::worker::LoopWorker;
use crate::config::KernelConfig;
use crate::domain::{CycleCatalyst, EventRecord};
use crate::error::{Result, TemporaError};
use crate::id::now_ms;
use crate::ledger::ResourceLedger;
use crate::loops::{LoopId, LoopResult, ProcessingLoop, StepInput};
use crate::observe::EventSink;

const MASTER_METER_WINDOW: usize = 32;
const LOOP_METER_WINDOW: usize = 16;

/// Per-loop counters for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoopStats {
    pub loop_id: String,
    pub target_hz: f64,
    pub fresh: u64,
    pub stale: u64,
    pub degraded: u64,
    /// Step rate the loop last reported
    pub measured_hz: Option<f64>,
    /// Worst deviation of a fresh-result interval from the target period,
    /// as a fraction of that period
    pub jitter: Option<f64>,
}

/// Orchestrator-wide counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrchestratorStats {
    pub cycles: u64,
    pub idle_cycles: u64,
    pub measured_hz: Option<f64>,
    /// Worst master-tick deviation from the configured period, as a fraction of it
    pub jitter: Option<f64>,
    pub rhythm_degraded: bool,
    pub loops: Vec<LoopStats>,
}

struct LoopEntry {
    worker: LoopWorker,
    cadence: Cadence,
    cached: Option<LoopResult>,
    /// Cycle starts that produced a fresh result
    meter: FrequencyMeter,
    period: Option<Duration>,
    stats: LoopStats,
}

impl LoopEntry {
    fn cached_slot(&self, cycle: u64, now: i64) -> SlotState {
        match &self.cached {
            Some(result) => SlotState::Stale {
                result: result.clone(),
                age_cycles: cycle.saturating_sub(result.cycle),
                age_ms: (now - result.produced_at).max(0),
            },
            None => SlotState::Degraded {
                reason: "no result yet".to_string(),
            },
        }
    }
}

/// A worker's reply as seen through the cycle deadline.
type Reply = std::result::Result<std::result::Result<Result<LoopResult>, oneshot::error::RecvError>, Elapsed>;

pub struct Orchestrator {
    config: KernelConfig,
    entries: Vec<LoopEntry>,
    ledger: Arc<ResourceLedger>,
    sink: Arc<dyn EventSink>,
    meter: FrequencyMeter,
    rhythm: RhythmMonitor,
    cycle: u64,
    idle_cycles: u64,
    previous: Arc<MergedState>,
}

impl Orchestrator {
    /// Validate `config` and start one worker per configured loop.
    ///
    /// Every configured loop id must have exactly one matching loop in
    /// `loops` and vice versa. Must be called within a tokio runtime.
    pub fn configure(
        config: KernelConfig,
        loops: Vec<Box<dyn ProcessingLoop>>,
        ledger: Arc<ResourceLedger>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self> {
        config.validate()?;

        let mut loops: Vec<Option<Box<dyn ProcessingLoop>>> = loops.into_iter().map(Some).collect();
        let mut ordered = Vec::with_capacity(config.loops.len());
        for spec in &config.loops {
            let found = loops
                .iter_mut()
                .find(|slot| slot.as_ref().is_some_and(|l| l.id().as_str() == spec.id))
                .and_then(Option::take)
                .ok_or_else(|| TemporaError::Config(format!("no loop registered for id: {}", spec.id)))?;
            ordered.push((spec.clone(), found));
        }
        if let Some(extra) = loops.iter().flatten().next() {
            return Err(TemporaError::Config(format!("loop {} has no configured rate", extra.id())));
        }

        let entries = ordered
            .into_iter()
            .map(|(spec, processing_loop)| {
                log::debug!("Starting loop {} at {} Hz", spec.id, spec.target_hz);
                LoopEntry {
                    worker: LoopWorker::spawn(processing_loop),
                    cadence: Cadence::new(spec.target_hz, config.master_hz),
                    cached: None,
                    meter: FrequencyMeter::new(LOOP_METER_WINDOW),
                    period: Duration::try_from_secs_f64(1.0 / spec.target_hz).ok(),
                    stats: LoopStats {
                        loop_id: spec.id.clone(),
                        target_hz: spec.target_hz,
                        ..LoopStats::default()
                    },
                }
            })
            .collect();

        Ok(Self {
            rhythm: RhythmMonitor::new(config.critical_hz, config.degraded_after_cycles),
            meter: FrequencyMeter::new(MASTER_METER_WINDOW),
            config,
            entries,
            ledger,
            sink,
            cycle: 0,
            idle_cycles: 0,
            previous: Arc::new(MergedState::initial()),
        })
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Master cycles run so far, idle ones included
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Achieved master-cycle frequency over the recent window
    pub fn measured_hz(&self) -> Option<f64> {
        self.meter.hz()
    }

    /// The last merged state (the initial one before any cycle)
    pub fn previous(&self) -> Arc<MergedState> {
        self.previous.clone()
    }

    pub fn loop_ids(&self) -> Vec<LoopId> {
        self.entries.iter().map(|e| e.worker.id().clone()).collect()
    }

    pub fn stats(&self) -> OrchestratorStats {
        OrchestratorStats {
            cycles: self.cycle,
            idle_cycles: self.idle_cycles,
            measured_hz: self.meter.hz(),
            jitter: self.jitter(),
            rhythm_degraded: self.rhythm.is_degraded(),
            loops: self.entries.iter().map(|e| e.stats.clone()).collect(),
        }
    }

    /// Worst master-tick deviation from the configured period over the recent window
    pub fn jitter(&self) -> Option<f64> {
        self.meter.jitter(self.config.master_period())
    }

    /// Forget measured rates, for a fresh run after a pause.
    pub fn reset_timing(&mut self) {
        self.meter.reset();
        for entry in &mut self.entries {
            entry.meter.reset();
            entry.stats.jitter = None;
        }
    }

    /// Count a master tick that had no catalyst.
    ///
    /// Keeps the rhythm measurement honest without stepping any loop.
    pub fn idle_tick(&mut self) {
        self.cycle += 1;
        self.idle_cycles += 1;
        self.tick_rhythm(Instant::now());
    }

    fn tick_rhythm(&mut self, at: Instant) -> Option<f64> {
        self.meter.record(at);
        let measured = self.meter.hz()?;
        match self.rhythm.observe(measured) {
            Some(RhythmChange::Degraded {
                measured_hz,
                consecutive,
            }) => {
                tracing::warn!(measured_hz, critical_hz = self.config.critical_hz, consecutive, "master rhythm degraded");
                self.sink
                    .emit(EventRecord::rhythm_degraded(measured_hz, self.config.critical_hz, consecutive));
            }
            Some(RhythmChange::Restored { measured_hz }) => {
                tracing::info!(measured_hz, "master rhythm restored");
                self.sink.emit(EventRecord::rhythm_restored(measured_hz));
            }
            None => {}
        }
        Some(measured)
    }

    /// Run one master cycle over `catalyst` and merge the results.
    ///
    /// Returns within the loop deadline whatever the loops do.
    pub async fn run_cycle(&mut self, catalyst: CycleCatalyst) -> MergedState {
        self.cycle += 1;
        let cycle = self.cycle;
        let started = Instant::now();
        let measured_hz = self.tick_rhythm(started);
        let deadline = started + self.config.loop_deadline();

        let catalyst = Arc::new(catalyst);
        let mut slots: Vec<Option<SlotState>> = Vec::with_capacity(self.entries.len());
        let mut pending = Vec::new();
        let now = now_ms();

        for (idx, entry) in self.entries.iter_mut().enumerate() {
            if !entry.cadence.tick() {
                slots.push(Some(entry.cached_slot(cycle, now)));
                continue;
            }
            let input = StepInput {
                cycle,
                deadline,
                catalyst: catalyst.clone(),
                previous: self.previous.clone(),
            };
            match entry.worker.dispatch(input) {
                Ok(rx) => {
                    slots.push(None);
                    pending.push((idx, rx));
                }
                Err(e) => slots.push(Some(SlotState::Degraded {
                    reason: e.reason().to_string(),
                })),
            }
        }

        let replies: Vec<(usize, Reply)> =
            join_all(pending.into_iter().map(|(idx, rx)| async move { (idx, timeout_at(deadline, rx).await) })).await;

        for (idx, reply) in replies {
            let entry = &mut self.entries[idx];
            let failure = match reply {
                Ok(Ok(Ok(result))) => {
                    entry.cached = Some(result.clone());
                    slots[idx] = Some(SlotState::Fresh { result });
                    continue;
                }
                Ok(Ok(Err(e))) => e,
                Ok(Err(_)) => TemporaError::LoopFailed {
                    loop_id: entry.worker.id().to_string(),
                    reason: "worker dropped step".to_string(),
                },
                Err(_) => TemporaError::LoopTimeout {
                    loop_id: entry.worker.id().to_string(),
                },
            };
            slots[idx] = Some(SlotState::Degraded {
                reason: failure.to_string(),
            });
        }

        let mut merged_slots = Vec::with_capacity(self.entries.len());
        for (entry, state) in self.entries.iter_mut().zip(slots) {
            let state = state.unwrap_or_else(|| SlotState::Degraded {
                reason: "no reply".to_string(),
            });
            match &state {
                SlotState::Fresh { result } => {
                    entry.stats.fresh += 1;
                    entry.stats.measured_hz = result.measured_hz.or(entry.stats.measured_hz);
                    entry.meter.record(started);
                    if let Some(period) = entry.period {
                        entry.stats.jitter = entry.meter.jitter(period);
                    }
                }
                SlotState::Stale { .. } => entry.stats.stale += 1,
                SlotState::Degraded { reason } => {
                    entry.stats.degraded += 1;
                    let loop_id = entry.worker.id().to_string();
                    tracing::warn!(loop_id = %loop_id, cycle, reason = %reason, "loop degraded");
                    self.sink.emit(EventRecord::loop_degraded(&loop_id, cycle, reason));
                }
            }
            merged_slots.push(LoopSlot::new(entry.worker.id().clone(), state));
        }

        let merged = MergedState {
            cycle,
            catalyst_id: Some(catalyst.id().to_string()),
            source: Some(catalyst.source().to_string()),
            slots: merged_slots,
            ledger: self.ledger.snapshot(),
            measured_hz,
            merged_at: now_ms(),
        };
        log::debug!(
            "Cycle {} merged: {} fresh, {} stale, {} degraded",
            cycle,
            merged.fresh_count(),
            merged.stale_count(),
            merged.degraded_count()
        );
        self.previous = Arc::new(merged.clone());
        merged
    }

    /// Stop every worker, letting in-flight steps finish.
    pub async fn shutdown(self) {
        for entry in self.entries {
            entry.worker.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoopSpec;
    use crate::loops::LoopPayload;
    use crate::observe::{ChannelSink, NullSink};
    use async_trait::async_trait;
    use std::time::Duration;

    struct FixedLoop {
        id: LoopId,
        delay: Duration,
    }

    #[async_trait]
    impl ProcessingLoop for FixedLoop {
        fn id(&self) -> &LoopId {
            &self.id
        }

        async fn step(&mut self, input: &StepInput) -> Result<LoopPayload> {
            tokio::time::sleep(self.delay).await;
            Ok(LoopPayload::Awareness {
                presence: 0.0,
                novelty: 0.0,
                emotional_resonance: input.catalyst.unit_feature("emotional_resonance", 0.0),
            })
        }
    }

    fn fixed(id: &str, delay_ms: u64) -> Box<dyn ProcessingLoop> {
        Box::new(FixedLoop {
            id: LoopId::from(id),
            delay: Duration::from_millis(delay_ms),
        })
    }

    fn kernel_config(loops: &[(&str, f64)]) -> KernelConfig {
        KernelConfig {
            loops: loops.iter().map(|(id, hz)| LoopSpec::new(*id, *hz)).collect(),
            ..KernelConfig::default()
        }
    }

    fn catalyst() -> CycleCatalyst {
        CycleCatalyst::new("test", serde_json::Map::new())
    }

    #[tokio::test]
    async fn test_configure_rejects_unmatched_loops() {
        let ledger = Arc::new(ResourceLedger::new(10.0));
        let err = Orchestrator::configure(
            kernel_config(&[("a", 10.0), ("b", 5.0)]),
            vec![fixed("a", 0)],
            ledger.clone(),
            Arc::new(NullSink),
        )
        .err()
        .unwrap();
        assert!(err.to_string().contains("no loop registered for id: b"));

        let err = Orchestrator::configure(
            kernel_config(&[("a", 10.0)]),
            vec![fixed("a", 0), fixed("z", 0)],
            ledger,
            Arc::new(NullSink),
        )
        .err()
        .unwrap();
        assert!(err.to_string().contains("loop z has no configured rate"));
    }

    #[tokio::test]
    async fn test_configure_rejects_invalid_config() {
        let err = Orchestrator::configure(
            kernel_config(&[("a", 10.0), ("a", 5.0)]),
            vec![fixed("a", 0)],
            Arc::new(ResourceLedger::new(0.0)),
            Arc::new(NullSink),
        )
        .err()
        .unwrap();
        assert!(matches!(err, TemporaError::Config(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_loop_degrades_alone() {
        let (sink, mut events) = ChannelSink::new(16);
        let mut orchestrator = Orchestrator::configure(
            kernel_config(&[("fast", 10.0), ("slow", 10.0)]),
            vec![fixed("fast", 5), fixed("slow", 500)],
            Arc::new(ResourceLedger::new(10.0)),
            Arc::new(sink),
        )
        .unwrap();

        let started = Instant::now();
        let merged = orchestrator.run_cycle(catalyst()).await;
        assert!(started.elapsed() <= orchestrator.config().loop_deadline());
        assert!(merged.slot("fast").unwrap().is_fresh());
        match &merged.slot("slow").unwrap().state {
            SlotState::Degraded { reason } => assert_eq!(reason, "deadline exceeded"),
            other => panic!("unexpected slot: {other:?}"),
        }
        let event = events.try_recv().unwrap();
        assert_eq!(event.event_type, "loop.degraded");
        assert_eq!(event.subject.as_deref(), Some("slow"));
        orchestrator.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_slower_loop_contributes_stale_cache() {
        let mut orchestrator = Orchestrator::configure(
            kernel_config(&[("fast", 10.0), ("half", 5.0)]),
            vec![fixed("fast", 1), fixed("half", 1)],
            Arc::new(ResourceLedger::new(10.0)),
            Arc::new(NullSink),
        )
        .unwrap();

        let first = orchestrator.run_cycle(catalyst()).await;
        assert!(first.slot("half").unwrap().is_fresh());
        tokio::time::sleep(Duration::from_millis(100)).await;
        let second = orchestrator.run_cycle(catalyst()).await;
        let half = second.slot("half").unwrap();
        assert!(half.is_stale());
        assert_eq!(half.age_cycles(), Some(1));
        assert!(second.slot("fast").unwrap().is_fresh());
        assert_eq!(orchestrator.previous().cycle, 2);
        orchestrator.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_tick_steps_nothing() {
        let mut orchestrator = Orchestrator::configure(
            kernel_config(&[("fast", 10.0)]),
            vec![fixed("fast", 1)],
            Arc::new(ResourceLedger::new(10.0)),
            Arc::new(NullSink),
        )
        .unwrap();
        orchestrator.idle_tick();
        let stats = orchestrator.stats();
        assert_eq!(stats.cycles, 1);
        assert_eq!(stats.idle_cycles, 1);
        assert_eq!(stats.loops[0].fresh, 0);
        orchestrator.shutdown().await;
    }
}
