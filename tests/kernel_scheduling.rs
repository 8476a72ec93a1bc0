//! Kernel scheduling integration tests
//!
//! Multi-frequency cadence, partial merges, rhythm events and bounded
//! handoff, all on tokio's paused clock.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;
use tokio::time::Instant;

use tempora::config::{Config, KernelConfig, LoopSpec};
use tempora::domain::{CycleCatalyst, event_types};
use tempora::error::Result;
use tempora::kernel::{Handoff, Kernel, MergedState, Orchestrator, PulseSource, SlotState, StopReason};
use tempora::ledger::ResourceLedger;
use tempora::loops::{AwarenessLoop, LoopId, LoopPayload, ProcessingLoop, ResonanceLoop, StepInput, StructuralLoop, standard_loops};
use tempora::observe::{ChannelSink, NullSink};
use tempora::storage::{JsonlPlanStore, PlanStore};
use tempora::temporal::ThresholdGate;

/// A loop that takes longer than any master period
struct SluggishLoop {
    id: LoopId,
}

#[async_trait]
impl ProcessingLoop for SluggishLoop {
    fn id(&self) -> &LoopId {
        &self.id
    }

    async fn step(&mut self, _input: &StepInput) -> Result<LoopPayload> {
        tokio::time::sleep(Duration::from_secs(2)).await;
        Ok(LoopPayload::Context {
            source: "late".into(),
            continuity: 0.0,
            meaning_resonance: 0.0,
            sacred_quality: 0.0,
        })
    }
}

fn catalyst(i: u64) -> CycleCatalyst {
    CycleCatalyst::from_value(
        "test",
        json!({"emotional_resonance": 0.8, "creative_tension": 0.3, "resonance": 0.9, "tick": i}),
    )
}

/// Integration test: 10/5/2/1 Hz loops under a 10 Hz master over ten cycles
#[tokio::test(start_paused = true)]
async fn test_loops_contribute_at_their_own_rates() {
    let config = KernelConfig::default();
    let period = config.master_period();
    let mut orchestrator =
        Orchestrator::configure(config, standard_loops(), Arc::new(ResourceLedger::new(100.0)), Arc::new(NullSink))
            .unwrap();

    for i in 0..10 {
        orchestrator.run_cycle(catalyst(i)).await;
        tokio::time::sleep(period).await;
    }

    let stats = orchestrator.stats();
    let counts: Vec<(String, u64, u64, u64)> = stats
        .loops
        .iter()
        .map(|l| (l.loop_id.clone(), l.fresh, l.stale, l.degraded))
        .collect();
    assert_eq!(
        counts,
        vec![
            ("awareness".to_string(), 10, 0, 0),
            ("structural".to_string(), 5, 5, 0),
            ("resonance".to_string(), 2, 8, 0),
            ("context".to_string(), 1, 9, 0),
        ]
    );
    orchestrator.shutdown().await;
}

/// Integration test: timing precision is reported for the master and each loop
#[tokio::test(start_paused = true)]
async fn test_jitter_reported_in_stats() {
    let config = KernelConfig::default();
    let period = config.master_period();
    let mut orchestrator =
        Orchestrator::configure(config, standard_loops(), Arc::new(ResourceLedger::new(100.0)), Arc::new(NullSink))
            .unwrap();

    for i in 0..10 {
        orchestrator.run_cycle(catalyst(i)).await;
        tokio::time::sleep(period).await;
    }
    let stats = orchestrator.stats();
    assert!(stats.jitter.unwrap() < 1e-6);
    // awareness, structural and resonance all land exactly on their own periods
    for loop_stats in &stats.loops[..3] {
        assert!(loop_stats.jitter.unwrap() < 1e-6, "{}", loop_stats.loop_id);
    }
    // one fresh context result has no interval yet
    assert_eq!(stats.loops[3].jitter, None);

    orchestrator.reset_timing();
    assert_eq!(orchestrator.jitter(), None);
    for (i, gap) in [100, 150, 100, 100].into_iter().enumerate() {
        orchestrator.run_cycle(catalyst(i as u64)).await;
        tokio::time::sleep(Duration::from_millis(gap)).await;
    }
    let stats = orchestrator.stats();
    assert!((stats.jitter.unwrap() - 0.5).abs() < 1e-6);
    assert!((stats.loops[0].jitter.unwrap() - 0.5).abs() < 1e-6);
    orchestrator.shutdown().await;
}

/// Integration test: stale slots report how old their cached result is
#[tokio::test(start_paused = true)]
async fn test_stale_age_grows_until_refresh() {
    let config = KernelConfig::default();
    let mut orchestrator =
        Orchestrator::configure(config, standard_loops(), Arc::new(ResourceLedger::new(100.0)), Arc::new(NullSink))
            .unwrap();

    let mut ages = Vec::new();
    for i in 0..11 {
        let merged = orchestrator.run_cycle(catalyst(i)).await;
        ages.push(merged.slot("context").unwrap().age_cycles().unwrap());
    }
    assert_eq!(ages, vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 0]);
    orchestrator.shutdown().await;
}

/// Integration test: one timed-out loop out of four still yields a merge in time
#[tokio::test(start_paused = true)]
async fn test_partial_merge_with_one_slow_loop() {
    let config = KernelConfig {
        loops: vec![
            LoopSpec::new("awareness", 10.0),
            LoopSpec::new("structural", 10.0),
            LoopSpec::new("resonance", 10.0),
            LoopSpec::new("sluggish", 10.0),
        ],
        ..KernelConfig::default()
    };
    let deadline = config.loop_deadline();
    let loops: Vec<Box<dyn ProcessingLoop>> = vec![
        Box::new(AwarenessLoop::new()),
        Box::new(StructuralLoop::new()),
        Box::new(ResonanceLoop::new()),
        Box::new(SluggishLoop {
            id: LoopId::from("sluggish"),
        }),
    ];
    let (sink, mut events) = ChannelSink::new(64);
    let mut orchestrator =
        Orchestrator::configure(config, loops, Arc::new(ResourceLedger::new(100.0)), Arc::new(sink)).unwrap();

    let started = Instant::now();
    let merged = orchestrator.run_cycle(catalyst(0)).await;
    assert!(started.elapsed() <= deadline);
    assert_eq!(merged.live_count(), 3);
    assert_eq!(merged.degraded_count(), 1);
    assert!(matches!(
        &merged.slot("sluggish").unwrap().state,
        SlotState::Degraded { reason } if reason == "deadline exceeded"
    ));
    assert_eq!(merged.signal_extract().get("emotional_resonance"), Some(&0.8));

    // still stepping the first request, so the next cycle finds it busy
    let merged = orchestrator.run_cycle(catalyst(1)).await;
    assert!(matches!(
        &merged.slot("sluggish").unwrap().state,
        SlotState::Degraded { reason } if reason == "busy"
    ));
    assert_eq!(merged.live_count(), 3);

    let degraded = std::iter::from_fn(|| events.try_recv().ok())
        .filter(|e| e.event_type == event_types::LOOP_DEGRADED)
        .count();
    assert_eq!(degraded, 2);
    orchestrator.shutdown().await;
}

/// Integration test: a sustained slow master rate raises one rhythm event
#[tokio::test(start_paused = true)]
async fn test_slow_master_raises_rhythm_degraded_once() {
    let config = KernelConfig::default();
    let (sink, mut events) = ChannelSink::new(64);
    let mut orchestrator =
        Orchestrator::configure(config, standard_loops(), Arc::new(ResourceLedger::new(100.0)), Arc::new(sink))
            .unwrap();

    // 5 Hz against a 7 Hz critical threshold
    for i in 0..10 {
        orchestrator.run_cycle(catalyst(i)).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    let rhythm: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
        .filter(|e| e.event_type == event_types::RHYTHM_DEGRADED)
        .collect();
    assert_eq!(rhythm.len(), 1);
    assert_eq!(rhythm[0].payload["consecutive_cycles"], 6);
    assert!(orchestrator.stats().rhythm_degraded);
    let measured = orchestrator.measured_hz().unwrap();
    assert!((measured - 5.0).abs() < 0.01);
    orchestrator.shutdown().await;
}

/// Integration test: a slow consumer never sees more than one pending state
#[tokio::test(start_paused = true)]
async fn test_handoff_keeps_only_latest_state() {
    let handoff = Arc::new(Handoff::new());
    let consumer = {
        let handoff = handoff.clone();
        tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(state) = handoff.take().await {
                seen.push(state.cycle);
                tokio::time::sleep(Duration::from_millis(250)).await;
            }
            seen
        })
    };

    for cycle in 1..=10 {
        handoff.offer(MergedState {
            cycle,
            ..MergedState::initial()
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    handoff.close();
    let seen = consumer.await.unwrap();

    assert!(handoff.dropped() > 0);
    assert_eq!(seen.len() as u64 + handoff.dropped(), 10);
    assert_eq!(seen.last(), Some(&10));
    assert!(seen.windows(2).all(|w| w[0] < w[1]));
}

/// Integration test: a full run on the synthetic pulse persists plans
#[tokio::test(start_paused = true)]
async fn test_kernel_run_persists_plans() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(JsonlPlanStore::open(temp_dir.path()).unwrap());
    let mut kernel = Kernel::build(
        &Config::default(),
        standard_loops(),
        store.clone(),
        Arc::new(NullSink),
        Box::new(ThresholdGate::new(0.5)),
    )
    .unwrap();

    let mut source = PulseSource::new(20);
    let summary = kernel.run(&mut source, Some(60), std::future::pending()).await.unwrap();
    assert_eq!(summary.stop, StopReason::CycleLimit);
    assert_eq!(summary.cycles, 60);
    assert_eq!(summary.passes + summary.dropped, 60);
    assert!(summary.ledger.balance >= 0.0);
    kernel.shutdown().await;

    let plans = store.list(None).unwrap();
    assert!(!plans.is_empty());
}
