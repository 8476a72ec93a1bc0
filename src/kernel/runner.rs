//! Kernel run loop - master ticks, merges and the pipeline consumer.
//!
//! Each master tick pulls one catalyst, runs a cycle and offers the merged
//! state to the pipeline task through a single-slot `Handoff`. The merge
//! side never waits on the pipeline.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::{MissedTickBehavior, interval};

use super::handoff::Handoff;
use super::orchestrator::{Orchestrator, OrchestratorStats};
use super::source::{CatalystSource, Pull};
use crate::config::{Config, KernelConfig};
use crate::domain::EventRecord;
use crate::error::{Result, TemporaError};
use crate::ledger::{LedgerSnapshot, ResourceLedger};
use crate::loops::ProcessingLoop;
use crate::observe::EventSink;
use crate::storage::PlanStore;
use crate::temporal::{ChoiceGate, TemporalPipeline};

/// Why a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    CycleLimit,
    SourceExhausted,
    Shutdown,
    /// The pipeline task ended on its own (a persistence failure)
    PipelineStopped,
}

/// Counters for one `Kernel::run`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    /// Master cycles that merged a catalyst
    pub cycles: u64,
    /// Master ticks with no catalyst
    pub idle_cycles: u64,
    /// Pipeline passes completed
    pub passes: u64,
    /// Merged states replaced before the pipeline took them
    pub dropped: u64,
    pub ledger: LedgerSnapshot,
    pub measured_hz: Option<f64>,
    /// Worst master-tick deviation from the configured period
    pub jitter: Option<f64>,
    pub stop: StopReason,
}

pub struct Kernel {
    orchestrator: Orchestrator,
    pipeline: Arc<Mutex<TemporalPipeline>>,
    ledger: Arc<ResourceLedger>,
    sink: Arc<dyn EventSink>,
}

impl Kernel {
    /// Validate `config`, start the loops and build the pipeline around one shared ledger.
    pub fn build(
        config: &Config,
        loops: Vec<Box<dyn ProcessingLoop>>,
        store: Arc<dyn PlanStore>,
        sink: Arc<dyn EventSink>,
        gate: Box<dyn ChoiceGate>,
    ) -> Result<Self> {
        config.validate()?;
        let ledger = Arc::new(ResourceLedger::new(config.ledger.initial_balance));
        let orchestrator = Orchestrator::configure(config.kernel.clone(), loops, ledger.clone(), sink.clone())?;
        let pipeline = TemporalPipeline::new(config, ledger.clone(), store, sink.clone(), gate);
        Ok(Self {
            orchestrator,
            pipeline: Arc::new(Mutex::new(pipeline)),
            ledger,
            sink,
        })
    }

    pub fn config(&self) -> &KernelConfig {
        self.orchestrator.config()
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Shared handle to the pipeline; lock it between runs to inspect plans
    pub fn pipeline(&self) -> Arc<Mutex<TemporalPipeline>> {
        self.pipeline.clone()
    }

    pub fn ledger(&self) -> &Arc<ResourceLedger> {
        &self.ledger
    }

    pub fn stats(&self) -> OrchestratorStats {
        self.orchestrator.stats()
    }

    /// Pick up every live plan from the store so this session keeps working on it.
    pub async fn restore_plans(&self) -> Result<Vec<String>> {
        let restored = self.pipeline.lock().await.tracker_mut().load_live()?;
        if !restored.is_empty() {
            log::info!("Restored {} live plans", restored.len());
        }
        Ok(restored)
    }

    /// Tick at the master rate until `max_cycles` ticks have run, the source
    /// is exhausted, or `shutdown` resolves.
    ///
    /// Returns the first persistence failure the pipeline hit, after the
    /// merge loop has stopped.
    pub async fn run<S, F>(&mut self, source: &mut S, max_cycles: Option<u64>, shutdown: F) -> Result<RunSummary>
    where
        S: CatalystSource + ?Sized,
        F: Future<Output = ()>,
    {
        self.orchestrator.reset_timing();
        let handoff = Arc::new(Handoff::new());
        let consumer = tokio::spawn(consume(handoff.clone(), self.pipeline.clone()));

        let mut ticker = interval(self.orchestrator.config().master_period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        let mut cycles = 0u64;
        let mut idle_cycles = 0u64;
        let stop = loop {
            if max_cycles.is_some_and(|max| cycles + idle_cycles >= max) {
                break StopReason::CycleLimit;
            }
            if consumer.is_finished() {
                break StopReason::PipelineStopped;
            }
            tokio::select! {
                _ = &mut shutdown => break StopReason::Shutdown,
                _ = ticker.tick() => {}
            }
            match source.pull() {
                Pull::Ready(catalyst) => {
                    let merged = self.orchestrator.run_cycle(catalyst).await;
                    cycles += 1;
                    if let Some(replaced) = handoff.offer(merged) {
                        tracing::warn!(cycle = replaced, "pipeline behind, dropped pending state");
                        self.sink.emit(EventRecord::state_dropped(replaced));
                    }
                }
                Pull::Idle => {
                    self.orchestrator.idle_tick();
                    idle_cycles += 1;
                }
                Pull::Exhausted => break StopReason::SourceExhausted,
            }
        };
        log::info!("Kernel stopping after {} cycles ({} idle): {:?}", cycles, idle_cycles, stop);

        handoff.close();
        let (passes, outcome) = consumer.await.map_err(|e| TemporaError::LoopFailed {
            loop_id: "pipeline".to_string(),
            reason: e.to_string(),
        })?;
        outcome?;

        Ok(RunSummary {
            cycles,
            idle_cycles,
            passes,
            dropped: handoff.dropped(),
            ledger: self.ledger.snapshot(),
            measured_hz: self.orchestrator.measured_hz(),
            jitter: self.orchestrator.jitter(),
            stop,
        })
    }

    /// Stop the loop workers.
    pub async fn shutdown(self) {
        self.orchestrator.shutdown().await;
    }
}

/// Pipeline task: one pass per state taken from the handoff.
async fn consume(handoff: Arc<Handoff>, pipeline: Arc<Mutex<TemporalPipeline>>) -> (u64, Result<()>) {
    let mut passes = 0u64;
    while let Some(state) = handoff.take().await {
        let mut pipeline = pipeline.lock().await;
        match pipeline.process(&state) {
            Ok(report) => {
                passes += 1;
                tracing::debug!(
                    cycle = state.cycle,
                    born = report.born.len(),
                    steps = report.steps.len(),
                    "pipeline pass complete"
                );
            }
            Err(e) => {
                tracing::error!(cycle = state.cycle, error = %e, "pipeline stopped");
                return (passes, Err(e));
            }
        }
        drop(pipeline);
        tokio::task::yield_now().await;
    }
    (passes, Ok(()))
}
