//! Loop kernel - multi-frequency scheduling, merge and handoff to the pipeline.

pub mod handoff;
pub mod merge;
pub mod orchestrator;
pub mod runner;
pub mod source;
pub mod timing;
pub mod worker;

pub use handoff::Handoff;
pub use merge::{KERNEL_CONTEXT, LoopSlot, MergedState, SlotState};
pub use orchestrator::{LoopStats, Orchestrator, OrchestratorStats};
pub use runner::{Kernel, RunSummary, StopReason};
pub use source::{CatalystSource, ChannelSource, JsonlCatalystSource, PulseSource, Pull, ScriptedSource};
pub use timing::{Cadence, FrequencyMeter, RhythmChange, RhythmMonitor};
pub use worker::{DispatchError, LoopWorker};
