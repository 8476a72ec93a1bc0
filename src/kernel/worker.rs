//! Loop workers.
//!
//! Each loop runs inside its own tokio task and owns its state outright, so
//! loops step in parallel without sharing anything. The orchestrator talks
//! to a worker through a capacity-1 request channel and a oneshot reply per
//! step. A step that overruns keeps running to completion in its task;
//! the orchestrator has stopped listening by then and the reply is dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::timing::FrequencyMeter;
use crate::error::Result;
use crate::id::now_ms;
use crate::loops::{LoopId, LoopResult, ProcessingLoop, StepInput};

const METER_WINDOW: usize = 16;

/// One step request and the channel its result goes back on.
struct StepRequest {
    input: StepInput,
    reply: oneshot::Sender<Result<LoopResult>>,
}

/// Why a step could not be handed to a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    /// The worker is still running an earlier step
    Busy,
    /// The worker task has stopped
    Closed,
}

impl DispatchError {
    pub fn reason(&self) -> &'static str {
        match self {
            DispatchError::Busy => "busy",
            DispatchError::Closed => "worker stopped",
        }
    }
}

pub struct LoopWorker {
    id: LoopId,
    tx: mpsc::Sender<StepRequest>,
    busy: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl LoopWorker {
    /// Move `processing_loop` into a new task. Must be called within a tokio runtime.
    pub fn spawn(mut processing_loop: Box<dyn ProcessingLoop>) -> Self {
        let id = processing_loop.id().clone();
        let (tx, mut rx) = mpsc::channel::<StepRequest>(1);
        let busy = Arc::new(AtomicBool::new(false));

        let task_busy = busy.clone();
        let task_id = id.clone();
        let handle = tokio::spawn(async move {
            let mut meter = FrequencyMeter::new(METER_WINDOW);
            while let Some(request) = rx.recv().await {
                if request.input.expired() || request.reply.is_closed() {
                    tracing::debug!(loop_id = %task_id, cycle = request.input.cycle, "skipping expired step");
                    continue;
                }
                task_busy.store(true, Ordering::SeqCst);
                let started = Instant::now();
                let outcome = processing_loop.step(&request.input).await;
                meter.record(started);
                task_busy.store(false, Ordering::SeqCst);

                let result = outcome.map(|payload| LoopResult {
                    loop_id: task_id.clone(),
                    payload,
                    measured_hz: meter.hz(),
                    cycle: request.input.cycle,
                    produced_at: now_ms(),
                });
                if request.reply.send(result).is_err() {
                    tracing::debug!(loop_id = %task_id, cycle = request.input.cycle, "late reply discarded");
                }
            }
            tracing::debug!(loop_id = %task_id, "loop worker stopped");
        });

        Self { id, tx, busy, handle }
    }

    pub fn id(&self) -> &LoopId {
        &self.id
    }

    /// True while a step is running
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Hand a step to the worker without waiting.
    pub fn dispatch(&self, input: StepInput) -> std::result::Result<oneshot::Receiver<Result<LoopResult>>, DispatchError> {
        if self.is_busy() {
            return Err(DispatchError::Busy);
        }
        let (reply, rx) = oneshot::channel();
        match self.tx.try_send(StepRequest { input, reply }) {
            Ok(()) => Ok(rx),
            Err(mpsc::error::TrySendError::Full(_)) => Err(DispatchError::Busy),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(DispatchError::Closed),
        }
    }

    /// Close the request channel and wait for the task to finish its current step.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.handle.await {
            tracing::warn!(loop_id = %self.id, error = %e, "loop worker ended abnormally");
        }
    }
}
