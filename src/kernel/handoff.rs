//! Single-slot handoff between the merge loop and the pipeline.
//!
//! The merge side never waits: offering a state while one is still pending
//! replaces it, and the replaced cycle is reported so it can be logged. The
//! pipeline side takes at most one state at a time, so backlog is bounded
//! at one.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::Notify;

use super::merge::MergedState;

#[derive(Debug, Default)]
pub struct Handoff {
    slot: Mutex<Option<MergedState>>,
    notify: Notify,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl Handoff {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_slot<T>(&self, f: impl FnOnce(&mut Option<MergedState>) -> T) -> T {
        let mut slot = self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut slot)
    }

    /// Leave `state` for the pipeline, returning the cycle it replaced (if any).
    pub fn offer(&self, state: MergedState) -> Option<u64> {
        let replaced = self.with_slot(|slot| slot.replace(state)).map(|old| old.cycle);
        if replaced.is_some() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.notify.notify_one();
        replaced
    }

    /// Wait for the next state. Returns None once closed and drained.
    pub async fn take(&self) -> Option<MergedState> {
        loop {
            let notified = self.notify.notified();
            if let Some(state) = self.with_slot(Option::take) {
                return Some(state);
            }
            if self.closed.load(Ordering::SeqCst) {
                return None;
            }
            notified.await;
        }
    }

    /// Pending state without waiting
    pub fn try_take(&self) -> Option<MergedState> {
        self.with_slot(Option::take)
    }

    /// True while a state waits for the pipeline
    pub fn is_pending(&self) -> bool {
        self.with_slot(|slot| slot.is_some())
    }

    /// No more offers will come. A pending state is still handed out.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// States replaced before the pipeline took them
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
