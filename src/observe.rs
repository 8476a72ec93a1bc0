//! Observability sinks.
//!
//! The kernel hands structured `EventRecord`s to an `EventSink` and never
//! waits on it: sinks must return immediately, dropping events if they
//! cannot keep up.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::domain::EventRecord;

/// Fire-and-forget receiver of kernel events.
pub trait EventSink: Send + Sync {
    /// Accept an event. Must not block.
    fn emit(&self, event: EventRecord);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: EventRecord) {}
}

/// Writes events to the tracing/log facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: EventRecord) {
        let subject = event.subject.as_deref().unwrap_or("-");
        match event.event_type.as_str() {
            t if t.ends_with(".degraded") || t.ends_with(".exhausted") || t.ends_with(".dropped") => {
                tracing::warn!(event_type = %t, subject = %subject, payload = %event.payload, "kernel event");
            }
            t => {
                tracing::info!(event_type = %t, subject = %subject, payload = %event.payload, "kernel event");
            }
        }
    }
}

/// Forwards events into a bounded channel, dropping when it is full.
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<EventRecord>,
    dropped: AtomicU64,
}

impl ChannelSink {
    /// Create a sink and the receiver that drains it
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<EventRecord>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// Number of events discarded because the channel was full or closed
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: EventRecord) {
        if self.tx.try_send(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}
