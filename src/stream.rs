//! Signal stream - a bounded, time-windowed sequence of signal records.
//!
//! Records are kept oldest-first. Eviction is lazy: it runs on every append
//! and every query, popping expired records off the front, so each record is
//! evicted exactly once.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::config::StreamConfig;
use crate::domain::{FeatureMap, SignalRecord};
use crate::id::now_ms;
use crate::ledger::ResourceLedger;

pub struct SignalStream {
    records: VecDeque<SignalRecord>,
    retention_ms: i64,
    max_records: usize,
    signal_cost: f64,
    ledger: Arc<ResourceLedger>,
    next_seq: u64,
    refused: u64,
    evicted: u64,
}

impl SignalStream {
    pub fn new(config: &StreamConfig, ledger: Arc<ResourceLedger>) -> Self {
        Self {
            records: VecDeque::with_capacity(config.max_records.min(1024)),
            retention_ms: config.retention_ms.min(i64::MAX as u64) as i64,
            max_records: config.max_records.max(1),
            signal_cost: config.signal_cost,
            ledger,
            next_seq: 1,
            refused: 0,
            evicted: 0,
        }
    }

    /// Append a signal stamped now. Returns false if the ledger refused the cost.
    pub fn add(&mut self, payload: FeatureMap, context: &str) -> bool {
        self.add_at(payload, context, now_ms())
    }

    /// Append a signal stamped `at`, treating `at` as the current time for eviction.
    pub fn add_at(&mut self, payload: FeatureMap, context: &str, at: i64) -> bool {
        self.evict_expired(at);

        if self.signal_cost > 0.0 && !self.ledger.try_spend(self.signal_cost) {
            self.refused += 1;
            tracing::debug!(context = %context, cost = self.signal_cost, "signal refused: ledger exhausted");
            return false;
        }

        let record = SignalRecord::new(self.next_seq, payload, context, at);
        self.next_seq += 1;

        // Appends are normally in time order; a late record is slotted in place.
        let idx = self.records.partition_point(|r| r.timestamp <= at);
        self.records.insert(idx, record);

        while self.records.len() > self.max_records {
            self.records.pop_front();
            self.evicted += 1;
        }
        true
    }

    /// Drop records older than the retention window. Returns how many went.
    pub fn evict_expired(&mut self, now: i64) -> usize {
        let mut count = 0;
        while let Some(front) = self.records.front() {
            if now - front.timestamp > self.retention_ms {
                self.records.pop_front();
                count += 1;
            } else {
                break;
            }
        }
        self.evicted += count as u64;
        count
    }

    /// Records no older than `max_age_ms`, most recent first.
    pub fn recent(&mut self, max_age_ms: i64) -> impl Iterator<Item = &SignalRecord> + '_ {
        self.recent_at(now_ms(), max_age_ms)
    }

    /// Like `recent`, against an explicit clock.
    ///
    /// Each call yields an independent iterator over the current window.
    pub fn recent_at(&mut self, now: i64, max_age_ms: i64) -> impl Iterator<Item = &SignalRecord> + '_ {
        self.evict_expired(now);
        self.records
            .iter()
            .rev()
            .filter(move |r| now - r.timestamp <= max_age_ms)
    }

    /// The whole retention window at `now`, most recent first.
    pub fn window_at(&mut self, now: i64) -> Vec<SignalRecord> {
        let retention = self.retention_ms;
        self.recent_at(now, retention).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn retention_ms(&self) -> i64 {
        self.retention_ms
    }

    /// Appends refused for lack of balance
    pub fn refused(&self) -> u64 {
        self.refused
    }

    /// Records dropped by age or length cap
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
