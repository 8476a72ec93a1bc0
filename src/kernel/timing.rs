//! Cadence, frequency measurement and rhythm monitoring.

use std::collections::VecDeque;

use tokio::time::Instant;

const PHASE_EPSILON: f64 = 1e-9;

/// Decides on which master cycles a loop is due.
///
/// A phase accumulator: every master cycle adds `target_hz / master_hz`
/// (capped at 1) and the loop is due whenever a whole step has built up.
/// The first master cycle is always due. Over any N master cycles a loop
/// runs `ceil(N * ratio)` times, so a 5 Hz loop under a 10 Hz master runs on
/// cycles 1, 3, 5, ...
#[derive(Debug, Clone, PartialEq)]
pub struct Cadence {
    ratio: f64,
    phase: f64,
}

impl Cadence {
    pub fn new(target_hz: f64, master_hz: f64) -> Self {
        let ratio = if master_hz > 0.0 { (target_hz / master_hz).clamp(0.0, 1.0) } else { 1.0 };
        Self { ratio, phase: 1.0 }
    }

    /// Fraction of master cycles the loop runs on
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Advance one master cycle; true if the loop is due on it.
    pub fn tick(&mut self) -> bool {
        let due = self.phase >= 1.0 - PHASE_EPSILON;
        if due {
            self.phase -= 1.0;
        }
        self.phase += self.ratio;
        due
    }
}

/// Achieved frequency over a sliding window of tick instants.
#[derive(Debug, Clone)]
pub struct FrequencyMeter {
    ticks: VecDeque<Instant>,
    capacity: usize,
}

impl FrequencyMeter {
    pub fn new(capacity: usize) -> Self {
        Self {
            ticks: VecDeque::with_capacity(capacity.max(2)),
            capacity: capacity.max(2),
        }
    }

    pub fn record(&mut self, at: Instant) {
        if self.ticks.len() == self.capacity {
            self.ticks.pop_front();
        }
        self.ticks.push_back(at);
    }

    /// Mean ticks per second over the window; None until two ticks exist or
    /// while they share an instant.
    pub fn hz(&self) -> Option<f64> {
        let first = self.ticks.front()?;
        let last = self.ticks.back()?;
        let span = last.duration_since(*first).as_secs_f64();
        if self.ticks.len() < 2 || span <= 0.0 {
            return None;
        }
        Some((self.ticks.len() - 1) as f64 / span)
    }

    /// Largest deviation of one interval from `period`, as a fraction of it.
    pub fn jitter(&self, period: std::time::Duration) -> Option<f64> {
        let period = period.as_secs_f64();
        if self.ticks.len() < 2 || period <= 0.0 {
            return None;
        }
        self.ticks
            .iter()
            .zip(self.ticks.iter().skip(1))
            .map(|(a, b)| (b.duration_since(*a).as_secs_f64() - period).abs() / period)
            .reduce(f64::max)
    }

    pub fn reset(&mut self) {
        self.ticks.clear();
    }
}

/// Change in rhythm reported by `RhythmMonitor::observe`.
#[derive(Debug, Clone, PartialEq)]
pub enum RhythmChange {
    Degraded { measured_hz: f64, consecutive: u32 },
    Restored { measured_hz: f64 },
}

/// Watches the measured master rate for sustained slowness.
///
/// Reports `Degraded` once per episode, when the rate has been below
/// `critical_hz` for more than `degraded_after` consecutive cycles, and
/// `Restored` on the first healthy cycle after that.
#[derive(Debug, Clone)]
pub struct RhythmMonitor {
    critical_hz: f64,
    degraded_after: u32,
    consecutive: u32,
    degraded: bool,
}

impl RhythmMonitor {
    pub fn new(critical_hz: f64, degraded_after: u32) -> Self {
        Self {
            critical_hz,
            degraded_after,
            consecutive: 0,
            degraded: false,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn observe(&mut self, measured_hz: f64) -> Option<RhythmChange> {
        if measured_hz < self.critical_hz {
            self.consecutive = self.consecutive.saturating_add(1);
            if !self.degraded && self.consecutive > self.degraded_after {
                self.degraded = true;
                return Some(RhythmChange::Degraded {
                    measured_hz,
                    consecutive: self.consecutive,
                });
            }
            return None;
        }

        self.consecutive = 0;
        if self.degraded {
            self.degraded = false;
            return Some(RhythmChange::Restored { measured_hz });
        }
        None
    }
}
