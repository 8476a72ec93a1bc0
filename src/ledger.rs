//! Resource ledger gating expensive pipeline work.
//!
//! A single scalar "energy" balance. Spending never takes the balance below
//! zero and a refused spend leaves it untouched; rewards are unbounded. The
//! ledger is shared behind an `Arc` and its lock is only held for the
//! duration of one synchronous check-then-act, never across an `.await`.

use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TemporaError};

/// Point-in-time view of the ledger for merged state and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub balance: f64,
    pub total_spent: f64,
    pub total_rewarded: f64,
    pub refused_spends: u64,
}

#[derive(Debug, Default)]
struct LedgerState {
    balance: f64,
    total_spent: f64,
    total_rewarded: f64,
    refused_spends: u64,
}

/// Shared energy budget.
#[derive(Debug, Default)]
pub struct ResourceLedger {
    state: Mutex<LedgerState>,
}

impl ResourceLedger {
    /// Create a ledger with a starting balance (negative or non-finite input starts at zero).
    pub fn new(initial_balance: f64) -> Self {
        let balance = if initial_balance.is_finite() { initial_balance.max(0.0) } else { 0.0 };
        Self {
            state: Mutex::new(LedgerState {
                balance,
                ..LedgerState::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        // The state is plain numbers; a panic elsewhere cannot leave it half-written.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Spend `amount` if the balance covers it.
    ///
    /// Returns false without mutating the balance when it does not, or when
    /// `amount` is negative or not finite.
    pub fn try_spend(&self, amount: f64) -> bool {
        if !amount.is_finite() || amount < 0.0 {
            return false;
        }
        let mut state = self.lock();
        if state.balance < amount {
            state.refused_spends += 1;
            return false;
        }
        state.balance -= amount;
        state.total_spent += amount;
        true
    }

    /// Like `try_spend`, but reports a refusal as `InsufficientResource` naming the operation.
    pub fn spend_for(&self, operation: &str, amount: f64) -> Result<()> {
        if self.try_spend(amount) {
            return Ok(());
        }
        Err(TemporaError::InsufficientResource {
            operation: operation.to_string(),
            required: amount,
            available: self.balance(),
        })
    }

    /// Add to the balance. Always succeeds; negative or non-finite amounts are ignored.
    pub fn reward(&self, amount: f64) {
        if !amount.is_finite() || amount <= 0.0 {
            return;
        }
        let mut state = self.lock();
        state.balance = (state.balance + amount).min(f64::MAX);
        state.total_rewarded = (state.total_rewarded + amount).min(f64::MAX);
    }

    /// Return a spend whose effect could not be committed.
    ///
    /// Unlike `reward`, this rolls back `total_spent` instead of counting a reward.
    pub fn refund(&self, amount: f64) {
        if !amount.is_finite() || amount <= 0.0 {
            return;
        }
        let mut state = self.lock();
        state.balance = (state.balance + amount).min(f64::MAX);
        state.total_spent = (state.total_spent - amount).max(0.0);
    }

    /// Current balance
    pub fn balance(&self) -> f64 {
        self.lock().balance
    }

    /// Balance plus lifetime counters
    pub fn snapshot(&self) -> LedgerSnapshot {
        let state = self.lock();
        LedgerSnapshot {
            balance: state.balance,
            total_spent: state.total_spent,
            total_rewarded: state.total_rewarded,
            refused_spends: state.refused_spends,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_clamps_negative_start() {
        assert_eq!(ResourceLedger::new(-5.0).balance(), 0.0);
        assert_eq!(ResourceLedger::new(f64::NAN).balance(), 0.0);
        assert_eq!(ResourceLedger::new(42.0).balance(), 42.0);
    }

    #[test]
    fn test_try_spend_success() {
        let ledger = ResourceLedger::new(10.0);
        assert!(ledger.try_spend(4.0));
        assert_eq!(ledger.balance(), 6.0);
        assert_eq!(ledger.snapshot().total_spent, 4.0);
    }

    #[test]
    fn test_try_spend_exact_balance() {
        let ledger = ResourceLedger::new(5.0);
        assert!(ledger.try_spend(5.0));
        assert_eq!(ledger.balance(), 0.0);
    }

    #[test]
    fn test_refused_spend_does_not_mutate() {
        let ledger = ResourceLedger::new(3.0);
        assert!(!ledger.try_spend(3.5));
        assert_eq!(ledger.balance(), 3.0);
        assert_eq!(ledger.snapshot().refused_spends, 1);
        assert_eq!(ledger.snapshot().total_spent, 0.0);
    }

    #[test]
    fn test_invalid_amounts_refused() {
        let ledger = ResourceLedger::new(3.0);
        assert!(!ledger.try_spend(-1.0));
        assert!(!ledger.try_spend(f64::INFINITY));
        assert_eq!(ledger.balance(), 3.0);
        ledger.reward(-10.0);
        ledger.reward(f64::NAN);
        assert_eq!(ledger.balance(), 3.0);
    }

    #[test]
    fn test_reward_unbounded() {
        let ledger = ResourceLedger::new(0.0);
        for _ in 0..1000 {
            ledger.reward(1000.0);
        }
        assert_eq!(ledger.balance(), 1_000_000.0);
    }

    #[test]
    fn test_refund_rolls_back_spend() {
        let ledger = ResourceLedger::new(10.0);
        assert!(ledger.try_spend(4.0));
        ledger.refund(4.0);
        let snap = ledger.snapshot();
        assert_eq!(snap.balance, 10.0);
        assert_eq!(snap.total_spent, 0.0);
        assert_eq!(snap.total_rewarded, 0.0);
    }

    #[test]
    fn test_spend_for_reports_operation() {
        let ledger = ResourceLedger::new(1.0);
        let err = ledger.spend_for("plan.step", 3.0).unwrap_err();
        match err {
            TemporaError::InsufficientResource {
                operation,
                required,
                available,
            } => {
                assert_eq!(operation, "plan.step");
                assert_eq!(required, 3.0);
                assert_eq!(available, 1.0);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_balance_never_negative_over_mixed_sequence() {
        let ledger = ResourceLedger::new(7.0);
        let ops: [(bool, f64); 10] = [
            (true, 3.0),
            (true, 3.0),
            (true, 3.0),
            (false, 2.5),
            (true, 0.5),
            (true, 4.0),
            (false, 0.25),
            (true, 1.0),
            (true, 9.0),
            (true, 0.0),
        ];
        for (spend, amount) in ops {
            let before = ledger.balance();
            if spend {
                let ok = ledger.try_spend(amount);
                if !ok {
                    assert_eq!(ledger.balance(), before);
                }
            } else {
                ledger.reward(amount);
            }
            assert!(ledger.balance() >= 0.0);
        }
    }

    #[test]
    fn test_concurrent_spends_never_overdraw() {
        use std::sync::Arc;
        use std::thread;

        let ledger = Arc::new(ResourceLedger::new(100.0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = ledger.clone();
                thread::spawn(move || (0..50).filter(|_| ledger.try_spend(1.0)).count())
            })
            .collect();
        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(granted, 100);
        assert_eq!(ledger.balance(), 0.0);
    }
}
