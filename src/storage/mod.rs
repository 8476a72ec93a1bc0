//! Storage layer for Tempora.
//!
//! Generic JSONL record storage plus the plan store built on it. Plans are
//! the only records that survive a process restart.

mod jsonl;
mod plans;
mod traits;

pub use jsonl::JsonlStorage;
pub use plans::{JsonlPlanStore, MemoryPlanStore, PlanStore, StoragePlanStore};
pub use traits::{Filter, FilterOp, HasId, Storage};
