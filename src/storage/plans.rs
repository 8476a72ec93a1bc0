//! Plan persistence.
//!
//! `PlanStore` is the seam the execution tracker saves through. It is object
//! safe so the tracker can hold any backend behind an `Arc<dyn PlanStore>`.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use super::jsonl::JsonlStorage;
use super::traits::{Filter, HasId, Storage};
use crate::domain::{Plan, PlanStatus};
use crate::error::{Result, TemporaError};

const PLANS: &str = "plans";

impl HasId for Plan {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Durable home for plans.
pub trait PlanStore: Send + Sync {
    /// Persist the plan, replacing any previous version. Returns its id.
    fn save(&self, plan: &Plan) -> Result<String>;

    /// Load a plan by id. Fails with `PlanNotFound` when absent.
    fn load(&self, plan_id: &str) -> Result<Plan>;

    /// All stored plans, optionally restricted to one status.
    fn list(&self, status: Option<PlanStatus>) -> Result<Vec<Plan>>;
}

/// `PlanStore` over any record `Storage`.
pub struct StoragePlanStore<S: Storage> {
    storage: S,
}

/// Plans kept as `plans.jsonl` in a directory.
pub type JsonlPlanStore = StoragePlanStore<JsonlStorage>;

impl<S: Storage> StoragePlanStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }
}

impl JsonlPlanStore {
    /// Open the plan store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(JsonlStorage::new(dir)?))
    }
}

impl<S: Storage> PlanStore for StoragePlanStore<S> {
    fn save(&self, plan: &Plan) -> Result<String> {
        self.storage.upsert(PLANS, plan)?;
        tracing::debug!(plan_id = %plan.id, status = %plan.status, "plan saved");
        Ok(plan.id.clone())
    }

    fn load(&self, plan_id: &str) -> Result<Plan> {
        self.storage
            .get(PLANS, plan_id)?
            .ok_or_else(|| TemporaError::PlanNotFound(plan_id.to_string()))
    }

    fn list(&self, status: Option<PlanStatus>) -> Result<Vec<Plan>> {
        let filters: Vec<Filter> = status.into_iter().map(|s| Filter::eq("status", s)).collect();
        let mut plans: Vec<Plan> = self.storage.query(PLANS, &filters)?;
        plans.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(plans)
    }
}

/// Process-local store. Plans do not outlive the process.
#[derive(Debug, Default)]
pub struct MemoryPlanStore {
    plans: Mutex<BTreeMap<String, Plan>>,
}

impl MemoryPlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Plan>>> {
        self.plans.lock().map_err(|e| TemporaError::Persistence(e.to_string()))
    }
}

impl PlanStore for MemoryPlanStore {
    fn save(&self, plan: &Plan) -> Result<String> {
        self.lock()?.insert(plan.id.clone(), plan.clone());
        Ok(plan.id.clone())
    }

    fn load(&self, plan_id: &str) -> Result<Plan> {
        self.lock()?
            .get(plan_id)
            .cloned()
            .ok_or_else(|| TemporaError::PlanNotFound(plan_id.to_string()))
    }

    fn list(&self, status: Option<PlanStatus>) -> Result<Vec<Plan>> {
        let mut plans: Vec<Plan> = self
            .lock()?
            .values()
            .filter(|p| status.is_none_or(|s| p.status == s))
            .cloned()
            .collect();
        plans.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(plans)
    }
}
