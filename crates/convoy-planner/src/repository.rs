//! Instance repository: creates and fetches the instances plans act on.

use std::collections::BTreeMap;

use tracing::debug;

use convoy_core::{DesiredInstance, ExistingInstance};

use crate::error::PlannerResult;
use crate::plan::InstanceHandle;
use crate::snapshot::AgentState;

/// Where instance handles come from.
pub trait InstanceRepository {
    /// Handle for an existing instance reused by a desired slot.
    fn fetch_existing(
        &mut self,
        desired: &DesiredInstance,
        existing: &ExistingInstance,
        snapshot: Option<&AgentState>,
    ) -> PlannerResult<InstanceHandle>;

    /// Handle for a new instance at `index`.
    fn create(&mut self, desired: &DesiredInstance, index: u32) -> PlannerResult<InstanceHandle>;
}

type UuidGenerator = Box<dyn FnMut() -> String + Send>;

/// Repository that keeps handles in memory, keyed by uuid.
pub struct InMemoryRepository {
    handles: BTreeMap<String, InstanceHandle>,
    next_uuid: UuidGenerator,
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::with_uuid_generator(|| uuid::Uuid::new_v4().to_string())
    }

    /// Repository minting uuids from `generator`, for reproducible plans.
    pub fn with_uuid_generator(generator: impl FnMut() -> String + Send + 'static) -> Self {
        Self {
            handles: BTreeMap::new(),
            next_uuid: Box::new(generator),
        }
    }

    pub fn get(&self, uuid: &str) -> Option<&InstanceHandle> {
        self.handles.get(uuid)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl InstanceRepository for InMemoryRepository {
    fn fetch_existing(
        &mut self,
        desired: &DesiredInstance,
        existing: &ExistingInstance,
        _snapshot: Option<&AgentState>,
    ) -> PlannerResult<InstanceHandle> {
        let handle = InstanceHandle {
            uuid: existing.uuid.clone(),
            job: desired.job.clone(),
            index: desired.index.unwrap_or(existing.index),
            az: desired.az.clone(),
            bootstrap: existing.bootstrap,
        };
        if existing.job_name != desired.job {
            debug!(uuid = %handle.uuid, from = %existing.job_name, to = %desired.job, "rehoming migrated instance");
        }
        self.handles.insert(handle.uuid.clone(), handle.clone());
        Ok(handle)
    }

    fn create(&mut self, desired: &DesiredInstance, index: u32) -> PlannerResult<InstanceHandle> {
        let handle = InstanceHandle {
            uuid: (self.next_uuid)(),
            job: desired.job.clone(),
            index,
            az: desired.az.clone(),
            bootstrap: false,
        };
        debug!(job = %handle.job, uuid = %handle.uuid, index, "created instance");
        self.handles.insert(handle.uuid.clone(), handle.clone());
        Ok(handle)
    }
}

/// Sequential uuids `{prefix}-0`, `{prefix}-1`, ...
pub fn sequential_uuids(prefix: &str) -> impl FnMut() -> String + Send + 'static {
    let prefix = prefix.to_string();
    let mut next = 0u64;
    move || {
        let uuid = format!("{prefix}-{next}");
        next += 1;
        uuid
    }
}
