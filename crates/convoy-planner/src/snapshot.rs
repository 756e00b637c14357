//! Agent state snapshots.
//!
//! Instances without persisted IP rows predate reservation tracking; their
//! addresses are read back from what their agents report. Fetches run on a
//! bounded worker pool and planning waits for all of them. One failed fetch
//! fails the pass and cancels the fetches still running.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use convoy_core::ExistingInstance;

use crate::error::{PlannerError, PlannerResult};

/// State reported by one agent, keyed by top-level field.
pub type AgentState = BTreeMap<String, serde_json::Value>;

/// Reads the live state of an instance from its agent.
pub trait AgentStateSource: Send + Sync + 'static {
    fn get_state(
        &self,
        instance: &ExistingInstance,
    ) -> impl Future<Output = anyhow::Result<AgentState>> + Send;
}

/// Fetch agent state for every instance lacking persisted IP rows.
///
/// At most `workers` fetches run at once. The result is keyed by uuid.
pub async fn fetch_agent_states<S: AgentStateSource>(
    source: Arc<S>,
    instances: &[ExistingInstance],
    workers: usize,
) -> PlannerResult<HashMap<String, AgentState>> {
    let pending: Vec<ExistingInstance> = instances
        .iter()
        .filter(|i| i.ip_addresses.is_empty())
        .cloned()
        .collect();
    if pending.is_empty() {
        return Ok(HashMap::new());
    }

    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let states = Arc::new(Mutex::new(HashMap::with_capacity(pending.len())));
    let mut tasks = JoinSet::new();

    info!(instances = pending.len(), workers, "fetching agent states");
    for instance in pending {
        let source = Arc::clone(&source);
        let semaphore = Arc::clone(&semaphore);
        let states = Arc::clone(&states);
        tasks.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| PlannerError::Join(e.to_string()))?;
            let state = source
                .get_state(&instance)
                .await
                .map_err(|e| PlannerError::AgentSnapshot {
                    instance: instance.to_string(),
                    reason: format!("{e:#}"),
                })?;
            debug!(instance = %instance, fields = state.len(), "fetched agent state");
            states.lock().await.insert(instance.uuid.clone(), state);
            Ok::<(), PlannerError>(())
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let outcome = joined.map_err(|e| PlannerError::Join(e.to_string())).and_then(|r| r);
        if let Err(e) = outcome {
            warn!(error = %e, "agent state fetch failed, cancelling remaining fetches");
            tasks.abort_all();
            return Err(e);
        }
    }

    let states = std::mem::take(&mut *states.lock().await);
    Ok(states)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingSource {
        running: AtomicUsize,
        peak: AtomicUsize,
        fail_uuid: Option<String>,
    }

    impl AgentStateSource for CountingSource {
        async fn get_state(&self, instance: &ExistingInstance) -> anyhow::Result<AgentState> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            if self.fail_uuid.as_deref() == Some(instance.uuid.as_str()) {
                anyhow::bail!("agent unreachable");
            }
            let mut state = AgentState::new();
            state.insert("uuid".into(), serde_json::json!(instance.uuid));
            Ok(state)
        }
    }

    fn instances(n: u32) -> Vec<ExistingInstance> {
        (0..n)
            .map(|i| ExistingInstance::new("db", i, &format!("u{i}"), None))
            .collect()
    }

    #[tokio::test]
    async fn fetches_every_instance_within_worker_bound() {
        let source = Arc::new(CountingSource::default());
        let states = fetch_agent_states(Arc::clone(&source), &instances(12), 3).await.unwrap();
        assert_eq!(states.len(), 12);
        assert_eq!(states["u7"]["uuid"], serde_json::json!("u7"));
        assert!(source.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn instances_with_ip_rows_are_skipped() {
        let source = Arc::new(CountingSource::default());
        let mut found = instances(2);
        found[0] = found[0]
            .clone()
            .with_ip("private", "10.0.0.5".parse().unwrap(), convoy_core::AddressKind::Dynamic);
        let states = fetch_agent_states(source, &found, 4).await.unwrap();
        assert_eq!(states.keys().collect::<Vec<_>>(), vec!["u1"]);
    }

    #[tokio::test]
    async fn one_failure_fails_the_pass() {
        let source = Arc::new(CountingSource {
            fail_uuid: Some("u4".into()),
            ..Default::default()
        });
        let err = fetch_agent_states(source, &instances(8), 2).await.unwrap_err();
        match err {
            PlannerError::AgentSnapshot { instance, reason } => {
                assert!(instance.contains("u4"));
                assert!(reason.contains("unreachable"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
