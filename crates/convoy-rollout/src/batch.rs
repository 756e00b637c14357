//! Update batches.
//!
//! An ordered plan list is split into one canary batch followed by batches
//! of at most `max_in_flight` plans. Batch boundaries never reorder plans.

use std::fmt;

use serde::Serialize;
use tracing::debug;

use convoy_core::UpdateConfig;

/// Kind of an update batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchKind {
    /// Updated first; the rollout stops if any fails.
    Canary,
    Regular,
}

impl fmt::Display for BatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchKind::Canary => f.write_str("canary"),
            BatchKind::Regular => f.write_str("regular"),
        }
    }
}

/// A run of plans updated together.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateBatch<T> {
    pub kind: BatchKind,
    pub items: Vec<T>,
}

/// Split `ordered` into batches per `config`.
///
/// A `max_in_flight` of zero is treated as one.
pub fn plan_batches<T>(ordered: Vec<T>, config: UpdateConfig) -> Vec<UpdateBatch<T>> {
    let in_flight = config.max_in_flight.max(1) as usize;
    let mut rest = ordered.into_iter().peekable();
    let mut batches = Vec::new();

    let canaries: Vec<T> = rest.by_ref().take(config.canaries as usize).collect();
    if !canaries.is_empty() {
        batches.push(UpdateBatch {
            kind: BatchKind::Canary,
            items: canaries,
        });
    }

    while rest.peek().is_some() {
        let items: Vec<T> = rest.by_ref().take(in_flight).collect();
        batches.push(UpdateBatch {
            kind: BatchKind::Regular,
            items,
        });
    }

    debug!(
        batches = batches.len(),
        canaries = config.canaries,
        max_in_flight = in_flight,
        "planned update batches"
    );
    batches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(canaries: u32, max_in_flight: u32) -> UpdateConfig {
        UpdateConfig {
            canaries,
            max_in_flight,
        }
    }

    fn sizes<T>(batches: &[UpdateBatch<T>]) -> Vec<(BatchKind, usize)> {
        batches.iter().map(|b| (b.kind, b.items.len())).collect()
    }

    #[test]
    fn canary_then_in_flight_batches() {
        let batches = plan_batches((0..6).collect::<Vec<i32>>(), config(1, 2));
        assert_eq!(
            sizes(&batches),
            vec![
                (BatchKind::Canary, 1),
                (BatchKind::Regular, 2),
                (BatchKind::Regular, 2),
                (BatchKind::Regular, 1),
            ]
        );
        let flat: Vec<i32> = batches.into_iter().flat_map(|b| b.items).collect();
        assert_eq!(flat, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn no_canaries() {
        let batches = plan_batches(vec!["a", "b", "c"], config(0, 3));
        assert_eq!(sizes(&batches), vec![(BatchKind::Regular, 3)]);
    }

    #[test]
    fn canaries_exceeding_plans() {
        let batches = plan_batches(vec!["a", "b"], config(5, 1));
        assert_eq!(sizes(&batches), vec![(BatchKind::Canary, 2)]);
    }

    #[test]
    fn zero_in_flight_still_progresses() {
        let batches = plan_batches(vec![1, 2], config(0, 0));
        assert_eq!(sizes(&batches), vec![(BatchKind::Regular, 1), (BatchKind::Regular, 1)]);
    }

    #[test]
    fn empty_input_has_no_batches() {
        assert!(plan_batches(Vec::<u8>::new(), UpdateConfig::default()).is_empty());
    }

    #[test]
    fn batch_kind_serializes_lowercase() {
        let json = serde_json::to_string(&UpdateBatch {
            kind: BatchKind::Canary,
            items: vec![1],
        })
        .unwrap();
        assert_eq!(json, r#"{"kind":"canary","items":[1]}"#);
    }
}
