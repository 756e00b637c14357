//! Availability zone placement.
//!
//! Desired slots are dealt round-robin over the job's AZs, with AZs that
//! already hold the most existing instances dealt first so existing
//! instances are reused before new ones are created. Each slot then takes
//! the lowest-indexed unclaimed existing instance of its AZ. Existing
//! instances left over are obsolete.

use std::collections::{BTreeMap, VecDeque};

use tracing::debug;

use convoy_core::{AzName, DesiredInstance, ExistingInstance};

use crate::placed::Placed;

/// Place `desired` slots over `azs`, reusing `existing` instances.
///
/// An empty `azs` disables AZ awareness: every slot gets no AZ and matching
/// is FIFO over the existing instances without an AZ. The result lists the
/// slots in input order followed by obsolete instances in index order.
pub fn place_by_zone(
    azs: &[AzName],
    desired: Vec<DesiredInstance>,
    mut existing: Vec<ExistingInstance>,
) -> Vec<Placed> {
    existing.sort_by_key(|e| e.index);

    let mut by_az: BTreeMap<Option<AzName>, VecDeque<ExistingInstance>> = BTreeMap::new();
    for instance in existing {
        by_az.entry(instance.az.clone()).or_default().push_back(instance);
    }

    let ordered = order_azs(azs, &by_az);

    let mut placed = Vec::with_capacity(desired.len());
    for (slot, instance) in desired.into_iter().enumerate() {
        let az = if ordered.is_empty() {
            None
        } else {
            Some(ordered[slot % ordered.len()].clone())
        };
        let instance = instance.with_az(az.as_deref());
        match by_az.get_mut(&az).and_then(VecDeque::pop_front) {
            Some(existing) => {
                debug!(job = %instance.job, slot, az = ?az, existing = %existing, "reusing existing instance");
                placed.push(Placed::Existing {
                    desired: instance,
                    existing,
                });
            }
            None => {
                debug!(job = %instance.job, slot, az = ?az, "placing new instance");
                placed.push(Placed::New(instance));
            }
        }
    }

    let mut obsolete: Vec<ExistingInstance> = by_az.into_values().flatten().collect();
    obsolete.sort_by_key(|e| e.index);
    for instance in &obsolete {
        debug!(existing = %instance, "existing instance is obsolete");
    }
    placed.extend(obsolete.into_iter().map(Placed::Obsolete));
    placed
}

/// AZs ordered by existing-instance count, descending; ties keep input order.
fn order_azs(
    azs: &[AzName],
    by_az: &BTreeMap<Option<AzName>, VecDeque<ExistingInstance>>,
) -> Vec<AzName> {
    let count = |az: &AzName| by_az.get(&Some(az.clone())).map_or(0, VecDeque::len);
    let mut ordered = azs.to_vec();
    ordered.sort_by(|a, b| count(b).cmp(&count(a)));
    ordered
}
