use std::collections::BTreeMap;

use super::types::{IntervalClass, MonitoredTarget};

/// Batch membership for one scheduler pass: intervalClass -> owner -> urls.
pub type TargetGroups = BTreeMap<IntervalClass, BTreeMap<String, Vec<String>>>;

/// Groups targets into per-interval, per-owner batches. Pure so the fan-out
/// shape can be tested without timers; the scheduler derives its jobKeys
/// (owner x intervalClass) from the keys of the result.
pub fn group_targets(targets: &[MonitoredTarget]) -> TargetGroups {
    let mut groups = TargetGroups::new();

    for target in targets {
        groups
            .entry(target.interval)
            .or_default()
            .entry(target.owner.clone())
            .or_default()
            .push(target.url.clone());
    }

    groups
}
