//! Sweep phase.
use crate::catalog::Version;
use crate::reachability::ReachabilityIndex;

/// Select the untagged versions that nothing in `reachable` still needs, in discovery order.
///
/// `reachable` must already cover the whole scope. Deleting one candidate never changes
/// whether another is reachable.
pub fn select_candidates(untagged: &[Version], reachable: &ReachabilityIndex) -> Vec<Version> {
    untagged
        .iter()
        .filter(|v| !v.is_tagged())
        .filter(|v| {
            let keep = reachable.retains(v);
            if keep {
                tracing::debug!(
                    "retaining {}@{}: referenced by a manifest list",
                    v.package.coordinate(),
                    v.name
                );
            }
            !keep
        })
        .cloned()
        .collect()
}
