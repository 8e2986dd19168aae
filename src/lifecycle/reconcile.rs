//! Reconciliation of the upstream registry against a new snapshot.
//!
//! Upstreams are matched by name. A name present only in the new snapshot is
//! added, a name present only in the old one is removed, and a name whose
//! definition changed is replaced. Identical entries are left alone so their
//! pools keep serving.
//!
//! [`plan_against`] diffs against what the registry actually holds, so an
//! operation that failed is planned again on the next pass.

use std::collections::HashMap;

use crate::config::{Config, Upstream};
use crate::upstream::UpstreamRegistry;

/// The registry operations needed to move from one snapshot to another.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// Names to unregister, in old-snapshot order.
    pub remove: Vec<String>,
    /// Changed definitions of registered names, in new-snapshot order.
    pub replace: Vec<Upstream>,
    /// Definitions to register, in new-snapshot order.
    pub add: Vec<Upstream>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.remove.is_empty() && self.replace.is_empty() && self.add.is_empty()
    }
}

/// Diff the upstream lists of two snapshots.
pub fn plan(old: &Config, new: &Config) -> ReconcilePlan {
    diff(&old.upstreams, &new.upstreams)
}

/// Diff the registry's current contents against `new`.
pub fn plan_against(registry: &UpstreamRegistry, new: &Config) -> ReconcilePlan {
    diff(&registry.upstreams(), &new.upstreams)
}

fn diff(old: &[Upstream], new: &[Upstream]) -> ReconcilePlan {
    let next: HashMap<&str, &Upstream> = new.iter().map(|u| (u.name.as_str(), u)).collect();
    let prev: HashMap<&str, &Upstream> = old.iter().map(|u| (u.name.as_str(), u)).collect();

    let remove = old
        .iter()
        .filter(|u| !next.contains_key(u.name.as_str()))
        .map(|u| u.name.clone())
        .collect();

    let mut plan = ReconcilePlan {
        remove,
        ..Default::default()
    };
    for upstream in new {
        match prev.get(upstream.name.as_str()) {
            None => plan.add.push(upstream.clone()),
            Some(current) if *current != upstream => plan.replace.push(upstream.clone()),
            Some(_) => {}
        }
    }
    plan
}

/// Apply a plan to the registry: removes first, so that freed addresses can
/// be reused, then replacements, then adds.
///
/// Failures are logged and counted; the remaining operations still run. A
/// failed replacement leaves the old pool serving.
pub async fn apply(registry: &UpstreamRegistry, plan: ReconcilePlan) -> usize {
    let mut failures = 0;

    for name in &plan.remove {
        if let Err(e) = registry.remove(name).await {
            tracing::warn!(upstream = %name, error = %e, "Failed to remove upstream");
            failures += 1;
        }
    }

    for upstream in plan.replace {
        let name = upstream.name.clone();
        if let Err(e) = registry.replace(upstream).await {
            tracing::error!(upstream = %name, error = %e, "Failed to replace upstream");
            failures += 1;
        }
    }

    for upstream in plan.add {
        let name = upstream.name.clone();
        if let Err(e) = registry.add(upstream).await {
            tracing::error!(upstream = %name, error = %e, "Failed to add upstream");
            failures += 1;
        }
    }

    failures
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(upstreams: Vec<Upstream>) -> Config {
        Config {
            upstreams,
            ..Default::default()
        }
    }

    #[test]
    fn identical_snapshots_need_nothing() {
        let c = config(vec![Upstream::new("a", "127.0.0.1:7000")]);
        assert!(plan(&c, &c).is_empty());
    }

    #[test]
    fn adds_new_and_removes_vanished() {
        let old = config(vec![
            Upstream::new("a", "127.0.0.1:7000"),
            Upstream::new("b", "127.0.0.1:7001"),
        ]);
        let new = config(vec![
            Upstream::new("a", "127.0.0.1:7000"),
            Upstream::new("c", "127.0.0.1:7002"),
        ]);

        let p = plan(&old, &new);
        assert_eq!(p.remove, vec!["b".to_string()]);
        assert!(p.replace.is_empty());
        assert_eq!(p.add, vec![Upstream::new("c", "127.0.0.1:7002")]);
    }

    #[test]
    fn changed_definition_is_replaced() {
        let old = config(vec![Upstream::new("a", "127.0.0.1:7000")]);
        let mut changed = Upstream::new("a", "127.0.0.1:7000");
        changed.max_pool_size = 20;
        let new = config(vec![changed.clone()]);

        let p = plan(&old, &new);
        assert!(p.remove.is_empty());
        assert!(p.add.is_empty());
        assert_eq!(p.replace, vec![changed]);
    }

    #[test]
    fn empty_registry_plans_every_upstream() {
        let registry = UpstreamRegistry::new();
        let new = config(vec![Upstream::new("a", "127.0.0.1:7000")]);

        let p = plan_against(&registry, &new);
        assert_eq!(p.add, new.upstreams);
        assert!(p.remove.is_empty());
    }
}
