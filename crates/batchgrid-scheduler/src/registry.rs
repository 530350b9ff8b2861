//! Registry of known nodes and targets.
//!
//! Owned by the caller and passed by reference into every tick. Nodes keep
//! the order the provider lists them in, which is the order the packer
//! tries them. Targets are keyed by id so planning order is stable.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use batchgrid_core::{CoreResult, NodeInfo, PlannerConfig, TargetId, TargetState};

use crate::providers::{NodeCapacityProvider, TargetStateProvider};

/// Counts from one registry refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshSummary {
    pub nodes: usize,
    pub targets: usize,
    pub node_failures: usize,
    pub target_failures: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    nodes: Vec<NodeInfo>,
    targets: BTreeMap<TargetId, TargetState>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Nodes ──────────────────────────────────────────────────────

    /// Insert or replace a node reading. New nodes go to the end.
    pub fn upsert_node(&mut self, node: NodeInfo) -> CoreResult<()> {
        node.validate()?;
        match self.nodes.iter_mut().find(|n| n.id == node.id) {
            Some(existing) => *existing = node,
            None => self.nodes.push(node),
        }
        Ok(())
    }

    pub fn nodes(&self) -> &[NodeInfo] {
        &self.nodes
    }

    // ── Targets ────────────────────────────────────────────────────

    /// Insert or replace a target snapshot. Invalid snapshots are refused.
    pub fn upsert_target(&mut self, target: TargetState) -> CoreResult<()> {
        target.validate()?;
        self.targets.insert(target.id.clone(), target);
        Ok(())
    }

    pub fn targets(&self) -> impl Iterator<Item = &TargetState> {
        self.targets.values()
    }

    /// Targets worth planning: some resource to take, and no operation
    /// slower than the configured ceiling.
    pub fn viable_targets<'a>(&'a self, config: &'a PlannerConfig) -> impl Iterator<Item = &'a TargetState> {
        self.targets()
            .filter(move |t| t.resource_max > 0.0 && t.slowest_latency_ms() <= config.max_action_time_ms)
    }

    // ── Refresh ────────────────────────────────────────────────────

    /// Replace every reading with a fresh one from `provider`.
    ///
    /// Nodes and targets the provider no longer lists are dropped. A failed
    /// or invalid reading drops that entry for this cycle and the refresh
    /// continues with the rest.
    pub fn refresh<P>(&mut self, provider: &P) -> RefreshSummary
    where
        P: NodeCapacityProvider + TargetStateProvider + ?Sized,
    {
        let mut summary = RefreshSummary::default();

        let mut nodes = Vec::new();
        for id in provider.node_ids() {
            let reading = provider
                .node_capacity(&id)
                .and_then(|r| {
                    let node = r.into_node_info(id.as_str());
                    node.validate()?;
                    Ok(node)
                });
            match reading {
                Ok(node) => nodes.push(node),
                Err(e) => {
                    warn!(node = %id, error = %e, "node capacity unavailable");
                    summary.node_failures += 1;
                }
            }
        }
        summary.nodes = nodes.len();
        self.nodes = nodes;

        let mut targets = BTreeMap::new();
        for id in provider.target_ids() {
            let state = provider.target_state(&id).and_then(|t| {
                t.validate()?;
                Ok(t)
            });
            match state {
                Ok(t) => {
                    targets.insert(t.id.clone(), t);
                }
                Err(e) => {
                    warn!(target = %id, error = %e, "target state unavailable");
                    summary.target_failures += 1;
                }
            }
        }
        summary.targets = targets.len();
        self.targets = targets;

        debug!(
            nodes = summary.nodes,
            targets = summary.targets,
            node_failures = summary.node_failures,
            target_failures = summary.target_failures,
            "registry refreshed"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{SchedulerError, SchedulerResult};
    use crate::providers::NodeReading;
    use batchgrid_core::{NodeId, TargetId};

    fn target(id: &str, max: f64, slowest: f64) -> TargetState {
        TargetState {
            id: id.to_string(),
            resource_max: max,
            resource_available: max,
            penalty_level: 1.0,
            penalty_floor: 1.0,
            latency_extract_ms: 1_000.0,
            latency_correct_ms: slowest,
            latency_restore_ms: 1_000.0,
            extract_chance: 0.5,
        }
    }

    fn node(id: &str, total: f64, has_access: bool) -> NodeInfo {
        NodeInfo {
            id: id.to_string(),
            capacity_total: total,
            capacity_used: 0.0,
            has_access,
        }
    }

    #[test]
    fn upsert_keeps_node_order() {
        let mut registry = Registry::new();
        registry.upsert_node(node("home", 64.0, true)).unwrap();
        registry.upsert_node(node("w-0", 8.0, true)).unwrap();
        registry.upsert_node(node("home", 128.0, true)).unwrap();

        let ids: Vec<_> = registry.nodes().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["home", "w-0"]);
        assert_eq!(registry.nodes()[0].capacity_total, 128.0);
    }

    #[test]
    fn invalid_target_refused() {
        let mut registry = Registry::new();
        let mut bad = target("t", 100.0, 1_000.0);
        bad.resource_available = 200.0;
        assert!(registry.upsert_target(bad).is_err());
        assert_eq!(registry.targets().count(), 0);
    }

    #[test]
    fn viable_targets_filter() {
        let mut registry = Registry::new();
        registry.upsert_target(target("ok", 1_000.0, 5_000.0)).unwrap();
        registry.upsert_target(target("empty", 0.0, 5_000.0)).unwrap();
        registry.upsert_target(target("slow", 1_000.0, 200_000.0)).unwrap();

        let config = PlannerConfig::default();
        let ids: Vec<_> = registry.viable_targets(&config).map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["ok"]);
    }

    struct FlakyProvider;

    impl NodeCapacityProvider for FlakyProvider {
        fn node_ids(&self) -> Vec<NodeId> {
            vec!["w-1".to_string(), "broken".to_string(), "home".to_string()]
        }

        fn node_capacity(&self, id: &str) -> SchedulerResult<NodeReading> {
            if id == "broken" {
                return Err(SchedulerError::NodeNotFound(id.to_string()));
            }
            Ok(NodeReading {
                capacity_total: 16.0,
                capacity_used: 2.0,
                has_access: true,
            })
        }
    }

    impl TargetStateProvider for FlakyProvider {
        fn target_ids(&self) -> Vec<TargetId> {
            vec!["beta".to_string(), "gone".to_string(), "alpha".to_string()]
        }

        fn target_state(&self, id: &str) -> SchedulerResult<TargetState> {
            if id == "gone" {
                return Err(SchedulerError::TargetNotFound(id.to_string()));
            }
            Ok(target(id, 1_000.0, 2_000.0))
        }
    }

    #[test]
    fn refresh_replaces_and_skips_failures() {
        let mut registry = Registry::new();
        registry.upsert_node(node("stale", 64.0, true)).unwrap();
        registry.upsert_target(target("old", 10.0, 1_000.0)).unwrap();

        let summary = registry.refresh(&FlakyProvider);

        assert_eq!(
            summary,
            RefreshSummary {
                nodes: 2,
                targets: 2,
                node_failures: 1,
                target_failures: 1,
            }
        );
        let node_ids: Vec<_> = registry.nodes().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(node_ids, vec!["w-1", "home"]);
        let target_ids: Vec<_> = registry.targets().map(|t| t.id.as_str()).collect();
        assert_eq!(target_ids, vec!["alpha", "beta"]);
        assert!(registry.targets().all(|t| t.id != "old"));
    }
}
