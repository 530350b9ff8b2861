//! Traits the scheduler consumes from the outside world.
//!
//! All of them are synchronous: a cycle never suspends mid-pass. Failures
//! are reported per call and the scheduler carries on with the rest.

use serde::{Deserialize, Serialize};

use batchgrid_core::{NodeId, NodeInfo, TargetId, TargetState};
use batchgrid_treasury::UpgradeMarket;

use crate::error::SchedulerResult;
use crate::executor::DispatchCommand;

/// Live target metrics.
pub trait TargetStateProvider {
    /// Every target currently worth tracking.
    fn target_ids(&self) -> Vec<TargetId>;

    fn target_state(&self, id: &str) -> SchedulerResult<TargetState>;
}

/// One capacity measurement of a worker node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeReading {
    pub capacity_total: f64,
    pub capacity_used: f64,
    pub has_access: bool,
}

impl NodeReading {
    pub fn into_node_info(self, id: impl Into<NodeId>) -> NodeInfo {
        NodeInfo {
            id: id.into(),
            capacity_total: self.capacity_total,
            capacity_used: self.capacity_used,
            has_access: self.has_access,
        }
    }
}

/// Live node capacity.
pub trait NodeCapacityProvider {
    /// Known nodes, in the order the packer should try them.
    fn node_ids(&self) -> Vec<NodeId>;

    fn node_capacity(&self, id: &str) -> SchedulerResult<NodeReading>;
}

/// Receives encoded dispatches. Fire and forget: the sink never reports
/// back when the work lands.
pub trait DispatchSink {
    fn dispatch(&mut self, command: &DispatchCommand) -> SchedulerResult<()>;
}

/// Money and the two upgrade markets.
pub trait Treasurer {
    fn funds(&self) -> f64;

    /// Production-unit market and worker-server market.
    fn markets(&mut self) -> (&mut dyn UpgradeMarket, &mut dyn UpgradeMarket);
}

/// Everything a [`Scheduler`](crate::Scheduler) drives.
pub trait Cluster: TargetStateProvider + NodeCapacityProvider + DispatchSink + Treasurer {}

impl<T> Cluster for T where T: TargetStateProvider + NodeCapacityProvider + DispatchSink + Treasurer {}
