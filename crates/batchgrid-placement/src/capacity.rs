//! Node capacity model for one packing pass.
//!
//! Built from a live measurement at the start of the pass, debited as the
//! packer assigns work, and thrown away afterwards. `capacity_used` only
//! ever grows while the pass runs.

use serde::{Deserialize, Serialize};

use batchgrid_core::NodeId;

/// Usable capacity of a single worker node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeCapacityModel {
    pub node_id: NodeId,
    pub capacity_total: f64,
    pub capacity_used: f64,
}

impl NodeCapacityModel {
    pub fn new(node_id: impl Into<NodeId>, capacity_total: f64, capacity_used: f64) -> Self {
        Self {
            node_id: node_id.into(),
            capacity_total,
            capacity_used,
        }
    }

    pub fn capacity_free(&self) -> f64 {
        (self.capacity_total - self.capacity_used).max(0.0)
    }

    /// Whether `cost` can be debited without exceeding the total.
    pub fn fits(&self, cost: f64) -> bool {
        cost <= self.capacity_free()
    }

    /// How many threads costing `cost_per_thread` each fit right now.
    pub fn max_threads(&self, cost_per_thread: f64) -> u32 {
        if cost_per_thread <= 0.0 {
            return 0;
        }
        let free = self.capacity_free();
        let mut threads = (free / cost_per_thread).floor().max(0.0).min(f64::from(u32::MAX)) as u32;
        // Guard against the product rounding above `free`.
        while threads > 0 && f64::from(threads) * cost_per_thread > free {
            threads -= 1;
        }
        threads
    }

    /// Record `cost` as used.
    pub fn debit(&mut self, cost: f64) {
        debug_assert!(self.fits(cost), "debit beyond free capacity on {}", self.node_id);
        self.capacity_used += cost;
    }
}
