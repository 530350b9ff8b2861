//! Type conversions between registry node records and packer types.
//!
//! Bridges `batchgrid_core::NodeInfo` to the packer's `NodeCapacityModel`.

use batchgrid_core::NodeInfo;

use crate::capacity::NodeCapacityModel;

/// Convert a [`NodeInfo`] to a [`NodeCapacityModel`] for one packing pass.
pub fn node_info_to_capacity(node: &NodeInfo) -> NodeCapacityModel {
    NodeCapacityModel {
        node_id: node.id.clone(),
        capacity_total: node.capacity_total,
        capacity_used: node.capacity_used.min(node.capacity_total).max(0.0),
    }
}

/// Capacity models for every node the scheduler may use, in input order.
///
/// Nodes without access or with zero total capacity are dropped.
pub fn usable_capacity_models<'a>(
    nodes: impl IntoIterator<Item = &'a NodeInfo>,
) -> Vec<NodeCapacityModel> {
    nodes
        .into_iter()
        .filter(|n| n.is_usable())
        .map(node_info_to_capacity)
        .collect()
}
