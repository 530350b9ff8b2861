//! Capacity packer — assigns plan phases to worker nodes.
//!
//! Plans arrive ranked by expected yield and are serviced strictly in that
//! order, one at a time:
//! 1. The first node (in the given order) with room for the whole plan gets
//!    every phase of it.
//! 2. Single-phase prep plans that fit nowhere are split thread-by-thread
//!    across nodes.
//! 3. Batches that fit nowhere are skipped for this pass. Splitting a batch
//!    would put its phases on differently-scheduled nodes and break the
//!    landing order.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use batchgrid_core::{CapacityCosts, NodeId, OperationKind, TargetId};
use batchgrid_planner::{Phase, PhaseRole, Plan, PlanKind};

use crate::capacity::NodeCapacityModel;

/// One phase (or part of one) assigned to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dispatch {
    pub node_id: NodeId,
    pub target_id: TargetId,
    pub role: PhaseRole,
    pub operation: OperationKind,
    pub thread_count: u32,
    pub start_delay_ms: f64,
}

/// How a plan was placed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PlanOutcome {
    /// The whole plan runs on one node.
    Assigned { node_id: NodeId },
    /// A prep plan spread over several nodes; `shortfall` threads found no
    /// room this pass.
    Split {
        nodes: Vec<NodeId>,
        placed: u32,
        shortfall: u32,
    },
    /// Nothing was dispatched; retry next cycle.
    InsufficientCapacity { required: f64, largest_free: f64 },
}

/// Per-plan result of a packing pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanReport {
    pub target_id: TargetId,
    pub kind: PlanKind,
    pub outcome: PlanOutcome,
}

impl PlanReport {
    /// Whether the plan needs another attempt next cycle.
    pub fn is_deferred(&self) -> bool {
        match &self.outcome {
            PlanOutcome::Assigned { .. } => false,
            PlanOutcome::Split { shortfall, .. } => *shortfall > 0,
            PlanOutcome::InsufficientCapacity { .. } => true,
        }
    }
}

/// Everything a packing pass decided.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchSet {
    /// Dispatches in the order they were decided.
    pub dispatches: Vec<Dispatch>,
    /// One report per input plan, in input order.
    pub reports: Vec<PlanReport>,
}

impl DispatchSet {
    pub fn deferred(&self) -> impl Iterator<Item = &PlanReport> {
        self.reports.iter().filter(|r| r.is_deferred())
    }

    pub fn dispatches_for_node<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Dispatch> {
        self.dispatches.iter().filter(move |d| d.node_id == node_id)
    }
}

/// Pack ranked plans onto nodes, debiting the node models as it goes.
///
/// `plans` must already be sorted by descending expected yield. Nodes are
/// scanned in slice order for every plan.
pub fn pack(plans: &[Plan], nodes: &mut [NodeCapacityModel], costs: &CapacityCosts) -> DispatchSet {
    let mut set = DispatchSet::default();

    for plan in plans {
        let outcome = match first_fit(plan, nodes) {
            Some(idx) => {
                let node = &mut nodes[idx];
                node.debit(plan.total_capacity_cost);
                for phase in &plan.phases {
                    push_dispatch(&mut set, &node.node_id, plan, phase, phase.thread_count);
                }
                debug!(
                    target = %plan.target_id,
                    node = %node.node_id,
                    kind = ?plan.kind,
                    cost = plan.total_capacity_cost,
                    "plan assigned to single node"
                );
                PlanOutcome::Assigned {
                    node_id: node.node_id.clone(),
                }
            }
            None if plan.is_splittable() => split(plan, nodes, costs, &mut set),
            None => {
                let largest_free = largest_free(nodes);
                warn!(
                    target = %plan.target_id,
                    required = plan.total_capacity_cost,
                    largest_free,
                    "insufficient capacity for batch, skipping this cycle"
                );
                PlanOutcome::InsufficientCapacity {
                    required: plan.total_capacity_cost,
                    largest_free,
                }
            }
        };

        set.reports.push(PlanReport {
            target_id: plan.target_id.clone(),
            kind: plan.kind,
            outcome,
        });
    }

    set
}

fn first_fit(plan: &Plan, nodes: &[NodeCapacityModel]) -> Option<usize> {
    nodes.iter().position(|n| n.fits(plan.total_capacity_cost))
}

fn largest_free(nodes: &[NodeCapacityModel]) -> f64 {
    nodes.iter().map(|n| n.capacity_free()).fold(0.0, f64::max)
}

fn split(
    plan: &Plan,
    nodes: &mut [NodeCapacityModel],
    costs: &CapacityCosts,
    set: &mut DispatchSet,
) -> PlanOutcome {
    let phase = &plan.phases[0];
    let per_thread = costs.per_thread(phase.operation());
    let mut remaining = phase.thread_count;
    let mut used_nodes = Vec::new();

    for node in nodes.iter_mut() {
        if remaining == 0 {
            break;
        }
        let to_place = node.max_threads(per_thread).min(remaining);
        if to_place == 0 {
            continue;
        }
        node.debit(f64::from(to_place) * per_thread);
        push_dispatch(set, &node.node_id, plan, phase, to_place);
        used_nodes.push(node.node_id.clone());
        remaining -= to_place;
        debug!(
            target = %plan.target_id,
            node = %node.node_id,
            threads = to_place,
            remaining,
            "placed prep threads"
        );
    }

    let placed = phase.thread_count - remaining;
    if placed == 0 {
        let largest_free = largest_free(nodes);
        warn!(
            target = %plan.target_id,
            threads = phase.thread_count,
            largest_free,
            "no node can take a single prep thread"
        );
        return PlanOutcome::InsufficientCapacity {
            required: plan.total_capacity_cost,
            largest_free,
        };
    }

    if remaining > 0 {
        warn!(
            target = %plan.target_id,
            placed,
            shortfall = remaining,
            "could not place all prep threads — insufficient capacity"
        );
    } else {
        info!(
            target = %plan.target_id,
            placed,
            nodes = used_nodes.len(),
            "prep plan split across nodes"
        );
    }

    PlanOutcome::Split {
        nodes: used_nodes,
        placed,
        shortfall: remaining,
    }
}

fn push_dispatch(set: &mut DispatchSet, node_id: &str, plan: &Plan, phase: &Phase, threads: u32) {
    if threads == 0 {
        return;
    }
    set.dispatches.push(Dispatch {
        node_id: node_id.to_string(),
        target_id: plan.target_id.clone(),
        role: phase.role,
        operation: phase.operation(),
        thread_count: threads,
        start_delay_ms: phase.start_delay_ms,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn costs() -> CapacityCosts {
        CapacityCosts {
            extract: 1.0,
            correct: 1.0,
            restore: 1.0,
        }
    }

    fn phase(role: PhaseRole, threads: u32, delay: f64) -> Phase {
        Phase {
            role,
            thread_count: threads,
            start_delay_ms: delay,
            capacity_cost: f64::from(threads),
        }
    }

    fn batch(id: &str, threads: [u32; 4], yield_: f64) -> Plan {
        let phases: Vec<Phase> = PhaseRole::BATCH_ORDER
            .iter()
            .zip(threads)
            .enumerate()
            .map(|(i, (role, t))| phase(*role, t, i as f64 * 100.0))
            .collect();
        let total = phases.iter().map(|p| p.capacity_cost).sum();
        Plan {
            target_id: id.to_string(),
            kind: PlanKind::Batch,
            phases,
            total_capacity_cost: total,
            expected_yield: yield_,
        }
    }

    fn prep(id: &str, kind: PlanKind, threads: u32) -> Plan {
        let role = match kind {
            PlanKind::PrepResource => PhaseRole::Restore,
            _ => PhaseRole::CorrectPrimary,
        };
        Plan {
            target_id: id.to_string(),
            kind,
            phases: vec![phase(role, threads, 0.0)],
            total_capacity_cost: f64::from(threads),
            expected_yield: 0.0,
        }
    }

    fn node(id: &str, total: f64) -> NodeCapacityModel {
        NodeCapacityModel::new(id, total, 0.0)
    }

    #[test]
    fn batch_fits_on_first_node_with_room() {
        let mut nodes = vec![node("small", 5.0), node("big", 100.0), node("bigger", 200.0)];
        let plans = vec![batch("t1", [4, 1, 3, 2], 10.0)];

        let set = pack(&plans, &mut nodes, &costs());

        assert_eq!(
            set.reports[0].outcome,
            PlanOutcome::Assigned {
                node_id: "big".to_string()
            }
        );
        assert_eq!(set.dispatches.len(), 4);
        assert!(set.dispatches.iter().all(|d| d.node_id == "big"));
        assert_eq!(nodes[1].capacity_used, 10.0);
        assert_eq!(nodes[2].capacity_used, 0.0);
    }

    #[test]
    fn dispatches_carry_phase_delays() {
        let mut nodes = vec![node("n1", 100.0)];
        let plans = vec![batch("t1", [4, 1, 3, 2], 10.0)];

        let set = pack(&plans, &mut nodes, &costs());

        let delays: Vec<f64> = set.dispatches.iter().map(|d| d.start_delay_ms).collect();
        assert_eq!(delays, vec![0.0, 100.0, 200.0, 300.0]);
        assert_eq!(set.dispatches[2].operation, OperationKind::Restore);
    }

    #[test]
    fn batch_is_never_split() {
        let mut nodes = vec![node("n1", 6.0), node("n2", 6.0)];
        let plans = vec![batch("t1", [4, 1, 3, 2], 10.0)];

        let set = pack(&plans, &mut nodes, &costs());

        assert!(set.dispatches.is_empty());
        assert!(matches!(
            set.reports[0].outcome,
            PlanOutcome::InsufficientCapacity { required, largest_free }
                if required == 10.0 && largest_free == 6.0
        ));
        assert!(set.reports[0].is_deferred());
        assert_eq!(nodes[0].capacity_used, 0.0);
        assert_eq!(nodes[1].capacity_used, 0.0);
    }

    #[test]
    fn prep_split_across_nodes() {
        let mut nodes = vec![node("n1", 4.0), node("n2", 3.0), node("n3", 10.0)];
        let plans = vec![prep("t1", PlanKind::PrepPenalty, 12)];

        let set = pack(&plans, &mut nodes, &costs());

        let threads: Vec<(String, u32)> = set
            .dispatches
            .iter()
            .map(|d| (d.node_id.clone(), d.thread_count))
            .collect();
        assert_eq!(
            threads,
            vec![
                ("n1".to_string(), 4),
                ("n2".to_string(), 3),
                ("n3".to_string(), 5)
            ]
        );
        assert!(matches!(
            &set.reports[0].outcome,
            PlanOutcome::Split { placed: 12, shortfall: 0, nodes } if nodes.len() == 3
        ));
        assert!(!set.reports[0].is_deferred());
    }

    #[test]
    fn prep_split_reports_shortfall() {
        let mut nodes = vec![node("n1", 4.0), node("n2", 3.5)];
        let plans = vec![prep("t1", PlanKind::PrepResource, 20)];

        let set = pack(&plans, &mut nodes, &costs());

        let placed: u32 = set.dispatches.iter().map(|d| d.thread_count).sum();
        assert_eq!(placed, 7);
        assert!(matches!(
            set.reports[0].outcome,
            PlanOutcome::Split { placed: 7, shortfall: 13, .. }
        ));
        assert!(set.reports[0].is_deferred());
        assert!(set.dispatches.iter().all(|d| d.role == PhaseRole::Restore));
    }

    #[test]
    fn prep_with_no_room_is_insufficient() {
        let mut nodes = vec![node("n1", 0.5)];
        let plans = vec![prep("t1", PlanKind::PrepPenalty, 3)];

        let set = pack(&plans, &mut nodes, &costs());

        assert!(set.dispatches.is_empty());
        assert!(matches!(
            set.reports[0].outcome,
            PlanOutcome::InsufficientCapacity { .. }
        ));
    }

    #[test]
    fn higher_yield_plans_claim_capacity_first() {
        let mut nodes = vec![node("n1", 10.0)];
        let plans = vec![
            batch("rich", [4, 1, 3, 2], 500.0),
            batch("poor", [4, 1, 3, 2], 5.0),
        ];

        let set = pack(&plans, &mut nodes, &costs());

        assert!(matches!(set.reports[0].outcome, PlanOutcome::Assigned { .. }));
        assert!(matches!(
            set.reports[1].outcome,
            PlanOutcome::InsufficientCapacity { .. }
        ));
        assert_eq!(set.deferred().count(), 1);
        assert_eq!(set.dispatches_for_node("n1").count(), 4);
    }

    #[test]
    fn zero_thread_phases_not_dispatched() {
        let mut nodes = vec![node("n1", 10.0)];
        let plans = vec![batch("t1", [2, 1, 0, 0], 1.0)];

        let set = pack(&plans, &mut nodes, &costs());

        assert_eq!(set.dispatches.len(), 2);
    }

    #[test]
    fn empty_inputs() {
        let mut nodes: Vec<NodeCapacityModel> = Vec::new();
        let set = pack(&[], &mut nodes, &costs());
        assert!(set.dispatches.is_empty());
        assert!(set.reports.is_empty());

        let plans = vec![batch("t1", [1, 1, 1, 1], 1.0)];
        let set = pack(&plans, &mut nodes, &costs());
        assert!(matches!(
            set.reports[0].outcome,
            PlanOutcome::InsufficientCapacity { largest_free, .. } if largest_free == 0.0
        ));
    }

    /// Seeded linear congruential generator.
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self, bound: u32) -> u32 {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((self.0 >> 33) % u64::from(bound)) as u32
        }
    }

    #[test]
    fn debits_never_exceed_totals_and_batches_are_whole() {
        let real_costs = CapacityCosts::default();
        let mut rng = Lcg(42);

        for _ in 0..200 {
            let mut nodes: Vec<NodeCapacityModel> = (0..1 + rng.next(5))
                .map(|i| {
                    let total = f64::from(rng.next(64));
                    let used = f64::from(rng.next(16)).min(total);
                    NodeCapacityModel::new(format!("n{i}"), total, used)
                })
                .collect();
            let before: Vec<f64> = nodes.iter().map(|n| n.capacity_used).collect();

            let plans: Vec<Plan> = (0..rng.next(8))
                .map(|i| {
                    let id = format!("t{i}");
                    let mut plan = match rng.next(3) {
                        0 => prep(&id, PlanKind::PrepPenalty, rng.next(40)),
                        1 => prep(&id, PlanKind::PrepResource, rng.next(40)),
                        _ => batch(
                            &id,
                            [1 + rng.next(8), rng.next(3), rng.next(8), rng.next(3)],
                            f64::from(rng.next(1000)),
                        ),
                    };
                    for ph in plan.phases.iter_mut() {
                        ph.capacity_cost =
                            f64::from(ph.thread_count) * real_costs.per_thread(ph.operation());
                    }
                    plan.total_capacity_cost = plan.phases.iter().map(|p| p.capacity_cost).sum();
                    plan
                })
                .collect();

            let set = pack(&plans, &mut nodes, &real_costs);

            for (n, used_before) in nodes.iter().zip(&before) {
                assert!(n.capacity_used <= n.capacity_total.max(*used_before) + 1e-9);
                let dispatched: f64 = set
                    .dispatches_for_node(&n.node_id)
                    .map(|d| f64::from(d.thread_count) * real_costs.per_thread(d.operation))
                    .sum();
                assert!((n.capacity_used - used_before - dispatched).abs() < 1e-6);
            }

            for (plan, report) in plans.iter().zip(&set.reports) {
                if plan.is_batch() {
                    let dispatched: u64 = set
                        .dispatches
                        .iter()
                        .filter(|d| d.target_id == plan.target_id)
                        .map(|d| u64::from(d.thread_count))
                        .sum();
                    match report.outcome {
                        PlanOutcome::Assigned { .. } => assert_eq!(dispatched, plan.total_threads()),
                        _ => assert_eq!(dispatched, 0),
                    }
                }
            }
        }
    }

    #[test]
    fn report_serializes_with_status_tag() {
        let report = PlanReport {
            target_id: "t1".to_string(),
            kind: PlanKind::Batch,
            outcome: PlanOutcome::Assigned {
                node_id: "n1".to_string(),
            },
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcome"]["status"], "assigned");
        assert_eq!(json["kind"], "batch");
    }
}
