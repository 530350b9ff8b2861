//! One scheduling tick: plan, rank, pack.
//!
//! `tick` is a pure function of the registry and the previous state. It
//! performs no I/O and never sleeps; the loop in `scheduler` owns both.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use batchgrid_core::TargetId;
use batchgrid_placement::{DispatchSet, pack, usable_capacity_models};
use batchgrid_planner::{BatchPlanner, Plan, PlanOptions, ThreadAnalysis, rank_plans};

use crate::registry::Registry;

/// Consecutive deferrals after which a target is reported as starved.
const STARVED_AFTER: u32 = 10;

/// State carried from one tick to the next.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerState {
    /// Ticks completed so far.
    pub cycle: u64,
    /// Targets whose plan did not fully fit, with the number of
    /// consecutive cycles it has not fit.
    pub deferred: BTreeMap<TargetId, u32>,
}

impl SchedulerState {
    pub fn is_deferred(&self, id: &str) -> bool {
        self.deferred.contains_key(id)
    }
}

/// Everything one tick decided.
#[derive(Debug, Clone)]
pub struct TickOutput {
    /// Plans in ranked order.
    pub plans: Vec<Plan>,
    pub dispatch_set: DispatchSet,
    pub next_state: SchedulerState,
}

/// Plan every viable target, rank by expected yield, and pack onto the
/// registry's usable nodes.
pub fn tick<A: ThreadAnalysis>(
    registry: &Registry,
    state: &SchedulerState,
    planner: &BatchPlanner<A>,
    options: PlanOptions,
) -> TickOutput {
    let mut plans: Vec<Plan> = registry
        .viable_targets(planner.config())
        .map(|t| planner.plan(t, options))
        .collect();
    rank_plans(&mut plans);

    let mut nodes = usable_capacity_models(registry.nodes());
    let dispatch_set = pack(&plans, &mut nodes, planner.costs());

    let mut deferred = BTreeMap::new();
    for report in dispatch_set.deferred() {
        let streak = state.deferred.get(&report.target_id).copied().unwrap_or(0) + 1;
        if streak == STARVED_AFTER {
            warn!(target = %report.target_id, cycles = streak, "target repeatedly deferred for capacity");
        }
        deferred.insert(report.target_id.clone(), streak);
    }

    debug!(
        cycle = state.cycle + 1,
        plans = plans.len(),
        nodes = nodes.len(),
        dispatches = dispatch_set.dispatches.len(),
        deferred = deferred.len(),
        "tick complete"
    );

    TickOutput {
        plans,
        dispatch_set,
        next_state: SchedulerState {
            cycle: state.cycle + 1,
            deferred,
        },
    }
}
