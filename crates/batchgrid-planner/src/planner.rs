//! Batch planner — decides prep vs. batch and sizes every phase.
//!
//! The planner is a pure function of the target snapshot, the planner
//! config and the thread analysis. It never re-reads live state while
//! building a plan.

use tracing::debug;

use batchgrid_core::{CapacityCosts, PlannerConfig, TargetState};

use crate::analysis::ThreadAnalysis;
use crate::plan::{Phase, PhaseRole, Plan, PlanKind};
use crate::timing::batch_delays_ms;

/// Per-call planning switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanOptions {
    /// Run the target down: waive resource restoration entirely.
    pub drain_mode: bool,
}

/// Builds prep and batch plans for targets.
#[derive(Debug, Clone)]
pub struct BatchPlanner<A> {
    config: PlannerConfig,
    costs: CapacityCosts,
    analysis: A,
}

impl<A: ThreadAnalysis> BatchPlanner<A> {
    pub fn new(config: PlannerConfig, costs: CapacityCosts, analysis: A) -> Self {
        Self {
            config,
            costs,
            analysis,
        }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn costs(&self) -> &CapacityCosts {
        &self.costs
    }

    /// Options derived from the configured defaults.
    pub fn default_options(&self) -> PlanOptions {
        PlanOptions {
            drain_mode: self.config.drain_mode,
        }
    }

    fn penalty_settled(&self, target: &TargetState) -> bool {
        target.penalty_level <= target.penalty_floor + self.config.penalty_tolerance
    }

    fn resource_restored(&self, target: &TargetState) -> bool {
        target.resource_available >= target.resource_max * self.config.resource_threshold
    }

    /// Whether the target can take a batch right now.
    pub fn is_ready(&self, target: &TargetState, options: PlanOptions) -> bool {
        self.penalty_settled(target) && (options.drain_mode || self.resource_restored(target))
    }

    /// Build the plan for one target.
    pub fn plan(&self, target: &TargetState, options: PlanOptions) -> Plan {
        if self.is_ready(target, options) {
            return self.batch(target, options);
        }

        // Penalty correction takes priority over restoration.
        if !self.penalty_settled(target) {
            let threads = ceil_threads(
                (target.penalty_level - target.penalty_floor) / self.config.correction_per_thread,
            );
            debug!(
                target = %target.id,
                threads,
                penalty = target.penalty_level,
                floor = target.penalty_floor,
                "planned penalty prep"
            );
            return self.prep(target, PlanKind::PrepPenalty, PhaseRole::CorrectPrimary, threads);
        }

        // Not ready with a settled penalty can only mean the resource is low.
        let multiplier = target.resource_max / target.resource_available.max(1.0);
        let threads = ceil_threads(self.analysis.restore_threads_for(target, multiplier));
        debug!(
            target = %target.id,
            threads,
            available = target.resource_available,
            max = target.resource_max,
            "planned resource prep"
        );
        self.prep(target, PlanKind::PrepResource, PhaseRole::Restore, threads)
    }

    fn prep(&self, target: &TargetState, kind: PlanKind, role: PhaseRole, threads: u32) -> Plan {
        let phase = self.phase(role, threads, 0.0);
        Plan {
            target_id: target.id.clone(),
            kind,
            total_capacity_cost: phase.capacity_cost,
            phases: vec![phase],
            expected_yield: 0.0,
        }
    }

    fn batch(&self, target: &TargetState, options: PlanOptions) -> Plan {
        let f = self.config.extract_fraction;
        let cpt = self.config.correction_per_thread;

        // Extraction rounds down and is bounded by what the target holds;
        // everything sized against a deficit rounds up.
        let extract_raw = self
            .analysis
            .extract_threads_for(target, target.resource_max * f)
            .floor();
        let extract = if extract_raw >= 1.0 {
            extract_raw.min(f64::from(u32::MAX)) as u32
        } else {
            1
        };

        let correct_primary =
            ceil_threads(self.analysis.penalty_from_extract(extract, target) / cpt);

        let mut sized = vec![
            (PhaseRole::Extract, extract),
            (PhaseRole::CorrectPrimary, correct_primary),
        ];

        if !options.drain_mode {
            let restore = ceil_threads(self.analysis.restore_threads_for(target, 1.0 / (1.0 - f)));
            let correct_secondary =
                ceil_threads(self.analysis.penalty_from_restore(restore, target) / cpt);
            sized.push((PhaseRole::Restore, restore));
            sized.push((PhaseRole::CorrectSecondary, correct_secondary));
        }

        let roles: Vec<PhaseRole> = sized.iter().map(|(role, _)| *role).collect();
        let delays = batch_delays_ms(&roles, target, &self.config);

        let phases: Vec<Phase> = sized
            .into_iter()
            .zip(delays)
            .map(|((role, threads), delay)| self.phase(role, threads, delay))
            .collect();

        let total_capacity_cost = phases.iter().map(|p| p.capacity_cost).sum();
        let expected_yield =
            f64::from(extract) * target.resource_max * f * target.extract_chance;

        debug!(
            target = %target.id,
            extract,
            correct_primary,
            drain = options.drain_mode,
            cost = total_capacity_cost,
            expected_yield,
            "planned batch"
        );

        Plan {
            target_id: target.id.clone(),
            kind: PlanKind::Batch,
            phases,
            total_capacity_cost,
            expected_yield,
        }
    }

    fn phase(&self, role: PhaseRole, thread_count: u32, start_delay_ms: f64) -> Phase {
        Phase {
            role,
            thread_count,
            start_delay_ms,
            capacity_cost: f64::from(thread_count) * self.costs.per_thread(role.operation()),
        }
    }
}

/// Round a raw thread estimate up. NaN and negatives become zero.
fn ceil_threads(raw: f64) -> u32 {
    // `as` saturates: NaN -> 0, +inf -> u32::MAX.
    raw.ceil().max(0.0) as u32
}
