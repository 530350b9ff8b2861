//! Plan types produced by the planner and consumed by the packer.

use serde::{Deserialize, Serialize};

use batchgrid_core::{OperationKind, TargetId, TargetState};

/// What a plan does to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanKind {
    /// Push the penalty level back to its floor.
    PrepPenalty,
    /// Restore the resource to its max.
    PrepResource,
    /// Four-phase extract/correct/restore/correct batch.
    Batch,
}

/// Position of a phase within a plan.
///
/// Prep plans reuse `CorrectPrimary` (penalty prep) and `Restore`
/// (resource prep) for their single phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseRole {
    Extract,
    CorrectPrimary,
    Restore,
    CorrectSecondary,
}

impl PhaseRole {
    /// Landing order of a full batch.
    pub const BATCH_ORDER: [PhaseRole; 4] = [
        PhaseRole::Extract,
        PhaseRole::CorrectPrimary,
        PhaseRole::Restore,
        PhaseRole::CorrectSecondary,
    ];

    pub fn operation(&self) -> OperationKind {
        match self {
            PhaseRole::Extract => OperationKind::Extract,
            PhaseRole::CorrectPrimary | PhaseRole::CorrectSecondary => OperationKind::Correct,
            PhaseRole::Restore => OperationKind::Restore,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PhaseRole::Extract => "extract",
            PhaseRole::CorrectPrimary => "correct_primary",
            PhaseRole::Restore => "restore",
            PhaseRole::CorrectSecondary => "correct_secondary",
        }
    }
}

impl std::fmt::Display for PhaseRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One operation of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub role: PhaseRole,
    pub thread_count: u32,
    /// Delay after the dispatch instant before the operation starts.
    pub start_delay_ms: f64,
    /// `thread_count` times the per-thread cost of the operation.
    pub capacity_cost: f64,
}

impl Phase {
    pub fn operation(&self) -> OperationKind {
        self.role.operation()
    }

    /// Time after the dispatch instant at which this phase lands.
    pub fn completion_ms(&self, target: &TargetState) -> f64 {
        self.start_delay_ms + target.latency_ms(self.operation())
    }
}

/// Work planned for one target in one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub target_id: TargetId,
    pub kind: PlanKind,
    /// Active phases in landing order.
    pub phases: Vec<Phase>,
    pub total_capacity_cost: f64,
    /// Resource expected per batch; zero for prep plans.
    pub expected_yield: f64,
}

impl Plan {
    pub fn phase(&self, role: PhaseRole) -> Option<&Phase> {
        self.phases.iter().find(|p| p.role == role)
    }

    pub fn is_batch(&self) -> bool {
        self.kind == PlanKind::Batch
    }

    /// Only single-phase prep plans may be spread over several nodes.
    pub fn is_splittable(&self) -> bool {
        !self.is_batch() && self.phases.len() == 1
    }

    pub fn total_threads(&self) -> u64 {
        self.phases.iter().map(|p| u64::from(p.thread_count)).sum()
    }
}

/// Sort plans so the largest expected yield comes first.
///
/// The sort is stable: plans with equal yield (every prep plan) keep the
/// order they were produced in.
pub fn rank_plans(plans: &mut [Plan]) {
    plans.sort_by(|a, b| {
        b.expected_yield
            .partial_cmp(&a.expected_yield)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}
