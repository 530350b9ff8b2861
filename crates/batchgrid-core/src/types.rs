//! Shared types used across Batchgrid crates.
//!
//! Targets and nodes are plain snapshots. They are produced fresh by the
//! providers at the start of every cycle and never mutated afterwards; the
//! planner and packer only ever see them through shared references.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Unique identifier for a target.
pub type TargetId = String;

/// Unique identifier for a worker node.
pub type NodeId = String;

/// Unique identifier for an owned production unit or server.
pub type UnitId = String;

/// Kind of remote operation a worker thread runs against a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Yield-producing operation; drains the target's resource.
    Extract,
    /// Lowers the target's penalty level.
    Correct,
    /// Replenishes the target's resource toward its max.
    Restore,
}

impl OperationKind {
    pub fn label(&self) -> &'static str {
        match self {
            OperationKind::Extract => "extract",
            OperationKind::Correct => "correct",
            OperationKind::Restore => "restore",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ── Target ────────────────────────────────────────────────────────

/// Snapshot of a single target's metrics for one planning cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetState {
    pub id: TargetId,
    pub resource_max: f64,
    pub resource_available: f64,
    pub penalty_level: f64,
    pub penalty_floor: f64,
    /// Time for an extract operation to land, in milliseconds.
    pub latency_extract_ms: f64,
    /// Time for a correct operation to land, in milliseconds.
    pub latency_correct_ms: f64,
    /// Time for a restore operation to land, in milliseconds.
    pub latency_restore_ms: f64,
    /// Probability in `[0, 1]` that an extraction succeeds at the current
    /// penalty level.
    pub extract_chance: f64,
}

impl TargetState {
    /// Completion latency of the given operation against this target.
    pub fn latency_ms(&self, op: OperationKind) -> f64 {
        match op {
            OperationKind::Extract => self.latency_extract_ms,
            OperationKind::Correct => self.latency_correct_ms,
            OperationKind::Restore => self.latency_restore_ms,
        }
    }

    /// Latency of the slowest of the three operations.
    pub fn slowest_latency_ms(&self) -> f64 {
        self.latency_extract_ms
            .max(self.latency_correct_ms)
            .max(self.latency_restore_ms)
    }

    /// Check the numeric invariants of the snapshot.
    ///
    /// Comparisons are written so that NaN fails every check.
    pub fn validate(&self) -> CoreResult<()> {
        let fail = |reason: &str| {
            Err(CoreError::InvalidTarget {
                id: self.id.clone(),
                reason: reason.to_string(),
            })
        };

        if !(self.resource_max >= 0.0) {
            return fail("resource_max must be non-negative");
        }
        if !(self.resource_available >= 0.0 && self.resource_available <= self.resource_max) {
            return fail("resource_available must lie within [0, resource_max]");
        }
        if !(self.penalty_floor >= 0.0) {
            return fail("penalty_floor must be non-negative");
        }
        if !(self.penalty_level >= self.penalty_floor) {
            return fail("penalty_level must not be below penalty_floor");
        }
        let latencies = [
            self.latency_extract_ms,
            self.latency_correct_ms,
            self.latency_restore_ms,
        ];
        if latencies.iter().any(|l| !(*l > 0.0)) {
            return fail("latencies must be positive");
        }
        if !(0.0..=1.0).contains(&self.extract_chance) {
            return fail("extract_chance must lie within [0, 1]");
        }
        Ok(())
    }
}

// ── Node ──────────────────────────────────────────────────────────

/// Live capacity measurement for a worker node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: NodeId,
    pub capacity_total: f64,
    pub capacity_used: f64,
    /// Whether credentials have been acquired so work can run there.
    pub has_access: bool,
}

impl NodeInfo {
    pub fn capacity_free(&self) -> f64 {
        (self.capacity_total - self.capacity_used).max(0.0)
    }

    /// A node can receive work once accessed and if it has any capacity.
    pub fn is_usable(&self) -> bool {
        self.has_access && self.capacity_total > 0.0
    }

    pub fn validate(&self) -> CoreResult<()> {
        if !(self.capacity_total >= 0.0) || !(self.capacity_used >= 0.0) {
            return Err(CoreError::InvalidNode {
                id: self.id.clone(),
                reason: "capacity must be non-negative".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_target() -> TargetState {
        TargetState {
            id: "alpha".to_string(),
            resource_max: 1_000_000.0,
            resource_available: 1_000_000.0,
            penalty_level: 5.0,
            penalty_floor: 5.0,
            latency_extract_ms: 1_000.0,
            latency_correct_ms: 4_000.0,
            latency_restore_ms: 3_200.0,
            extract_chance: 0.8,
        }
    }

    #[test]
    fn valid_target_passes() {
        assert!(sample_target().validate().is_ok());
    }

    #[test]
    fn rejects_available_above_max() {
        let mut t = sample_target();
        t.resource_available = 2_000_000.0;
        assert!(matches!(t.validate(), Err(CoreError::InvalidTarget { .. })));
    }

    #[test]
    fn rejects_penalty_below_floor() {
        let mut t = sample_target();
        t.penalty_level = 1.0;
        assert!(t.validate().is_err());
    }

    #[test]
    fn rejects_zero_latency() {
        let mut t = sample_target();
        t.latency_restore_ms = 0.0;
        assert!(t.validate().is_err());
    }

    #[test]
    fn rejects_nan_chance() {
        let mut t = sample_target();
        t.extract_chance = f64::NAN;
        assert!(t.validate().is_err());
    }

    #[test]
    fn latency_lookup_by_operation() {
        let t = sample_target();
        assert_eq!(t.latency_ms(OperationKind::Extract), 1_000.0);
        assert_eq!(t.latency_ms(OperationKind::Correct), 4_000.0);
        assert_eq!(t.latency_ms(OperationKind::Restore), 3_200.0);
        assert_eq!(t.slowest_latency_ms(), 4_000.0);
    }

    #[test]
    fn operation_kind_serializes_snake_case() {
        let json = serde_json::to_string(&OperationKind::Restore).unwrap();
        assert_eq!(json, "\"restore\"");
    }

    #[test]
    fn node_usability() {
        let mut node = NodeInfo {
            id: "n1".to_string(),
            capacity_total: 32.0,
            capacity_used: 8.0,
            has_access: true,
        };
        assert!(node.is_usable());
        assert_eq!(node.capacity_free(), 24.0);

        node.has_access = false;
        assert!(!node.is_usable());

        node.has_access = true;
        node.capacity_total = 0.0;
        assert!(!node.is_usable());
    }
}
