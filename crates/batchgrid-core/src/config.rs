//! batchgrid.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{CoreError, CoreResult};
use crate::types::OperationKind;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub planner: PlannerConfig,
    pub capacity: CapacityCosts,
    pub treasury: TreasuryConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Share of a target's max resource one batch tries to extract.
    pub extract_fraction: f64,
    /// Penalty units above the floor still counted as "at floor".
    pub penalty_tolerance: f64,
    /// Share of max resource a target must hold to count as restored.
    pub resource_threshold: f64,
    /// Penalty removed by one correct thread.
    pub correction_per_thread: f64,
    /// Minimum gap between consecutive phase completions.
    pub buffer_ms: f64,
    /// Trailing offset of the secondary correction, in buffers after the
    /// primary correction.
    pub secondary_offset_buffers: f64,
    /// Run targets down: skip restoration entirely.
    pub drain_mode: bool,
    /// Targets whose slowest operation exceeds this are not planned.
    pub max_action_time_ms: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            extract_fraction: 0.1,
            penalty_tolerance: 0.5,
            resource_threshold: 0.99,
            correction_per_thread: 0.05,
            buffer_ms: 100.0,
            secondary_offset_buffers: 4.0,
            drain_mode: false,
            max_action_time_ms: 120_000.0,
        }
    }
}

/// Capacity consumed by one thread of each operation kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityCosts {
    pub extract: f64,
    pub correct: f64,
    pub restore: f64,
}

impl Default for CapacityCosts {
    fn default() -> Self {
        Self {
            extract: 1.70,
            correct: 1.75,
            restore: 1.75,
        }
    }
}

impl CapacityCosts {
    pub fn per_thread(&self, op: OperationKind) -> f64 {
        match op {
            OperationKind::Extract => self.extract,
            OperationKind::Correct => self.correct,
            OperationKind::Restore => self.restore,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreasuryConfig {
    pub pause_purchases: bool,
    /// Share of current funds the production-unit pass may spend.
    pub unit_budget_fraction: f64,
    /// Share of current funds the server pass may spend.
    pub server_budget_fraction: f64,
    /// Upper bound on purchases in a single allocation pass.
    pub max_purchases_per_pass: u32,
}

impl Default for TreasuryConfig {
    fn default() -> Self {
        Self {
            pause_purchases: false,
            unit_budget_fraction: 0.1,
            server_budget_fraction: 0.2,
            max_purchases_per_pass: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Pause between two planning cycles.
    pub poll_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
        }
    }
}

impl GridConfig {
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> CoreResult<Self> {
        let config: GridConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> CoreResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values the planner or allocator cannot work with.
    pub fn validate(&self) -> CoreResult<()> {
        let p = &self.planner;
        if !(p.extract_fraction > 0.0 && p.extract_fraction < 1.0) {
            return Err(CoreError::InvalidConfig(
                "planner.extract_fraction must lie in (0, 1)".to_string(),
            ));
        }
        if !(p.correction_per_thread > 0.0) {
            return Err(CoreError::InvalidConfig(
                "planner.correction_per_thread must be positive".to_string(),
            ));
        }
        if !(p.resource_threshold > 0.0 && p.resource_threshold <= 1.0) {
            return Err(CoreError::InvalidConfig(
                "planner.resource_threshold must lie in (0, 1]".to_string(),
            ));
        }
        let non_negative = [p.penalty_tolerance, p.buffer_ms, p.secondary_offset_buffers];
        if non_negative.iter().any(|v| !(*v >= 0.0)) {
            return Err(CoreError::InvalidConfig(
                "planner tolerances, buffer and offsets must be non-negative".to_string(),
            ));
        }

        let c = &self.capacity;
        if [c.extract, c.correct, c.restore].iter().any(|v| !(*v > 0.0)) {
            return Err(CoreError::InvalidConfig(
                "capacity costs must be positive".to_string(),
            ));
        }

        let t = &self.treasury;
        let fractions = [t.unit_budget_fraction, t.server_budget_fraction];
        if fractions.iter().any(|f| !(0.0..=1.0).contains(f)) {
            return Err(CoreError::InvalidConfig(
                "treasury budget fractions must lie in [0, 1]".to_string(),
            ));
        }

        if self.scheduler.poll_interval_ms == 0 {
            return Err(CoreError::InvalidConfig(
                "scheduler.poll_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
