//! Upgrade options offered by a market.

use serde::{Deserialize, Serialize};

use batchgrid_core::UnitId;

/// What an upgrade does.
///
/// Worker servers reuse `Ram` for a capacity doubling and `NewUnit` for a
/// fresh server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeKind {
    Level,
    Ram,
    Core,
    NewUnit,
}

impl UpgradeKind {
    pub fn label(&self) -> &'static str {
        match self {
            UpgradeKind::Level => "level",
            UpgradeKind::Ram => "ram",
            UpgradeKind::Core => "core",
            UpgradeKind::NewUnit => "new_unit",
        }
    }
}

impl std::fmt::Display for UpgradeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A purchasable upgrade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradeOption {
    /// Existing unit being upgraded; `None` acquires a new one.
    pub owner: Option<UnitId>,
    pub kind: UpgradeKind,
    pub cost: f64,
    /// Production (or capacity) gained by buying this option.
    pub marginal_gain: f64,
}

impl UpgradeOption {
    pub fn upgrade(owner: impl Into<UnitId>, kind: UpgradeKind, cost: f64, marginal_gain: f64) -> Self {
        Self {
            owner: Some(owner.into()),
            kind,
            cost,
            marginal_gain,
        }
    }

    pub fn acquire(cost: f64, marginal_gain: f64) -> Self {
        Self {
            owner: None,
            kind: UpgradeKind::NewUnit,
            cost,
            marginal_gain,
        }
    }

    /// Positive, finite cost and gain.
    pub fn is_rankable(&self) -> bool {
        self.cost > 0.0 && self.marginal_gain > 0.0 && self.cost.is_finite() && self.marginal_gain.is_finite()
    }

    /// Gain per unit of money; zero when not rankable.
    pub fn roi(&self) -> f64 {
        if self.is_rankable() {
            self.marginal_gain / self.cost
        } else {
            0.0
        }
    }

    /// Money per unit of gain. Unrankable options sort last at +∞.
    pub fn cost_to_gain(&self) -> f64 {
        if self.is_rankable() {
            self.cost / self.marginal_gain
        } else {
            f64::INFINITY
        }
    }

    /// Identity used to exclude an option after a failed purchase.
    pub fn key(&self) -> (Option<UnitId>, UpgradeKind) {
        (self.owner.clone(), self.kind)
    }

    pub fn owner_label(&self) -> &str {
        self.owner.as_deref().unwrap_or("new")
    }
}
