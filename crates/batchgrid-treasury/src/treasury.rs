//! Per-cycle treasury pass over the unit and server markets.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use batchgrid_core::TreasuryConfig;

use crate::allocator::{Allocation, RoiAllocator, UpgradeMarket};
use crate::catalog::budget_from_funds;

/// Result of one treasury pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreasuryPass {
    pub units: Allocation,
    pub servers: Allocation,
}

impl TreasuryPass {
    pub fn spent(&self) -> f64 {
        self.units.spent + self.servers.spent
    }
}

/// Runs the production-unit and worker-server allocations once per cycle.
pub struct Treasury {
    config: TreasuryConfig,
    allocator: RoiAllocator,
}

impl Treasury {
    pub fn new(config: TreasuryConfig) -> Self {
        let allocator = RoiAllocator::from_config(&config);
        Self { config, allocator }
    }

    pub fn config(&self) -> &TreasuryConfig {
        &self.config
    }

    pub fn is_paused(&self) -> bool {
        self.config.pause_purchases
    }

    /// Spend from `funds` on units first, then servers.
    ///
    /// Each market gets its configured fraction of the funds left when its
    /// turn comes. Returns `None` when purchases are paused.
    pub fn run_pass<U, S>(&self, funds: f64, units: &mut U, servers: &mut S) -> Option<TreasuryPass>
    where
        U: UpgradeMarket + ?Sized,
        S: UpgradeMarket + ?Sized,
    {
        if self.is_paused() {
            debug!("purchases paused, skipping treasury pass");
            return None;
        }

        let unit_budget = budget_from_funds(funds, self.config.unit_budget_fraction);
        let unit_allocation = self.allocator.allocate(unit_budget, units);

        let remaining = funds - unit_allocation.spent;
        let server_budget = budget_from_funds(remaining, self.config.server_budget_fraction);
        let server_allocation = self.allocator.allocate(server_budget, servers);

        let pass = TreasuryPass {
            units: unit_allocation,
            servers: server_allocation,
        };
        info!(
            funds,
            unit_budget,
            server_budget,
            spent = pass.spent(),
            unit_purchases = pass.units.purchases.len(),
            server_purchases = pass.servers.purchases.len(),
            "treasury pass complete"
        );
        Some(pass)
    }
}
