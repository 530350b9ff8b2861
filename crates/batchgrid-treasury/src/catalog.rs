//! Upgrade catalogs for production units and worker servers.
//!
//! The catalogs only describe what could be bought. Prices come from the
//! caller through [`UpgradeCosts`] / [`ServerCosts`]; execution belongs to the
//! [`UpgradeMarket`](crate::allocator::UpgradeMarket).

use serde::{Deserialize, Serialize};

use batchgrid_core::{NodeId, UnitId};

use crate::option::{UpgradeKind, UpgradeOption};

// ── Production units ───────────────────────────────────────────────

/// Upper bounds on production unit stats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitLimits {
    pub max_level: u32,
    pub max_ram: u32,
    pub max_cores: u32,
    pub max_units: usize,
    /// Production of a freshly acquired unit.
    pub new_unit_production: f64,
}

impl Default for UnitLimits {
    fn default() -> Self {
        Self {
            max_level: 200,
            max_ram: 64,
            max_cores: 16,
            max_units: 24,
            new_unit_production: 4.097,
        }
    }
}

/// Current stats of one production unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitStats {
    pub id: UnitId,
    pub level: u32,
    pub ram: u32,
    pub cores: u32,
    /// Measured production per second.
    pub production: f64,
}

/// Prices for production unit upgrades.
pub trait UpgradeCosts {
    fn level_cost(&self, unit: &UnitStats) -> f64;
    fn ram_cost(&self, unit: &UnitStats) -> f64;
    fn core_cost(&self, unit: &UnitStats) -> f64;
    fn new_unit_cost(&self, owned: usize) -> f64;
}

/// Approximate production of a unit with the given stats.
///
/// ```text
/// production = level × ram × (1 + (cores − 1) / 16) × multiplier
/// ```
pub fn simulated_production(level: u32, ram: u32, cores: u32, multiplier: f64) -> f64 {
    let core_factor = 1.0 + f64::from(cores.saturating_sub(1)) / 16.0;
    f64::from(level) * f64::from(ram) * core_factor * multiplier
}

/// Every available upgrade for `units`, plus a new unit when below the cap.
///
/// Capped upgrades are omitted. Marginal gain is the simulated production
/// after the upgrade minus the unit's measured production.
pub fn unit_options<C: UpgradeCosts + ?Sized>(
    units: &[UnitStats],
    costs: &C,
    limits: &UnitLimits,
    multiplier: f64,
) -> Vec<UpgradeOption> {
    let mut options = Vec::with_capacity(units.len() * 3 + 1);

    for unit in units {
        if unit.level < limits.max_level {
            let gain = simulated_production(unit.level + 1, unit.ram, unit.cores, multiplier) - unit.production;
            options.push(UpgradeOption::upgrade(&unit.id, UpgradeKind::Level, costs.level_cost(unit), gain));
        }
        if unit.ram < limits.max_ram {
            let gain = simulated_production(unit.level, unit.ram * 2, unit.cores, multiplier) - unit.production;
            options.push(UpgradeOption::upgrade(&unit.id, UpgradeKind::Ram, costs.ram_cost(unit), gain));
        }
        if unit.cores < limits.max_cores {
            let gain = simulated_production(unit.level, unit.ram, unit.cores + 1, multiplier) - unit.production;
            options.push(UpgradeOption::upgrade(&unit.id, UpgradeKind::Core, costs.core_cost(unit), gain));
        }
    }

    if units.len() < limits.max_units {
        options.push(UpgradeOption::acquire(
            costs.new_unit_cost(units.len()),
            limits.new_unit_production * multiplier,
        ));
    }

    options
}

// ── Worker servers ─────────────────────────────────────────────────

/// Size limits for purchasable worker servers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerLimits {
    /// Capacity a new server starts with.
    pub min_capacity: f64,
    pub max_capacity: f64,
    pub max_servers: usize,
}

impl Default for ServerLimits {
    fn default() -> Self {
        Self {
            min_capacity: 2.0,
            max_capacity: 1_048_576.0,
            max_servers: 25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerStats {
    pub id: NodeId,
    pub capacity: f64,
}

/// Prices for worker servers of a given capacity.
pub trait ServerCosts {
    fn purchase_cost(&self, capacity: f64) -> f64;

    /// Cost of growing `server` to `new_capacity`. Defaults to replacing it
    /// with a fresh server of that size.
    fn upgrade_cost(&self, _server: &ServerStats, new_capacity: f64) -> f64 {
        self.purchase_cost(new_capacity)
    }
}

/// Capacity doublings for each server below the max, plus a new server when
/// below the count limit. Gain is the capacity added.
pub fn server_options<C: ServerCosts + ?Sized>(
    servers: &[ServerStats],
    costs: &C,
    limits: &ServerLimits,
) -> Vec<UpgradeOption> {
    let mut options = Vec::with_capacity(servers.len() + 1);

    for server in servers {
        if server.capacity >= limits.max_capacity {
            continue;
        }
        let new_capacity = (server.capacity * 2.0).min(limits.max_capacity);
        options.push(UpgradeOption::upgrade(
            &server.id,
            UpgradeKind::Ram,
            costs.upgrade_cost(server, new_capacity),
            new_capacity - server.capacity,
        ));
    }

    if servers.len() < limits.max_servers {
        options.push(UpgradeOption::acquire(
            costs.purchase_cost(limits.min_capacity),
            limits.min_capacity,
        ));
    }

    options
}

/// Money a pass may spend: `funds × fraction`, never negative.
pub fn budget_from_funds(funds: f64, fraction: f64) -> f64 {
    (funds * fraction).max(0.0)
}
