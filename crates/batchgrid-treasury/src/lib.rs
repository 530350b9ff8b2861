//! Batchgrid treasury — ROI-ranked upgrade purchasing.
//!
//! Spends a slice of current funds on whichever upgrade buys the most
//! production (or capacity) per unit of money, then re-ranks and repeats.
//!
//! # Allocation loop
//!
//! ```text
//! spent = 0
//! loop:
//!   options   = market.options()            (fresh after every purchase)
//!   rankable  = options where gain > 0 and cost > 0, not failed this pass
//!   sort rankable ascending by cost / gain
//!   choice    = first rankable with cost <= budget - spent
//!   none      → stop
//!   purchase(choice) → spent += cost        (failure → exclude, continue)
//! ```
//!
//! Two catalogs feed the loop: production units (level/ram/core upgrades
//! and new units) and worker servers (capacity doubling and new servers).

pub mod allocator;
pub mod catalog;
pub mod error;
pub mod option;
pub mod treasury;

pub use allocator::{Allocation, PurchaseFailure, RoiAllocator, UpgradeMarket};
pub use catalog::{
    ServerCosts, ServerLimits, ServerStats, UnitLimits, UnitStats, UpgradeCosts, budget_from_funds,
    server_options, simulated_production, unit_options,
};
pub use error::{TreasuryError, TreasuryResult};
pub use option::{UpgradeKind, UpgradeOption};
pub use treasury::{Treasury, TreasuryPass};
