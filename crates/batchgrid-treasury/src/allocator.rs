//! ROI allocator — greedy purchasing by ascending cost-to-gain ratio.
//!
//! Options are recomputed from the market after every purchase, since one
//! purchase changes the cost and gain of everything else the same unit
//! offers. An option too expensive for the remaining budget is passed over
//! without ending the pass; cheaper, slightly worse options may still fit.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use batchgrid_core::{TreasuryConfig, UnitId};

use crate::error::TreasuryResult;
use crate::option::{UpgradeKind, UpgradeOption};

/// Source of upgrade options and executor of purchases.
pub trait UpgradeMarket {
    /// Currently purchasable options. Called again after every purchase.
    fn options(&self) -> Vec<UpgradeOption>;

    /// Buy `option`.
    fn purchase(&mut self, option: &UpgradeOption) -> TreasuryResult<()>;
}

impl<M: UpgradeMarket + ?Sized> UpgradeMarket for &mut M {
    fn options(&self) -> Vec<UpgradeOption> {
        (**self).options()
    }

    fn purchase(&mut self, option: &UpgradeOption) -> TreasuryResult<()> {
        (**self).purchase(option)
    }
}

/// A purchase the market refused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseFailure {
    pub option: UpgradeOption,
    pub reason: String,
}

/// Outcome of one allocation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub spent: f64,
    /// Options bought, in purchase order.
    pub purchases: Vec<UpgradeOption>,
    pub failures: Vec<PurchaseFailure>,
}

impl Allocation {
    pub fn total_gain(&self) -> f64 {
        self.purchases.iter().map(|o| o.marginal_gain).sum()
    }
}

/// Greedy best-ratio-first allocator.
#[derive(Debug, Clone)]
pub struct RoiAllocator {
    max_purchases: u32,
}

impl Default for RoiAllocator {
    fn default() -> Self {
        Self::from_config(&TreasuryConfig::default())
    }
}

impl RoiAllocator {
    /// `max_purchases` bounds the number of purchase attempts in one pass.
    pub fn new(max_purchases: u32) -> Self {
        Self { max_purchases }
    }

    pub fn from_config(config: &TreasuryConfig) -> Self {
        Self::new(config.max_purchases_per_pass)
    }

    /// Spend at most `budget` on the market's options.
    pub fn allocate<M: UpgradeMarket + ?Sized>(&self, budget: f64, market: &mut M) -> Allocation {
        let mut allocation = Allocation::default();
        if !(budget > 0.0) {
            return allocation;
        }

        let mut excluded: HashSet<(Option<UnitId>, UpgradeKind)> = HashSet::new();

        for _ in 0..self.max_purchases {
            let remaining = budget - allocation.spent;
            if remaining <= 0.0 {
                break;
            }

            let mut ranked: Vec<UpgradeOption> = market
                .options()
                .into_iter()
                .filter(|o| o.is_rankable() && !excluded.contains(&o.key()))
                .collect();
            ranked.sort_by(|a, b| {
                a.cost_to_gain()
                    .partial_cmp(&b.cost_to_gain())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

            let Some(choice) = ranked.into_iter().find(|o| o.cost <= remaining) else {
                debug!(remaining, "no affordable option left");
                break;
            };

            match market.purchase(&choice) {
                Ok(()) => {
                    allocation.spent += choice.cost;
                    info!(
                        owner = choice.owner_label(),
                        kind = %choice.kind,
                        cost = choice.cost,
                        gain = choice.marginal_gain,
                        "purchased upgrade"
                    );
                    allocation.purchases.push(choice);
                }
                Err(e) => {
                    warn!(
                        owner = choice.owner_label(),
                        kind = %choice.kind,
                        error = %e,
                        "purchase failed, excluding option for this pass"
                    );
                    excluded.insert(choice.key());
                    allocation.failures.push(PurchaseFailure {
                        option: choice,
                        reason: e.to_string(),
                    });
                }
            }
        }

        allocation
    }
}
