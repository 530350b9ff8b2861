//! Treasury error types.

use thiserror::Error;

use crate::option::UpgradeKind;

/// Errors a market can report for a purchase.
#[derive(Debug, Error)]
pub enum TreasuryError {
    #[error("{kind} upgrade unavailable for {owner}")]
    Unavailable { owner: String, kind: UpgradeKind },

    #[error("purchase rejected: {0}")]
    Rejected(String),
}

pub type TreasuryResult<T> = Result<T, TreasuryError>;
