//! Shared types, configuration and errors for the Batchgrid workspace.

pub mod config;
pub mod error;
pub mod types;

pub use config::{CapacityCosts, GridConfig, PlannerConfig, SchedulerConfig, TreasuryConfig};
pub use error::{CoreError, CoreResult};
pub use types::*;
