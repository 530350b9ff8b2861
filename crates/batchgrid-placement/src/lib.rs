//! Batchgrid capacity packer — first-fit placement with prep splitting.
//!
//! This crate decides which worker node runs which phase. It does NOT talk
//! to nodes (that's `batchgrid-scheduler`). It debits capacity models and
//! produces the dispatch records the scheduler sends out.
//!
//! # Components
//!
//! - **`capacity`** — Per-node capacity model debited during one pass
//! - **`packer`** — Plan placement (single node, prep split, batch skip)
//! - **`convert`** — Conversions from registry node records

pub mod capacity;
pub mod convert;
pub mod packer;

pub use capacity::NodeCapacityModel;
pub use convert::{node_info_to_capacity, usable_capacity_models};
pub use packer::{Dispatch, DispatchSet, PlanOutcome, PlanReport, pack};
