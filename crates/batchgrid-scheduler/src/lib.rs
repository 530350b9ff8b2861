//! batchgrid-scheduler — the polling loop that turns target state into work.
//!
//! Each cycle:
//!
//! - Refreshes the [`Registry`] from the node and target providers
//! - Runs a pure [`tick`] (plan every viable target, rank, pack)
//! - Hands the resulting dispatches to a [`DispatchSink`]
//! - Runs one treasury pass unless purchases are paused
//!
//! # Architecture
//!
//! ```text
//! Scheduler
//!   ├── Registry (nodes in provider order, targets by id)
//!   ├── tick(registry, state) → plans + DispatchSet + next state
//!   │     ├── BatchPlanner (batchgrid-planner)
//!   │     └── pack()      (batchgrid-placement)
//!   ├── executor → DispatchSink (JSON payload per dispatch)
//!   └── Treasury (batchgrid-treasury)
//! ```

pub mod error;
pub mod executor;
pub mod providers;
pub mod registry;
pub mod scheduler;
pub mod tick;

pub use error::{SchedulerError, SchedulerResult};
pub use executor::{DispatchCommand, DispatchFailure, DispatchPayload, ExecutionReport, execute};
pub use providers::{
    Cluster, DispatchSink, NodeCapacityProvider, NodeReading, TargetStateProvider, Treasurer,
};
pub use registry::{RefreshSummary, Registry};
pub use scheduler::{CycleReport, Scheduler};
pub use tick::{SchedulerState, TickOutput, tick};
