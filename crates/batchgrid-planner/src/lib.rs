//! batchgrid-planner — turn a target snapshot into a plan.
//!
//! A target is either *ready* (penalty at its floor and resource restored)
//! or it needs preparation first. Ready targets get a four-phase batch whose
//! start delays make the phases land in a fixed order.
//!
//! # Planning Algorithm
//!
//! ```text
//! ready = penalty <= floor + tolerance
//!         and (drain_mode or available >= max * threshold)
//!
//! if not ready:
//!     if penalty > floor + tolerance:
//!         PrepPenalty(ceil((penalty - floor) / correction_per_thread))
//!     else:
//!         PrepResource(ceil(restore_threads(max / max(available, 1))))
//!
//! if ready:
//!     extract           = max(1, floor(extract_threads(max * f)))
//!     correct_primary   = ceil(penalty_from_extract(extract) / correction_per_thread)
//!     restore           = ceil(restore_threads(1 / (1 - f)))          // skipped when draining
//!     correct_secondary = ceil(penalty_from_restore(restore) / cpt)   // skipped when draining
//! ```
//!
//! Start delays are computed in [`timing`] so the completions land as
//! extract → correct_primary → restore → correct_secondary, each at least
//! one buffer after the previous one.

pub mod analysis;
pub mod plan;
pub mod planner;
pub mod timing;

pub use analysis::{LinearAnalysis, ThreadAnalysis};
pub use plan::{Phase, PhaseRole, Plan, PlanKind, rank_plans};
pub use planner::{BatchPlanner, PlanOptions};
