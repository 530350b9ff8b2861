//! Capacity analysis for variable-cost operations.
//!
//! How many threads an extraction or restoration needs, and how much
//! penalty a given number of threads adds, depends on the remote
//! environment. The planner only sees it through [`ThreadAnalysis`].

use batchgrid_core::TargetState;

/// Converts desired effects into thread counts and thread counts into
/// penalty increases for one target.
pub trait ThreadAnalysis {
    /// Threads needed to extract `amount` resource from the target.
    ///
    /// May return zero or a negative value when nothing can be extracted.
    fn extract_threads_for(&self, target: &TargetState, amount: f64) -> f64;

    /// Threads needed to grow the target's resource by `multiplier`.
    fn restore_threads_for(&self, target: &TargetState, multiplier: f64) -> f64;

    /// Penalty added by running `threads` extract threads.
    fn penalty_from_extract(&self, threads: u32, target: &TargetState) -> f64;

    /// Penalty added by running `threads` restore threads.
    fn penalty_from_restore(&self, threads: u32, target: &TargetState) -> f64;
}

impl<T: ThreadAnalysis + ?Sized> ThreadAnalysis for &T {
    fn extract_threads_for(&self, target: &TargetState, amount: f64) -> f64 {
        (**self).extract_threads_for(target, amount)
    }

    fn restore_threads_for(&self, target: &TargetState, multiplier: f64) -> f64 {
        (**self).restore_threads_for(target, multiplier)
    }

    fn penalty_from_extract(&self, threads: u32, target: &TargetState) -> f64 {
        (**self).penalty_from_extract(threads, target)
    }

    fn penalty_from_restore(&self, threads: u32, target: &TargetState) -> f64 {
        (**self).penalty_from_restore(threads, target)
    }
}

impl<T: ThreadAnalysis + ?Sized> ThreadAnalysis for std::sync::Arc<T> {
    fn extract_threads_for(&self, target: &TargetState, amount: f64) -> f64 {
        (**self).extract_threads_for(target, amount)
    }

    fn restore_threads_for(&self, target: &TargetState, multiplier: f64) -> f64 {
        (**self).restore_threads_for(target, multiplier)
    }

    fn penalty_from_extract(&self, threads: u32, target: &TargetState) -> f64 {
        (**self).penalty_from_extract(threads, target)
    }

    fn penalty_from_restore(&self, threads: u32, target: &TargetState) -> f64 {
        (**self).penalty_from_restore(threads, target)
    }
}

/// A closed-form analysis with the same coefficients for every target.
///
/// - one extract thread takes `extract_share_per_thread` of the available
///   resource
/// - restoration compounds: `n` threads multiply the resource by
///   `(1 + restore_rate_per_thread)^n`
/// - penalty grows linearly with threads
#[derive(Debug, Clone, PartialEq)]
pub struct LinearAnalysis {
    pub extract_share_per_thread: f64,
    pub restore_rate_per_thread: f64,
    pub extract_penalty_per_thread: f64,
    pub restore_penalty_per_thread: f64,
}

impl Default for LinearAnalysis {
    fn default() -> Self {
        Self {
            extract_share_per_thread: 0.002,
            restore_rate_per_thread: 0.0035,
            extract_penalty_per_thread: 0.002,
            restore_penalty_per_thread: 0.004,
        }
    }
}

impl ThreadAnalysis for LinearAnalysis {
    fn extract_threads_for(&self, target: &TargetState, amount: f64) -> f64 {
        let per_thread = target.resource_available * self.extract_share_per_thread;
        if per_thread <= 0.0 {
            return 0.0;
        }
        amount / per_thread
    }

    fn restore_threads_for(&self, _target: &TargetState, multiplier: f64) -> f64 {
        if multiplier <= 1.0 || self.restore_rate_per_thread <= 0.0 {
            return 0.0;
        }
        multiplier.ln() / self.restore_rate_per_thread.ln_1p()
    }

    fn penalty_from_extract(&self, threads: u32, _target: &TargetState) -> f64 {
        f64::from(threads) * self.extract_penalty_per_thread
    }

    fn penalty_from_restore(&self, threads: u32, _target: &TargetState) -> f64 {
        f64::from(threads) * self.restore_penalty_per_thread
    }
}
