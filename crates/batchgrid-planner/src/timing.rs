//! Start-delay arithmetic for batch phases.
//!
//! All phases of a batch are dispatched at the same instant. A phase lands
//! at `start_delay + latency`, so ordering the landings is purely a matter
//! of choosing delays. There is no coordination channel between phases once
//! they are running.

use batchgrid_core::{PlannerConfig, TargetState};

use crate::plan::PhaseRole;

/// Nominal delay of each role, before alignment.
///
/// ```text
/// extract           = 0
/// correct_primary   = L_correct - L_extract + B
/// restore           = L_correct - L_restore + 2B
/// correct_secondary = correct_primary + k·B      (k = secondary_offset_buffers)
/// ```
pub fn nominal_delay_ms(role: PhaseRole, target: &TargetState, config: &PlannerConfig) -> f64 {
    let b = config.buffer_ms;
    let primary = target.latency_correct_ms - target.latency_extract_ms + b;
    match role {
        PhaseRole::Extract => 0.0,
        PhaseRole::CorrectPrimary => primary,
        PhaseRole::Restore => target.latency_correct_ms - target.latency_restore_ms + 2.0 * b,
        PhaseRole::CorrectSecondary => primary + config.secondary_offset_buffers * b,
    }
}

/// Start delays for the given roles, in landing order.
///
/// Nominal delays are clamped to zero, then every phase that would land
/// less than one buffer after its predecessor is pushed back until the gap
/// is exactly one buffer. Delays only ever grow, so the first phase keeps
/// its nominal delay of zero.
pub fn batch_delays_ms(roles: &[PhaseRole], target: &TargetState, config: &PlannerConfig) -> Vec<f64> {
    let mut delays = Vec::with_capacity(roles.len());
    let mut previous_landing: Option<f64> = None;

    for role in roles {
        let latency = target.latency_ms(role.operation());
        let mut delay = nominal_delay_ms(*role, target, config).max(0.0);

        if let Some(prev) = previous_landing {
            if (delay + latency) - prev < config.buffer_ms {
                delay = prev + config.buffer_ms - latency;
                // Rounding can leave the gap a few ulps short.
                while (delay + latency) - prev < config.buffer_ms {
                    delay += ulp(delay + latency);
                }
            }
        }

        previous_landing = Some(delay + latency);
        delays.push(delay);
    }
    delays
}

/// Distance from `x` to the next larger representable value.
fn ulp(x: f64) -> f64 {
    let x = x.abs();
    f64::from_bits(x.to_bits() + 1) - x
}
