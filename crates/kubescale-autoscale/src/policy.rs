//! Scaling policy engine.
//!
//! `target` maps a demand estimate to a replica count. It holds no state
//! and draws no random numbers: the same arguments always give the same
//! answer.

use tracing::trace;

use kubescale_core::config::PolicyConfig;
use kubescale_core::{ReplicaBounds, ScalingPolicy};

/// Capacity constants of the policy engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalingParams {
    /// Concurrent users one replica can serve.
    pub users_per_pod: u32,
    /// Extra replicas under `performance-first`.
    pub performance_buffer: u32,
    /// Below this estimate, `cost-first` scales to zero.
    pub low_traffic_threshold: f64,
}

impl Default for ScalingParams {
    fn default() -> Self {
        Self::from(&PolicyConfig::default())
    }
}

impl From<&PolicyConfig> for ScalingParams {
    fn from(c: &PolicyConfig) -> Self {
        Self {
            users_per_pod: c.users_per_pod.max(1),
            performance_buffer: c.performance_buffer,
            low_traffic_threshold: c.low_traffic_threshold,
        }
    }
}

/// Desired replica count for a workload.
///
/// The result is within `bounds`, with one exception: `cost-first` under
/// `low_traffic_threshold` returns 0 even when `bounds.min > 0`.
pub fn target(
    estimate: f64,
    policy: ScalingPolicy,
    bounds: ReplicaBounds,
    params: &ScalingParams,
) -> u32 {
    // NaN and negatives mean no demand.
    let estimate = if estimate.is_finite() { estimate.max(0.0) } else { 0.0 };
    let raw = (estimate / params.users_per_pod as f64).ceil() as u32;

    let adjusted = match policy {
        ScalingPolicy::PerformanceFirst => raw.saturating_add(params.performance_buffer),
        ScalingPolicy::CostFirst => {
            if estimate < params.low_traffic_threshold {
                trace!(estimate, "scale-to-zero: low traffic");
                return 0;
            }
            raw
        }
        ScalingPolicy::Balanced => {
            if estimate > 0.0 {
                raw.max(1)
            } else {
                raw
            }
        }
    };

    bounds.clamp(adjusted)
}

/// Pods a workload must keep for a given target: `bounds.min`, unless the
/// target is a scale-to-zero.
pub fn floor_for(target: u32, bounds: ReplicaBounds) -> u32 {
    if target == 0 { 0 } else { bounds.min }
}
