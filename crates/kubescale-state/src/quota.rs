//! Tenant quota model.
//!
//! Quota is enforced at two points:
//!
//! - **Deploy time** (`check_and_reserve`): a workload reserves
//!   `replicas.min` pods plus `replicas.max × request` of cpu and memory.
//!   The tenant's reservations may never sum past its quota, so the
//!   minimum of every admitted workload always fits.
//! - **Every tick** (`allocate_targets`, `distribute`): policy targets are
//!   clamped so the tenant-wide active pod count never exceeds the pod
//!   quota. Contention is resolved oldest workload first.

use kubescale_core::WorkloadConfig;

use crate::error::{PlatformError, PlatformResult};
use crate::types::{QuotaUsage, Tenant};

/// What a workload reserves against its tenant's quota when admitted.
pub fn reservation_for(config: &WorkloadConfig) -> QuotaUsage {
    QuotaUsage {
        pods: config.replicas.min,
        cpu: config.resources.cpu.saturating_mul(config.replicas.max),
        memory: config.resources.memory.saturating_mul(config.replicas.max),
    }
}

/// Admit `delta` against the tenant's quota and record it as reserved.
///
/// `active_pods` is the tenant's current running+pending count; the
/// reserved pods are seeded immediately, so they must fit on top of it too.
/// Nothing is mutated on error.
pub fn check_and_reserve(
    tenant: &mut Tenant,
    delta: QuotaUsage,
    active_pods: u32,
) -> PlatformResult<()> {
    let next = tenant.reserved.saturating_add(delta);
    let exceeded = |resource: &'static str, requested: u64, limit: u64| {
        PlatformError::QuotaExceeded {
            tenant: tenant.id.clone(),
            resource,
            requested,
            limit,
        }
    };

    if next.pods > tenant.quota.pods {
        return Err(exceeded("pods", next.pods as u64, tenant.quota.pods as u64));
    }
    let seeded = active_pods.saturating_add(delta.pods);
    if seeded > tenant.quota.pods {
        return Err(exceeded("pods", seeded as u64, tenant.quota.pods as u64));
    }
    if next.cpu > tenant.quota.cpu {
        return Err(exceeded("cpu", next.cpu.0, tenant.quota.cpu.0));
    }
    if next.memory > tenant.quota.memory {
        return Err(exceeded("memory", next.memory.0, tenant.quota.memory.0));
    }

    tenant.reserved = next;
    Ok(())
}

/// One workload's ask in a tick, for quota allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Demand {
    /// Pods the workload must keep: `replicas.min`, or 0 under a
    /// cost-first zero target.
    pub floor: u32,
    /// Target computed by the scaling policy.
    pub desired: u32,
}

/// The allocated target of one workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grant {
    pub target: u32,
    /// True when quota forced `target` below `desired`.
    pub clamped: bool,
}

/// Split `quota_pods` across a tenant's demands.
///
/// `demands` must be ordered oldest workload first. Floors are granted
/// first (in order), then what remains goes to each workload up to its
/// desired target, again in order. The sum of targets never exceeds
/// `quota_pods`.
pub fn allocate_targets(quota_pods: u32, demands: &[Demand]) -> Vec<Grant> {
    let mut headroom = quota_pods;
    let mut targets: Vec<u32> = demands
        .iter()
        .map(|d| {
            let floor = d.floor.min(d.desired).min(headroom);
            headroom -= floor;
            floor
        })
        .collect();

    for (target, d) in targets.iter_mut().zip(demands) {
        let extra = d.desired.saturating_sub(*target).min(headroom);
        *target += extra;
        headroom -= extra;
    }

    targets
        .into_iter()
        .zip(demands)
        .map(|(target, d)| Grant {
            target,
            clamped: target < d.desired,
        })
        .collect()
}

/// Hand out `budget` units over `wants`, first come first served.
pub fn distribute(budget: u32, wants: &[u32]) -> Vec<u32> {
    let mut left = budget;
    wants
        .iter()
        .map(|&w| {
            let given = w.min(left);
            left -= given;
            given
        })
        .collect()
}
