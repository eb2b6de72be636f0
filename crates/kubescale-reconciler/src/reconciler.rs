//! Reconciler — one tick of the control loop.

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use tracing::{debug, info, warn};

use kubescale_autoscale::{ScalingParams, TrafficSource, floor_for, target};
use kubescale_cluster::{ClusterOp, ClusterResult};
use kubescale_core::{ScaleConfig, TenantId, WorkloadId};
use kubescale_state::quota::{Demand, allocate_targets, distribute};
use kubescale_state::{
    ClusterState, PodLifecycle, PodPhase, PodStep, SyncStatus, TrafficPoint, Workload,
    WorkloadMetrics, WorkloadStatus,
};

/// What one tick decided for one workload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub workload_id: WorkloadId,
    pub tenant_id: TenantId,
    pub estimate: f64,
    /// Target from the scaling policy.
    pub policy_target: u32,
    /// Target after tenant quota allocation.
    pub target: u32,
    pub clamped: bool,
    /// Active pods at tick start.
    pub active_before: u32,
    pub created: u32,
    pub terminated: u32,
    /// Active pods after the lifecycle step.
    pub active_after: u32,
}

/// A backend mutation produced by a tick or a boundary operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncIntent {
    /// Workload whose sync status the outcome updates. `None` for
    /// tenant-level ops.
    pub workload_id: Option<WorkloadId>,
    pub op: ClusterOp,
}

impl SyncIntent {
    /// Record the backend's answer on the workload.
    ///
    /// Success marks the workload `Mirrored` at the op's replica count;
    /// any failure drops it to `SimulationOnly` until the next success.
    pub fn apply_outcome(&self, state: &mut ClusterState, result: &ClusterResult<()>) {
        let Some(id) = &self.workload_id else {
            return;
        };
        let Some(w) = state.workload_mut(id) else {
            return;
        };
        match result {
            Ok(()) => {
                w.sync = SyncStatus::Mirrored;
                if let Some(r) = self.op.replicas() {
                    w.mirrored_replicas = Some(r);
                }
            }
            Err(e) => {
                if w.sync != SyncStatus::SimulationOnly {
                    warn!(workload = %id, error = %e, "workload running simulation-only");
                }
                w.sync = SyncStatus::SimulationOnly;
            }
        }
    }
}

/// Everything a tick did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TickReport {
    pub tick: u64,
    pub decisions: Vec<Decision>,
    pub intents: Vec<SyncIntent>,
    /// Pods removed after finishing termination.
    pub removed: usize,
}

impl TickReport {
    pub fn decision(&self, workload_id: &str) -> Option<&Decision> {
        self.decisions.iter().find(|d| d.workload_id == workload_id)
    }
}

/// Owns every source of randomness in the control loop.
pub struct Reconciler {
    rng: StdRng,
    lifecycle: PodLifecycle,
    traffic: TrafficSource,
    params: ScalingParams,
    max_churn: u32,
    history_len: usize,
}

impl Reconciler {
    /// Seeded from `reconcile.seed`, or from OS entropy when absent.
    pub fn new(config: &ScaleConfig) -> Self {
        let rng = match config.reconcile.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            lifecycle: PodLifecycle::new(config.lifecycle.clone()),
            traffic: TrafficSource::new(config.traffic.clone()),
            params: ScalingParams::from(&config.policy),
            max_churn: config.reconcile.max_churn_per_tick.max(1),
            history_len: config.traffic.history_len,
        }
    }

    pub fn with_seed(config: &ScaleConfig, seed: u64) -> Self {
        let mut r = Self::new(config);
        r.rng = StdRng::seed_from_u64(seed);
        r
    }

    pub fn lifecycle(&self) -> &PodLifecycle {
        &self.lifecycle
    }

    pub fn traffic(&self) -> &TrafficSource {
        &self.traffic
    }

    /// Run one reconciliation tick at `now` (unix ms).
    pub fn tick(&mut self, state: &mut ClusterState, now: u64) -> TickReport {
        let tick = state.tick() + 1;

        // 1–2. Estimates and policy targets.
        let mut plans = Vec::with_capacity(state.workloads().len());
        let workloads: Vec<_> = state
            .workloads()
            .iter()
            .map(|w| (w.id.clone(), w.tenant_id.clone(), w.config.scaling_policy, w.config.replicas))
            .collect();
        for (id, tenant_id, policy, bounds) in workloads {
            let estimate = match state.signal_mut(&id) {
                Some(signal) => self.traffic.estimate(signal, &id, now, &mut self.rng),
                None => 0.0,
            };
            let desired = target(estimate, policy, bounds, &self.params);
            plans.push(Plan {
                active_before: state.active_count(&id),
                floor: floor_for(desired, bounds),
                id,
                tenant_id,
                estimate,
                desired,
                target: desired,
                clamped: false,
                create: 0,
                terminated: 0,
            });
        }

        // 3. Tenant quota, computed from tick-start counts only.
        let tenants: Vec<_> = state
            .tenants()
            .iter()
            .map(|t| (t.id.clone(), t.quota.pods, state.tenant_active_count(&t.id)))
            .collect();
        for (tenant_id, quota_pods, active) in tenants {
            self.allocate(&mut plans, &tenant_id, quota_pods, active);
        }

        // 4–6. Rate-limited mutations.
        for plan in &mut plans {
            for _ in 0..plan.create {
                let pod = state.spawn_pod(&self.lifecycle, &plan.id, &plan.id, now);
                debug!(workload = %plan.id, pod = %pod, "pod created");
            }
            if plan.active_before > plan.target {
                let surplus = (plan.active_before - plan.target).min(self.max_churn);
                plan.terminated = self.terminate_oldest(state, &plan.id, surplus);
            }
        }

        // 7. Lifecycle step for every pod, including the ones just created.
        let mut finished = Vec::new();
        for pod in state.pods_mut().iter_mut() {
            if self.lifecycle.advance(pod, &mut self.rng) == PodStep::Remove {
                finished.push(pod.id.clone());
            }
        }
        let removed = state.remove_pods(&finished)
            + state.prune_failed(self.lifecycle.config().failed_retention);

        // 8. Record the outcome and decide what to mirror.
        let mut report = TickReport {
            tick,
            removed,
            ..TickReport::default()
        };
        for plan in plans {
            let decision = self.record(state, &plan, tick, now);
            if let Some(w) = state.workload(&plan.id)
                && let Some(op) = sync_op(w, plan.target)
            {
                report.intents.push(SyncIntent {
                    workload_id: Some(w.id.clone()),
                    op,
                });
            }
            report.decisions.push(decision);
        }

        state.finish_tick();
        report
    }

    /// Clamp one tenant's targets to its pod quota and hand out the
    /// creation budget, oldest workload first.
    fn allocate(&self, plans: &mut [Plan], tenant_id: &str, quota_pods: u32, active: u32) {
        let idx: Vec<usize> = plans
            .iter()
            .enumerate()
            .filter(|(_, p)| p.tenant_id == tenant_id)
            .map(|(i, _)| i)
            .collect();
        if idx.is_empty() {
            return;
        }

        let demands: Vec<Demand> = idx
            .iter()
            .map(|&i| Demand {
                floor: plans[i].floor,
                desired: plans[i].desired,
            })
            .collect();
        for (&i, grant) in idx.iter().zip(allocate_targets(quota_pods, &demands)) {
            let plan = &mut plans[i];
            plan.target = grant.target;
            plan.clamped = grant.clamped;
            if grant.clamped {
                warn!(
                    tenant = %tenant_id,
                    workload = %plan.id,
                    desired = plan.desired,
                    granted = grant.target,
                    quota = quota_pods,
                    "target clamped by tenant pod quota"
                );
            }
        }

        // Older workloads may still be draining surplus under the churn
        // cap, so creations are bounded by tick-start headroom too.
        let wants: Vec<u32> = idx
            .iter()
            .map(|&i| plans[i].target.saturating_sub(plans[i].active_before).min(self.max_churn))
            .collect();
        let budget = quota_pods.saturating_sub(active);
        for ((&i, given), want) in idx.iter().zip(distribute(budget, &wants)).zip(&wants) {
            plans[i].create = given;
            if given < *want {
                debug!(
                    workload = %plans[i].id,
                    wanted = want,
                    given,
                    "pod creation deferred until tenant headroom frees up"
                );
            }
        }
    }

    /// Mark up to `n` active pods `TERMINATING`: running pods oldest first,
    /// then pending pods oldest first.
    fn terminate_oldest(&self, state: &mut ClusterState, workload_id: &str, n: u32) -> u32 {
        let mut victims: Vec<(bool, u64, String)> = state
            .pods_for(workload_id)
            .filter(|p| p.is_active())
            .map(|p| (p.phase != PodPhase::Running, p.seq, p.id.clone()))
            .collect();
        victims.sort();
        victims.truncate(n as usize);

        let mut terminated = 0;
        for pod in state.pods_mut().iter_mut() {
            if victims.iter().any(|(_, _, id)| *id == pod.id) && self.lifecycle.begin_termination(pod) {
                terminated += 1;
            }
        }
        terminated
    }

    /// Write metrics, status and history for one workload.
    fn record(&self, state: &mut ClusterState, plan: &Plan, tick: u64, now: u64) -> Decision {
        let mut active = 0;
        let mut running = 0;
        let mut failed = 0;
        let mut total = 0;
        let mut cpu = 0.0;
        let mut memory = 0.0;
        for pod in state.pods_for(&plan.id) {
            total += 1;
            match pod.phase {
                PodPhase::Running => {
                    running += 1;
                    cpu += pod.cpu;
                    memory += pod.memory_mb;
                }
                PodPhase::Failed => failed += 1,
                _ => {}
            }
            if pod.is_active() {
                active += 1;
            }
        }
        let (avg_cpu, avg_memory_mb) = if running > 0 {
            (cpu / running as f64, memory / running as f64)
        } else {
            (0.0, 0.0)
        };

        state.record_history(
            &plan.id,
            TrafficPoint {
                timestamp: now,
                users: plan.estimate,
                pods: active,
                avg_cpu,
                avg_memory_mb,
            },
            self.history_len,
        );

        let status = if plan.target > 0 && total > 0 && failed == total {
            WorkloadStatus::Failed
        } else if plan.target == 0 && active == 0 {
            WorkloadStatus::ScaledToZero
        } else if running > 0 {
            WorkloadStatus::Running
        } else if active > 0 {
            WorkloadStatus::Deploying
        } else {
            WorkloadStatus::Pending
        };

        if let Some(w) = state.workload_mut(&plan.id) {
            if w.metrics.target != plan.target || w.metrics.last_tick == 0 {
                info!(
                    workload = %plan.id,
                    estimate = plan.estimate,
                    from = w.metrics.target,
                    to = plan.target,
                    policy = %w.config.scaling_policy,
                    "scaling target"
                );
            }
            if w.status != status {
                info!(workload = %plan.id, from = ?w.status, to = ?status, "workload status changed");
                w.status = status;
            }
            w.metrics = WorkloadMetrics {
                estimated_users: plan.estimate,
                policy_target: plan.desired,
                target: plan.target,
                active_pods: active,
                running_pods: running,
                last_tick: tick,
            };
        }

        Decision {
            workload_id: plan.id.clone(),
            tenant_id: plan.tenant_id.clone(),
            estimate: plan.estimate,
            policy_target: plan.desired,
            target: plan.target,
            clamped: plan.clamped,
            active_before: plan.active_before,
            created: plan.create,
            terminated: plan.terminated,
            active_after: active,
        }
    }
}

/// Per-workload scratch state of one tick.
struct Plan {
    id: WorkloadId,
    tenant_id: TenantId,
    estimate: f64,
    desired: u32,
    floor: u32,
    target: u32,
    clamped: bool,
    active_before: u32,
    create: u32,
    terminated: u32,
}

/// The op that brings the backend in line with `target`, if one is needed.
fn sync_op(w: &Workload, target: u32) -> Option<ClusterOp> {
    match (w.mirrored_replicas, w.sync) {
        // Initial deploy still in flight.
        (None, SyncStatus::Pending) => None,
        (None, _) => Some(deploy_op(w, target)),
        (Some(n), sync) if n != target || sync == SyncStatus::SimulationOnly => Some(ClusterOp::Scale {
            namespace: w.namespace.clone(),
            name: w.id.clone(),
            replicas: target,
        }),
        _ => None,
    }
}

/// Create-or-update op for a workload at `replicas`.
pub fn deploy_op(w: &Workload, replicas: u32) -> ClusterOp {
    ClusterOp::Deploy {
        namespace: w.namespace.clone(),
        name: w.id.clone(),
        image: w.image.clone(),
        port: w.config.port,
        replicas,
        resources: w.config.resources,
    }
}
