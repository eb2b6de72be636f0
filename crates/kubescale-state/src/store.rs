//! ClusterState — the owned state container of one control plane.
//!
//! Tenants, workloads and pods are kept in insertion order so iteration
//! (and therefore RNG consumption during a tick) is deterministic.
//! Pod ids come from a counter that only moves forward.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;

use kubescale_core::{PodId, ValidationError};

use crate::error::{PlatformError, PlatformResult};
use crate::lifecycle::PodLifecycle;
use crate::types::*;

/// USD per pod-hour used for the cost estimate.
pub const HOURLY_RATE_PER_POD: f64 = 0.096;

#[derive(Debug, Default)]
pub struct ClusterState {
    tenants: Vec<Tenant>,
    workloads: Vec<Workload>,
    pods: Vec<Pod>,
    signals: HashMap<String, TrafficSignal>,
    history: HashMap<String, VecDeque<TrafficPoint>>,
    next_pod: u64,
    next_seq: u64,
    tick: u64,
}

impl ClusterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of completed reconciliation ticks.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Mark the end of a tick; returns the new tick number.
    pub fn finish_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    // ── Tenants ────────────────────────────────────────────────────

    pub fn insert_tenant(&mut self, tenant: Tenant) -> PlatformResult<()> {
        if self.tenant(&tenant.id).is_some() {
            return Err(ValidationError::Duplicate {
                kind: "tenant",
                id: tenant.id,
            }
            .into());
        }
        debug!(tenant = %tenant.id, "tenant stored");
        self.tenants.push(tenant);
        Ok(())
    }

    pub fn tenant(&self, id: &str) -> Option<&Tenant> {
        self.tenants.iter().find(|t| t.id == id)
    }

    pub fn tenant_mut(&mut self, id: &str) -> Option<&mut Tenant> {
        self.tenants.iter_mut().find(|t| t.id == id)
    }

    pub fn tenants(&self) -> &[Tenant] {
        &self.tenants
    }

    // ── Workloads ──────────────────────────────────────────────────

    /// Store a new workload and assign its creation sequence.
    pub fn insert_workload(&mut self, mut workload: Workload) -> PlatformResult<u64> {
        if self.tenant(&workload.tenant_id).is_none() {
            return Err(PlatformError::TenantNotFound(workload.tenant_id));
        }
        if self.workload(&workload.id).is_some() {
            return Err(ValidationError::Duplicate {
                kind: "workload",
                id: workload.id,
            }
            .into());
        }
        let seq = self.next_seq();
        workload.seq = seq;
        self.signals.insert(workload.id.clone(), TrafficSignal::unfed());
        self.history.insert(workload.id.clone(), VecDeque::new());
        debug!(workload = %workload.id, seq, "workload stored");
        self.workloads.push(workload);
        Ok(seq)
    }

    pub fn workload(&self, id: &str) -> Option<&Workload> {
        self.workloads.iter().find(|w| w.id == id)
    }

    pub fn workload_mut(&mut self, id: &str) -> Option<&mut Workload> {
        self.workloads.iter_mut().find(|w| w.id == id)
    }

    /// All workloads, oldest first.
    pub fn workloads(&self) -> &[Workload] {
        &self.workloads
    }

    /// A tenant's workloads, oldest first.
    pub fn workloads_for_tenant<'a>(&'a self, tenant_id: &'a str) -> impl Iterator<Item = &'a Workload> + 'a {
        self.workloads.iter().filter(move |w| w.tenant_id == tenant_id)
    }

    // ── Pods ───────────────────────────────────────────────────────

    /// Create a `PENDING` pod for a workload. Ids are never reused.
    pub fn spawn_pod(&mut self, lifecycle: &PodLifecycle, workload_id: &str, name_prefix: &str, now: u64) -> PodId {
        self.next_pod += 1;
        let n = self.next_pod;
        let seq = self.next_seq();
        let pod = lifecycle.new_pod(
            format!("pod-{n}"),
            format!("{name_prefix}-{n:05x}"),
            workload_id,
            now,
            seq,
        );
        let id = pod.id.clone();
        self.pods.push(pod);
        id
    }

    /// All pods in insertion order.
    pub fn pods(&self) -> &[Pod] {
        &self.pods
    }

    pub fn pods_mut(&mut self) -> &mut [Pod] {
        &mut self.pods
    }

    pub fn pods_for<'a>(&'a self, workload_id: &'a str) -> impl Iterator<Item = &'a Pod> + 'a {
        self.pods.iter().filter(move |p| p.workload_id == workload_id)
    }

    /// Pending + running pods of a workload.
    pub fn active_count(&self, workload_id: &str) -> u32 {
        self.pods_for(workload_id).filter(|p| p.is_active()).count() as u32
    }

    /// Pending + running pods across all of a tenant's workloads.
    pub fn tenant_active_count(&self, tenant_id: &str) -> u32 {
        self.workloads_for_tenant(tenant_id)
            .map(|w| self.active_count(&w.id))
            .sum()
    }

    /// Drop the pods whose ids are listed. Returns how many were removed.
    pub fn remove_pods(&mut self, ids: &[PodId]) -> usize {
        let before = self.pods.len();
        self.pods.retain(|p| !ids.contains(&p.id));
        before - self.pods.len()
    }

    /// Drop FAILED pods beyond the newest `retention` per workload.
    pub fn prune_failed(&mut self, retention: usize) -> usize {
        let mut kept: HashMap<&str, usize> = HashMap::new();
        let mut doomed = Vec::new();
        // Newest first, so the oldest failures are the ones dropped.
        for pod in self.pods.iter().rev() {
            if pod.phase != PodPhase::Failed {
                continue;
            }
            let n = kept.entry(pod.workload_id.as_str()).or_default();
            if *n < retention {
                *n += 1;
            } else {
                doomed.push(pod.id.clone());
            }
        }
        if !doomed.is_empty() {
            debug!(pruned = doomed.len(), retention, "failed pods pruned");
        }
        self.remove_pods(&doomed)
    }

    // ── Traffic ────────────────────────────────────────────────────

    pub fn signal(&self, workload_id: &str) -> Option<&TrafficSignal> {
        self.signals.get(workload_id)
    }

    pub fn signal_mut(&mut self, workload_id: &str) -> Option<&mut TrafficSignal> {
        self.signals.get_mut(workload_id)
    }

    /// Append a display point, keeping at most `cap` entries.
    pub fn record_history(&mut self, workload_id: &str, point: TrafficPoint, cap: usize) {
        let ring = self.history.entry(workload_id.to_string()).or_default();
        ring.push_back(point);
        while ring.len() > cap {
            ring.pop_front();
        }
    }

    pub fn history(&self, workload_id: &str) -> Option<&VecDeque<TrafficPoint>> {
        self.history.get(workload_id)
    }

    // ── Snapshots ──────────────────────────────────────────────────

    /// Copy of the whole state, consistent as of the last completed tick.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            tick: self.tick,
            tenants: self.tenants.clone(),
            workloads: self.workloads.clone(),
            pods: self.pods.clone(),
            samples: self
                .workloads
                .iter()
                .filter_map(|w| self.signals.get(&w.id)?.latest.clone())
                .collect(),
            history: self
                .history
                .iter()
                .map(|(k, v)| (k.clone(), v.iter().cloned().collect()))
                .collect(),
        }
    }
}

/// Read-only, serializable view handed to dashboards and the API.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub tick: u64,
    pub tenants: Vec<Tenant>,
    pub workloads: Vec<Workload>,
    pub pods: Vec<Pod>,
    pub samples: Vec<TrafficSample>,
    pub history: HashMap<String, Vec<TrafficPoint>>,
}

impl Snapshot {
    /// Pods of one workload, or every pod.
    pub fn pods(&self, workload_id: Option<&str>) -> Vec<Pod> {
        self.pods
            .iter()
            .filter(|p| workload_id.is_none_or(|id| p.workload_id == id))
            .cloned()
            .collect()
    }

    /// Workloads of one tenant, or every workload.
    pub fn workloads(&self, tenant_id: Option<&str>) -> Vec<Workload> {
        self.workloads
            .iter()
            .filter(|w| tenant_id.is_none_or(|id| w.tenant_id == id))
            .cloned()
            .collect()
    }

    pub fn workload(&self, id: &str) -> Option<&Workload> {
        self.workloads.iter().find(|w| w.id == id)
    }

    pub fn sample(&self, workload_id: &str) -> Option<&TrafficSample> {
        self.samples.iter().find(|s| s.workload_id == workload_id)
    }

    pub fn active_pods(&self, workload_id: &str) -> u32 {
        self.pods
            .iter()
            .filter(|p| p.workload_id == workload_id && p.is_active())
            .count() as u32
    }

    pub fn tenant_active_pods(&self, tenant_id: &str) -> u32 {
        self.workloads
            .iter()
            .filter(|w| w.tenant_id == tenant_id)
            .map(|w| self.active_pods(&w.id))
            .sum()
    }

    /// Estimated USD per hour for a workload's active pods.
    pub fn hourly_cost(&self, workload_id: &str) -> f64 {
        self.active_pods(workload_id) as f64 * HOURLY_RATE_PER_POD
    }

    pub fn tenant_hourly_cost(&self, tenant_id: &str) -> f64 {
        self.tenant_active_pods(tenant_id) as f64 * HOURLY_RATE_PER_POD
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubescale_core::config::LifecycleConfig;
    use kubescale_core::{ImageRef, Plan, ReplicaBounds, ResourceRequest, ScalingPolicy, TenantQuota, WorkloadConfig};

    fn test_tenant(id: &str) -> Tenant {
        Tenant {
            id: id.to_string(),
            name: id.to_string(),
            plan: Plan::Basic,
            namespace: id.to_string(),
            quota: TenantQuota::for_plan(Plan::Basic),
            reserved: QuotaUsage::default(),
            created_at: 1000,
        }
    }

    fn test_workload(tenant_id: &str, name: &str) -> Workload {
        Workload {
            id: format!("{tenant_id}-{name}"),
            tenant_id: tenant_id.to_string(),
            name: name.to_string(),
            namespace: tenant_id.to_string(),
            image: ImageRef::parse("nginx:alpine").unwrap(),
            config: WorkloadConfig {
                port: 80,
                replicas: ReplicaBounds { min: 1, max: 5 },
                resources: ResourceRequest::default(),
                scaling_policy: ScalingPolicy::Balanced,
            },
            status: WorkloadStatus::Pending,
            metrics: WorkloadMetrics::default(),
            sync: SyncStatus::Pending,
            mirrored_replicas: None,
            created_at: 1000,
            seq: 0,
        }
    }

    fn lifecycle() -> PodLifecycle {
        PodLifecycle::new(LifecycleConfig::default())
    }

    #[test]
    fn duplicate_tenant_rejected() {
        let mut state = ClusterState::new();
        state.insert_tenant(test_tenant("tenant-acme")).unwrap();
        let err = state.insert_tenant(test_tenant("tenant-acme")).unwrap_err();
        assert!(matches!(
            err,
            PlatformError::Validation(ValidationError::Duplicate { kind: "tenant", .. })
        ));
    }

    #[test]
    fn workload_requires_tenant() {
        let mut state = ClusterState::new();
        let err = state.insert_workload(test_workload("tenant-x", "web")).unwrap_err();
        assert_eq!(err, PlatformError::TenantNotFound("tenant-x".into()));
    }

    #[test]
    fn workload_sequence_orders_by_creation() {
        let mut state = ClusterState::new();
        state.insert_tenant(test_tenant("tenant-acme")).unwrap();
        let a = state.insert_workload(test_workload("tenant-acme", "a")).unwrap();
        let b = state.insert_workload(test_workload("tenant-acme", "b")).unwrap();
        assert!(a < b);
        assert_eq!(state.signal("tenant-acme-a").unwrap().mode, SignalMode::Unfed);
    }

    #[test]
    fn pod_ids_are_never_reused() {
        let mut state = ClusterState::new();
        let lc = lifecycle();
        let first = state.spawn_pod(&lc, "w", "web", 1);
        assert_eq!(state.remove_pods(std::slice::from_ref(&first)), 1);
        let second = state.spawn_pod(&lc, "w", "web", 2);
        assert_ne!(first, second);
        assert_eq!(state.pods().len(), 1);
    }

    #[test]
    fn active_counts_skip_terminating() {
        let mut state = ClusterState::new();
        state.insert_tenant(test_tenant("tenant-acme")).unwrap();
        state.insert_workload(test_workload("tenant-acme", "web")).unwrap();
        let lc = lifecycle();
        for _ in 0..3 {
            state.spawn_pod(&lc, "tenant-acme-web", "web", 1);
        }
        state.pods_mut()[0].phase = PodPhase::Terminating;
        assert_eq!(state.active_count("tenant-acme-web"), 2);
        assert_eq!(state.tenant_active_count("tenant-acme"), 2);
    }

    #[test]
    fn history_is_bounded() {
        let mut state = ClusterState::new();
        for i in 0..10 {
            let point = TrafficPoint {
                timestamp: i,
                users: i as f64,
                pods: 0,
                avg_cpu: 0.0,
                avg_memory_mb: 0.0,
            };
            state.record_history("w", point, 4);
        }
        let ring = state.history("w").unwrap();
        assert_eq!(ring.len(), 4);
        assert_eq!(ring.front().unwrap().timestamp, 6);
    }

    #[test]
    fn snapshot_filters_and_costs() {
        let mut state = ClusterState::new();
        state.insert_tenant(test_tenant("tenant-a")).unwrap();
        state.insert_tenant(test_tenant("tenant-b")).unwrap();
        state.insert_workload(test_workload("tenant-a", "web")).unwrap();
        state.insert_workload(test_workload("tenant-b", "api")).unwrap();
        let lc = lifecycle();
        state.spawn_pod(&lc, "tenant-a-web", "web", 1);
        state.spawn_pod(&lc, "tenant-a-web", "web", 1);
        state.spawn_pod(&lc, "tenant-b-api", "api", 1);

        let snap = state.snapshot();
        assert_eq!(snap.pods(None).len(), 3);
        assert_eq!(snap.pods(Some("tenant-a-web")).len(), 2);
        assert_eq!(snap.workloads(Some("tenant-b")).len(), 1);
        assert!((snap.tenant_hourly_cost("tenant-a") - 2.0 * HOURLY_RATE_PER_POD).abs() < 1e-9);
    }

    #[test]
    fn snapshot_wire_format() {
        let mut state = ClusterState::new();
        state.insert_tenant(test_tenant("tenant-a")).unwrap();
        state.insert_workload(test_workload("tenant-a", "web")).unwrap();
        state.spawn_pod(&lifecycle(), "tenant-a-web", "web", 1);

        let json = serde_json::to_value(state.snapshot()).unwrap();
        assert_eq!(json["pods"][0]["phase"], "PENDING");
        assert_eq!(json["pods"][0]["id"], "pod-1");
        assert_eq!(json["workloads"][0]["status"], "pending");
        assert_eq!(json["workloads"][0]["config"]["scaling_policy"], "balanced");
        assert_eq!(json["tenants"][0]["plan"], "basic");
    }

    #[test]
    fn prune_keeps_newest_failures_per_workload() {
        let mut state = ClusterState::new();
        let lc = lifecycle();
        let mut failed = Vec::new();
        for i in 0..4 {
            failed.push(state.spawn_pod(&lc, "a", "a", i));
        }
        let other = state.spawn_pod(&lc, "b", "b", 9);
        let pending = state.spawn_pod(&lc, "a", "a", 10);
        for pod in state.pods_mut() {
            if pod.id != pending {
                pod.phase = PodPhase::Failed;
            }
        }

        assert_eq!(state.prune_failed(2), 2);
        let ids: Vec<_> = state.pods().iter().map(|p| p.id.clone()).collect();
        assert_eq!(ids, vec![failed[2].clone(), failed[3].clone(), other, pending]);
        assert_eq!(state.prune_failed(2), 0);
    }
}
