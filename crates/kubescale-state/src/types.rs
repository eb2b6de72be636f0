//! Domain types for the control plane state.
//!
//! These types are what the dashboard and the API see. All of them are
//! serializable; timestamps are unix milliseconds.

use serde::{Deserialize, Serialize};

use kubescale_core::{
    CpuMillis, ImageRef, MemoryBytes, Plan, PodId, TenantId, TenantQuota, WorkloadConfig,
    WorkloadId,
};

// ── Tenant ────────────────────────────────────────────────────────

/// A customer of the platform, isolated in its own namespace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub plan: Plan,
    pub namespace: String,
    pub quota: TenantQuota,
    /// Sum of deploy-time reservations of the tenant's workloads.
    pub reserved: QuotaUsage,
    pub created_at: u64,
}

/// Resource amounts counted against a `TenantQuota`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuotaUsage {
    pub pods: u32,
    pub cpu: CpuMillis,
    pub memory: MemoryBytes,
}

impl QuotaUsage {
    pub fn saturating_add(self, other: QuotaUsage) -> QuotaUsage {
        QuotaUsage {
            pods: self.pods.saturating_add(other.pods),
            cpu: CpuMillis(self.cpu.0.saturating_add(other.cpu.0)),
            memory: MemoryBytes(self.memory.0.saturating_add(other.memory.0)),
        }
    }
}

// ── Workload ──────────────────────────────────────────────────────

/// A deployable application owned by exactly one tenant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workload {
    pub id: WorkloadId,
    pub tenant_id: TenantId,
    pub name: String,
    pub namespace: String,
    pub image: ImageRef,
    pub config: WorkloadConfig,
    pub status: WorkloadStatus,
    /// Outcome of the most recent reconciliation tick.
    pub metrics: WorkloadMetrics,
    pub sync: SyncStatus,
    /// Replica count last accepted by the cluster backend.
    pub mirrored_replicas: Option<u32>,
    pub created_at: u64,
    /// Creation order; lower is older and wins quota contention.
    pub seq: u64,
}

/// Lifecycle status of a workload as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkloadStatus {
    Pending,
    Deploying,
    Running,
    Failed,
    ScaledToZero,
}

/// Per-tick decision record kept on the workload.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkloadMetrics {
    pub estimated_users: f64,
    /// Target from the scaling policy, before quota.
    pub policy_target: u32,
    /// Target after tenant quota allocation.
    pub target: u32,
    pub active_pods: u32,
    pub running_pods: u32,
    pub last_tick: u64,
}

/// Whether the workload's intent is reaching a real cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Nothing confirmed yet.
    Pending,
    /// Last call to the backend succeeded.
    Mirrored,
    /// Last call failed or timed out; local state only until the next success.
    SimulationOnly,
}

// ── Pod ───────────────────────────────────────────────────────────

/// A single replica of a workload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pod {
    pub id: PodId,
    pub name: String,
    pub workload_id: WorkloadId,
    pub phase: PodPhase,
    /// CPU utilization, percent.
    pub cpu: f64,
    /// Memory usage, MB.
    pub memory_mb: f64,
    pub created_at: u64,
    /// Global insertion order, used as the oldest-first tie-break.
    pub seq: u64,
    /// Lifecycle steps spent in `Terminating`.
    pub terminating_ticks: u32,
}

/// Lifecycle phase of a pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PodPhase {
    Pending,
    Running,
    Terminating,
    Failed,
}

impl Pod {
    /// Pending or running: counts toward bounds and quota.
    pub fn is_active(&self) -> bool {
        matches!(self.phase, PodPhase::Pending | PodPhase::Running)
    }
}

// ── Traffic ───────────────────────────────────────────────────────

/// Where a traffic estimate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    External,
    Fallback,
}

/// A demand estimate for one workload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrafficSample {
    pub workload_id: WorkloadId,
    pub estimated_users: f64,
    pub timestamp: u64,
    pub confidence: Option<f64>,
    pub provenance: Provenance,
}

/// Signal source state of a workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalMode {
    /// No prediction has ever arrived.
    Unfed,
    /// Using the latest external prediction verbatim.
    External,
    /// External predictions stopped arriving; simulating from the last one.
    Lost,
}

/// Latest estimate per workload plus the mode it was produced in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrafficSignal {
    pub mode: SignalMode,
    pub latest: Option<TrafficSample>,
    /// When the last external prediction arrived.
    pub last_external_at: Option<u64>,
}

impl TrafficSignal {
    pub fn unfed() -> Self {
        Self {
            mode: SignalMode::Unfed,
            latest: None,
            last_external_at: None,
        }
    }
}

/// One point of a workload's display history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrafficPoint {
    pub timestamp: u64,
    pub users: f64,
    pub pods: u32,
    pub avg_cpu: f64,
    pub avg_memory_mb: f64,
}
