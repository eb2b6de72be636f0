//! Platform — the boundary operations and the periodic loops.
//!
//! One `Platform` is one independent control plane. Lock order is always
//! reconciler, then state; backend calls never run under either lock.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinSet;
use tracing::{debug, info};

use kubescale_autoscale::{PredictionFeed, TrafficSource};
use kubescale_cluster::{ClusterDriver, ClusterLink, ClusterOp, LinkMode};
use kubescale_core::{ImageRef, Plan, ScaleConfig, WorkloadConfig, validate_name};
use kubescale_state::quota::{check_and_reserve, reservation_for};
use kubescale_state::{
    ClusterState, PlatformError, PlatformResult, Pod, PodLifecycle, QuotaUsage, Snapshot,
    SyncStatus, Tenant, TrafficPoint, TrafficSample, Workload, WorkloadMetrics, WorkloadStatus,
};

use crate::reconciler::{Reconciler, SyncIntent, TickReport, deploy_op};

/// Liveness summary for `/health`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Health {
    pub mode: LinkMode,
    pub driver: &'static str,
    pub tick: u64,
    pub tenants: usize,
    pub workloads: usize,
    pub pods: usize,
}

#[derive(Clone)]
pub struct Platform {
    inner: Arc<Inner>,
}

struct Inner {
    config: ScaleConfig,
    reconciler: Mutex<Reconciler>,
    state: RwLock<ClusterState>,
    link: ClusterLink,
    lifecycle: PodLifecycle,
    traffic: TrafficSource,
    sync_tasks: Mutex<JoinSet<()>>,
}

impl Platform {
    pub fn new(config: ScaleConfig, driver: Arc<dyn ClusterDriver>) -> Self {
        let reconciler = Reconciler::new(&config);
        let link = ClusterLink::new(driver, &config.cluster);
        Self::assemble(config, reconciler, link)
    }

    /// Platform without a backend.
    pub fn simulated(config: ScaleConfig) -> Self {
        Self::new(config, Arc::new(kubescale_cluster::SimulatedDriver))
    }

    /// Platform with an explicit reconciler and link.
    pub fn assemble(config: ScaleConfig, reconciler: Reconciler, link: ClusterLink) -> Self {
        Self {
            inner: Arc::new(Inner {
                lifecycle: reconciler.lifecycle().clone(),
                traffic: reconciler.traffic().clone(),
                reconciler: Mutex::new(reconciler),
                state: RwLock::new(ClusterState::new()),
                link,
                config,
                sync_tasks: Mutex::new(JoinSet::new()),
            }),
        }
    }

    pub fn config(&self) -> &ScaleConfig {
        &self.inner.config
    }

    // ── Boundary operations ────────────────────────────────────────

    /// Create a tenant with its plan's quota and reserve its namespace.
    pub async fn create_tenant(&self, name: &str, plan: Plan) -> PlatformResult<Tenant> {
        let slug = validate_name("tenant", name)?;
        let id = format!("tenant-{slug}");
        let tenant = Tenant {
            namespace: id.clone(),
            id,
            name: name.trim().to_string(),
            plan,
            quota: self.inner.config.quota_for(plan),
            reserved: QuotaUsage::default(),
            created_at: epoch_millis(),
        };

        self.inner.state.write().await.insert_tenant(tenant.clone())?;
        info!(tenant = %tenant.id, plan = %plan, pods = tenant.quota.pods, "tenant created");

        let namespace = tenant.namespace.clone();
        let quota = tenant.quota;
        // The quota lands in the namespace, so these two go in order.
        self.spawn_sync(vec![vec![
            SyncIntent {
                workload_id: None,
                op: ClusterOp::EnsureNamespace {
                    namespace: namespace.clone(),
                },
            },
            SyncIntent {
                workload_id: None,
                op: ClusterOp::ApplyQuota { namespace, quota },
            },
        ]])
        .await;
        Ok(tenant)
    }

    /// Admit a workload against its tenant's quota and seed `replicas.min`
    /// pending pods.
    pub async fn deploy_workload(
        &self,
        tenant_id: &str,
        name: &str,
        image: &str,
        config: WorkloadConfig,
    ) -> PlatformResult<Workload> {
        let slug = validate_name("workload", name)?;
        let image = ImageRef::parse(image)?;
        config.validate()?;

        let workload = {
            let mut state = self.inner.state.write().await;
            let namespace = match state.tenant(tenant_id) {
                Some(t) => t.namespace.clone(),
                None => return Err(PlatformError::TenantNotFound(tenant_id.to_string())),
            };
            let id = format!("{tenant_id}-{slug}");
            if state.workload(&id).is_some() {
                return Err(kubescale_core::ValidationError::Duplicate { kind: "workload", id }.into());
            }

            let active = state.tenant_active_count(tenant_id);
            let tenant = state
                .tenant_mut(tenant_id)
                .ok_or_else(|| PlatformError::TenantNotFound(tenant_id.to_string()))?;
            check_and_reserve(tenant, reservation_for(&config), active)?;

            let now = epoch_millis();
            let min = config.replicas.min;
            let workload = Workload {
                id: id.clone(),
                tenant_id: tenant_id.to_string(),
                name: name.trim().to_string(),
                namespace,
                image,
                config,
                status: if min > 0 {
                    WorkloadStatus::Deploying
                } else {
                    WorkloadStatus::Pending
                },
                metrics: WorkloadMetrics {
                    active_pods: min,
                    ..WorkloadMetrics::default()
                },
                sync: SyncStatus::Pending,
                mirrored_replicas: None,
                created_at: now,
                seq: 0,
            };
            let seq = state.insert_workload(workload)?;
            for _ in 0..min {
                state.spawn_pod(&self.inner.lifecycle, &id, &id, now);
            }
            let stored = state
                .workload(&id)
                .cloned()
                .ok_or_else(|| PlatformError::WorkloadNotFound(id.clone()))?;
            info!(
                workload = %id,
                seq,
                image = %stored.image,
                min,
                max = stored.config.replicas.max,
                policy = %stored.config.scaling_policy,
                "workload deployed"
            );
            stored
        };

        self.spawn_sync(vec![vec![SyncIntent {
            workload_id: Some(workload.id.clone()),
            op: deploy_op(&workload, workload.config.replicas.min),
        }]])
        .await;
        Ok(workload)
    }

    /// Accept an external traffic prediction for a workload.
    pub async fn submit_prediction(
        &self,
        workload_id: &str,
        estimated_users: f64,
        confidence: Option<f64>,
    ) -> PlatformResult<TrafficSample> {
        let mut state = self.inner.state.write().await;
        let signal = state
            .signal_mut(workload_id)
            .ok_or_else(|| PlatformError::WorkloadNotFound(workload_id.to_string()))?;
        self.inner
            .traffic
            .submit(signal, workload_id, estimated_users, confidence, epoch_millis())?;
        signal
            .latest
            .clone()
            .ok_or_else(|| PlatformError::WorkloadNotFound(workload_id.to_string()))
    }

    pub async fn get_pods(&self, workload_id: Option<&str>) -> Vec<Pod> {
        self.inner.state.read().await.snapshot().pods(workload_id)
    }

    pub async fn get_workloads(&self, tenant_id: Option<&str>) -> Vec<Workload> {
        let state = self.inner.state.read().await;
        match tenant_id {
            Some(id) => state.workloads_for_tenant(id).cloned().collect(),
            None => state.workloads().to_vec(),
        }
    }

    pub async fn tenants(&self) -> Vec<Tenant> {
        self.inner.state.read().await.tenants().to_vec()
    }

    /// Display history of one workload, oldest point first.
    pub async fn traffic_history(&self, workload_id: &str) -> PlatformResult<Vec<TrafficPoint>> {
        let state = self.inner.state.read().await;
        state
            .history(workload_id)
            .map(|ring| ring.iter().cloned().collect())
            .ok_or_else(|| PlatformError::WorkloadNotFound(workload_id.to_string()))
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.inner.state.read().await.snapshot()
    }

    pub async fn health(&self) -> Health {
        let state = self.inner.state.read().await;
        Health {
            mode: self.inner.link.mode().await,
            driver: self.inner.link.driver_name(),
            tick: state.tick(),
            tenants: state.tenants().len(),
            workloads: state.workloads().len(),
            pods: state.pods().len(),
        }
    }

    // ── Ticking ────────────────────────────────────────────────────

    /// Run one tick now and dispatch its intents in the background.
    pub async fn tick(&self) -> TickReport {
        self.tick_at(epoch_millis()).await
    }

    pub async fn tick_at(&self, now: u64) -> TickReport {
        let report = {
            let mut reconciler = self.inner.reconciler.lock().await;
            let mut state = self.inner.state.write().await;
            reconciler.tick(&mut state, now)
        };
        debug!(
            tick = report.tick,
            workloads = report.decisions.len(),
            intents = report.intents.len(),
            "tick committed"
        );
        self.spawn_sync(report.intents.iter().cloned().map(|i| vec![i]).collect())
            .await;
        report
    }

    /// Wait for every in-flight backend call to finish.
    pub async fn settle(&self) {
        let mut tasks = self.inner.sync_tasks.lock().await;
        while tasks.join_next().await.is_some() {}
    }

    /// One background task per chain; intents within a chain run in order.
    async fn spawn_sync(&self, chains: Vec<Vec<SyncIntent>>) {
        if chains.is_empty() {
            return;
        }
        let mut tasks = self.inner.sync_tasks.lock().await;
        // Reap what already finished so the set stays small.
        while tasks.try_join_next().is_some() {}
        for chain in chains {
            let inner = Arc::clone(&self.inner);
            tasks.spawn(async move {
                for intent in chain {
                    let result = inner.link.execute(&intent.op).await;
                    if intent.workload_id.is_some() {
                        let mut state = inner.state.write().await;
                        intent.apply_outcome(&mut state, &result);
                    }
                }
            });
        }
    }

    /// Tick every `reconcile.tick_interval` until `shutdown` flips.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let interval = self.inner.config.reconcile.tick_interval.as_duration();
        info!(
            interval_ms = interval.as_millis() as u64,
            driver = self.inner.link.driver_name(),
            "reconciler started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    info!("reconciler shutting down");
                    break;
                }
            }
        }
    }

    /// Poll `feed` for every workload each `interval` and submit what it
    /// predicts.
    pub async fn run_feed(
        &self,
        mut feed: Box<dyn PredictionFeed>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(feed = feed.name(), interval_ms = interval.as_millis() as u64, "prediction feed started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    self.poll_feed(feed.as_mut()).await;
                }
                _ = shutdown.changed() => {
                    info!(feed = feed.name(), "prediction feed shutting down");
                    break;
                }
            }
        }
    }

    /// One round of predictions. Returns how many were accepted.
    pub async fn poll_feed(&self, feed: &mut dyn PredictionFeed) -> usize {
        let now = epoch_millis();
        let mut accepted = 0;
        for workload in self.get_workloads(None).await {
            let Some(p) = feed.predict(&workload, now) else {
                continue;
            };
            match self
                .submit_prediction(&workload.id, p.estimated_users, Some(p.confidence))
                .await
            {
                Ok(_) => {
                    accepted += 1;
                    debug!(
                        workload = %workload.id,
                        users = p.estimated_users,
                        explanation = %p.explanation,
                        "feed prediction submitted"
                    );
                }
                Err(e) => debug!(workload = %workload.id, error = %e, "feed prediction rejected"),
            }
        }
        accepted
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use kubescale_autoscale::DiurnalFeed;
    use kubescale_cluster::{BoxFuture, ClusterError, ClusterResult};
    use kubescale_core::{
        HumanDuration, ReplicaBounds, ResourceRequest, ScalingPolicy, TenantQuota, ValidationError,
    };
    use kubescale_state::SignalMode;

    fn config() -> ScaleConfig {
        let mut c = ScaleConfig::default();
        c.reconcile.seed = Some(7);
        c
    }

    fn workload_config(min: u32, max: u32) -> WorkloadConfig {
        WorkloadConfig {
            port: 80,
            replicas: ReplicaBounds { min, max },
            resources: ResourceRequest::default(),
            scaling_policy: ScalingPolicy::Balanced,
        }
    }

    /// Backend that refuses everything.
    #[derive(Default)]
    struct DownDriver {
        calls: AtomicU32,
    }

    impl DownDriver {
        fn refuse(&self, op: &'static str) -> BoxFuture<'_, ClusterResult<()>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { Err(ClusterError::failed(op, "connection refused")) })
        }
    }

    impl ClusterDriver for DownDriver {
        fn name(&self) -> &'static str {
            "down"
        }
        fn ensure_namespace<'a>(&'a self, _: &'a str) -> BoxFuture<'a, ClusterResult<()>> {
            self.refuse("ensure_namespace")
        }
        fn apply_quota<'a>(&'a self, _: &'a str, _: &'a TenantQuota) -> BoxFuture<'a, ClusterResult<()>> {
            self.refuse("apply_quota")
        }
        fn deploy_workload<'a>(&'a self, _: &'a ClusterOp) -> BoxFuture<'a, ClusterResult<()>> {
            self.refuse("deploy")
        }
        fn scale_workload<'a>(&'a self, _: &'a str, _: &'a str, _: u32) -> BoxFuture<'a, ClusterResult<()>> {
            self.refuse("scale")
        }
    }

    #[tokio::test]
    async fn create_tenant_derives_ids_and_quota() {
        let p = Platform::simulated(config());
        let t = p.create_tenant("Acme Corp", Plan::Pro).await.unwrap();
        assert_eq!(t.id, "tenant-acme-corp");
        assert_eq!(t.namespace, "tenant-acme-corp");
        assert_eq!(t.quota.pods, 50);
        assert_eq!(p.tenants().await.len(), 1);
    }

    #[tokio::test]
    async fn create_tenant_rejects_blank_and_duplicate_names() {
        let p = Platform::simulated(config());
        assert!(matches!(
            p.create_tenant("   ", Plan::Basic).await,
            Err(PlatformError::Validation(ValidationError::EmptyName("tenant")))
        ));
        p.create_tenant("acme", Plan::Basic).await.unwrap();
        assert!(matches!(
            p.create_tenant("ACME", Plan::Basic).await,
            Err(PlatformError::Validation(ValidationError::Duplicate { .. }))
        ));
    }

    #[tokio::test]
    async fn deploy_seeds_min_pods() {
        let p = Platform::simulated(config());
        let t = p.create_tenant("acme", Plan::Basic).await.unwrap();
        let w = p
            .deploy_workload(&t.id, "web", "nginx:alpine", workload_config(2, 5))
            .await
            .unwrap();
        assert_eq!(w.id, "tenant-acme-web");
        assert_eq!(w.status, WorkloadStatus::Deploying);
        assert_eq!(p.get_pods(Some(&w.id)).await.len(), 2);

        p.settle().await;
        let w = &p.get_workloads(Some(&t.id)).await[0];
        assert_eq!(w.sync, SyncStatus::Mirrored);
        assert_eq!(w.mirrored_replicas, Some(2));
    }

    #[tokio::test]
    async fn deploy_errors() {
        let p = Platform::simulated(config());
        let t = p.create_tenant("acme", Plan::Basic).await.unwrap();

        assert!(matches!(
            p.deploy_workload("tenant-ghost", "web", "nginx", workload_config(1, 2)).await,
            Err(PlatformError::TenantNotFound(_))
        ));
        assert!(matches!(
            p.deploy_workload(&t.id, "web", "not an image", workload_config(1, 2)).await,
            Err(PlatformError::Validation(ValidationError::InvalidImage(_)))
        ));
        assert!(matches!(
            p.deploy_workload(&t.id, "web", "nginx", workload_config(3, 2)).await,
            Err(PlatformError::Validation(ValidationError::InvalidBounds { .. }))
        ));
        // 30 × 100m exceeds the 2000m basic cpu quota.
        assert!(matches!(
            p.deploy_workload(&t.id, "web", "nginx", workload_config(1, 30)).await,
            Err(PlatformError::QuotaExceeded { resource: "cpu", .. })
        ));
        assert!(p.get_workloads(None).await.is_empty());
        assert!(p.get_pods(None).await.is_empty());
        assert_eq!(p.tenants().await[0].reserved, QuotaUsage::default());
    }

    #[tokio::test]
    async fn submit_prediction_marks_signal_external() {
        let p = Platform::simulated(config());
        let t = p.create_tenant("acme", Plan::Basic).await.unwrap();
        let w = p
            .deploy_workload(&t.id, "web", "nginx", workload_config(1, 10))
            .await
            .unwrap();

        let sample = p.submit_prediction(&w.id, 500.0, Some(0.8)).await.unwrap();
        assert_eq!(sample.estimated_users, 500.0);
        assert_eq!(p.inner.state.read().await.signal(&w.id).unwrap().mode, SignalMode::External);

        assert!(matches!(
            p.submit_prediction("tenant-acme-ghost", 1.0, None).await,
            Err(PlatformError::WorkloadNotFound(_))
        ));
        assert!(matches!(
            p.submit_prediction(&w.id, -5.0, None).await,
            Err(PlatformError::Validation(ValidationError::InvalidPrediction(_)))
        ));
    }

    #[tokio::test]
    async fn ticks_are_visible_whole() {
        let p = Platform::simulated(config());
        let t = p.create_tenant("acme", Plan::Basic).await.unwrap();
        let w = p
            .deploy_workload(&t.id, "web", "nginx", workload_config(0, 10))
            .await
            .unwrap();
        p.submit_prediction(&w.id, 500.0, None).await.unwrap();

        let report = p.tick().await;
        assert_eq!(report.tick, 1);
        let snap = p.snapshot().await;
        assert_eq!(snap.tick, 1);
        assert_eq!(snap.active_pods(&w.id), 2);
        assert_eq!(snap.workload(&w.id).unwrap().metrics.target, 5);
        assert_eq!(p.traffic_history(&w.id).await.unwrap().len(), 1);
        assert!(p.traffic_history("nope").await.is_err());
    }

    #[tokio::test]
    async fn backend_failures_never_block_ticks() {
        let driver = Arc::new(DownDriver::default());
        let p = Platform::new(config(), driver.clone());
        let t = p.create_tenant("acme", Plan::Basic).await.unwrap();
        let w = p
            .deploy_workload(&t.id, "web", "nginx", workload_config(1, 10))
            .await
            .unwrap();
        p.submit_prediction(&w.id, 400.0, None).await.unwrap();
        p.settle().await;

        for _ in 0..3 {
            p.tick().await;
            p.settle().await;
        }
        let snap = p.snapshot().await;
        assert_eq!(snap.tick, 3);
        assert_eq!(snap.active_pods(&w.id), 4);
        assert_eq!(snap.workload(&w.id).unwrap().sync, SyncStatus::SimulationOnly);

        let health = p.health().await;
        assert_eq!(health.mode, LinkMode::Degraded);
        assert_eq!(health.driver, "down");
        // Backoff skips calls instead of hammering the backend.
        assert!(driver.calls.load(Ordering::SeqCst) < 6);
    }

    #[tokio::test]
    async fn feed_submits_for_every_workload() {
        let p = Platform::simulated(config());
        let t = p.create_tenant("acme", Plan::Pro).await.unwrap();
        for name in ["web", "api"] {
            p.deploy_workload(&t.id, name, "nginx", workload_config(1, 5))
                .await
                .unwrap();
        }
        let mut feed = DiurnalFeed::new(Some(3));
        assert_eq!(p.poll_feed(&mut feed).await, 2);
        let snap = p.snapshot().await;
        assert_eq!(snap.samples.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_ticks_until_shutdown() {
        let mut c = config();
        c.reconcile.tick_interval = HumanDuration::from_millis(100);
        c.cluster.call_timeout = HumanDuration::from_millis(50);
        let p = Platform::simulated(c);
        let (tx, rx) = watch::channel(false);

        let runner = p.clone();
        let handle = tokio::spawn(async move { runner.run(rx).await });
        tokio::time::sleep(Duration::from_millis(350)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(p.snapshot().await.tick, 3);
    }
}
