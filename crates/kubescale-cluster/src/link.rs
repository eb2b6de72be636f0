//! ClusterLink — availability tracking around a driver.
//!
//! Every call is bounded by `call_timeout`. Failures and timeouts move the
//! link to `Degraded` and schedule the next attempt with exponential
//! backoff; calls issued before that point are skipped without touching
//! the backend. The first success after a failure resets the backoff.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::{Instant, timeout};
use tracing::{debug, info, warn};

use kubescale_core::config::ClusterConfig;

use crate::driver::{ClusterDriver, ClusterOp};
use crate::error::{ClusterError, ClusterResult};

/// Reachability of the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No backend configured; every call is a local no-op.
    Unconfigured,
    /// The last call reached the backend and succeeded.
    Available,
    /// The last call failed. Nothing is sent before `retry_at`.
    Degraded {
        failures: u32,
        retry_at: Instant,
        backoff: Duration,
    },
}

/// Coarse, serializable view of `LinkState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkMode {
    Simulation,
    RealCluster,
    Degraded,
}

impl LinkMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkMode::Simulation => "simulation",
            LinkMode::RealCluster => "real-cluster",
            LinkMode::Degraded => "degraded",
        }
    }
}

impl From<LinkState> for LinkMode {
    fn from(s: LinkState) -> Self {
        match s {
            LinkState::Unconfigured => LinkMode::Simulation,
            LinkState::Available => LinkMode::RealCluster,
            LinkState::Degraded { .. } => LinkMode::Degraded,
        }
    }
}

pub struct ClusterLink {
    driver: Arc<dyn ClusterDriver>,
    call_timeout: Duration,
    backoff_initial: Duration,
    backoff_max: Duration,
    state: Mutex<LinkState>,
}

impl ClusterLink {
    pub fn new(driver: Arc<dyn ClusterDriver>, config: &ClusterConfig) -> Self {
        Self::with_timings(
            driver,
            config.call_timeout.as_duration(),
            config.backoff_initial.as_duration(),
            config.backoff_max.as_duration(),
        )
    }

    pub fn with_timings(
        driver: Arc<dyn ClusterDriver>,
        call_timeout: Duration,
        backoff_initial: Duration,
        backoff_max: Duration,
    ) -> Self {
        // Real drivers start optimistic; the first failure degrades them.
        let initial = if driver.is_real() {
            LinkState::Available
        } else {
            LinkState::Unconfigured
        };
        Self {
            driver,
            call_timeout,
            backoff_initial,
            backoff_max: backoff_max.max(backoff_initial),
            state: Mutex::new(initial),
        }
    }

    /// Link that never reaches a backend.
    pub fn simulated() -> Self {
        Self::new(Arc::new(crate::driver::SimulatedDriver), &ClusterConfig::default())
    }

    pub fn driver_name(&self) -> &'static str {
        self.driver.name()
    }

    pub async fn state(&self) -> LinkState {
        *self.state.lock().await
    }

    pub async fn mode(&self) -> LinkMode {
        self.state().await.into()
    }

    /// Send one op to the backend, bounded by the call timeout.
    pub async fn execute(&self, op: &ClusterOp) -> ClusterResult<()> {
        if !self.driver.is_real() {
            return op.send(self.driver.as_ref()).await;
        }

        if let LinkState::Degraded { retry_at, .. } = *self.state.lock().await {
            let now = Instant::now();
            if now < retry_at {
                return Err(ClusterError::BackingOff {
                    op: op.kind(),
                    retry_in: retry_at - now,
                });
            }
        }

        let result = match timeout(self.call_timeout, op.send(self.driver.as_ref())).await {
            Ok(r) => r,
            Err(_) => Err(ClusterError::Timeout {
                op: op.kind(),
                after: self.call_timeout,
            }),
        };
        self.record(op, &result).await;
        result
    }

    async fn record(&self, op: &ClusterOp, result: &ClusterResult<()>) {
        let mut state = self.state.lock().await;
        match result {
            Ok(()) => {
                if matches!(*state, LinkState::Degraded { .. }) {
                    info!(driver = self.driver.name(), op = op.kind(), "cluster backend available again");
                }
                debug!(op = %op, "mirrored to cluster");
                *state = LinkState::Available;
            }
            Err(e) => {
                let (failures, backoff) = match *state {
                    LinkState::Degraded { failures, backoff, .. } => {
                        (failures + 1, (backoff * 2).min(self.backoff_max))
                    }
                    _ => (1, self.backoff_initial),
                };
                warn!(
                    driver = self.driver.name(),
                    op = op.kind(),
                    namespace = op.namespace(),
                    failures,
                    backoff = ?backoff,
                    error = %e,
                    "cluster call failed, simulation-only until retry"
                );
                *state = LinkState::Degraded {
                    failures,
                    retry_at: Instant::now() + backoff,
                    backoff,
                };
            }
        }
    }
}
