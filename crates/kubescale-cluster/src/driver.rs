//! Driver capability interface.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::Serialize;

use kubescale_core::{ImageRef, ResourceRequest, TenantQuota};

use crate::error::ClusterResult;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One mutation to mirror onto the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ClusterOp {
    EnsureNamespace {
        namespace: String,
    },
    ApplyQuota {
        namespace: String,
        quota: TenantQuota,
    },
    Deploy {
        namespace: String,
        name: String,
        image: ImageRef,
        port: u16,
        replicas: u32,
        resources: ResourceRequest,
    },
    Scale {
        namespace: String,
        name: String,
        replicas: u32,
    },
}

impl ClusterOp {
    /// Short operation name for logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            ClusterOp::EnsureNamespace { .. } => "ensure_namespace",
            ClusterOp::ApplyQuota { .. } => "apply_quota",
            ClusterOp::Deploy { .. } => "deploy",
            ClusterOp::Scale { .. } => "scale",
        }
    }

    pub fn namespace(&self) -> &str {
        match self {
            ClusterOp::EnsureNamespace { namespace }
            | ClusterOp::ApplyQuota { namespace, .. }
            | ClusterOp::Deploy { namespace, .. }
            | ClusterOp::Scale { namespace, .. } => namespace,
        }
    }

    /// Replica count this op asks the backend to run, if any.
    pub fn replicas(&self) -> Option<u32> {
        match self {
            ClusterOp::Deploy { replicas, .. } | ClusterOp::Scale { replicas, .. } => Some(*replicas),
            _ => None,
        }
    }

    /// Route the op to the matching driver capability.
    pub fn send<'a>(&'a self, driver: &'a dyn ClusterDriver) -> BoxFuture<'a, ClusterResult<()>> {
        match self {
            ClusterOp::EnsureNamespace { namespace } => driver.ensure_namespace(namespace),
            ClusterOp::ApplyQuota { namespace, quota } => driver.apply_quota(namespace, quota),
            ClusterOp::Deploy { .. } => driver.deploy_workload(self),
            ClusterOp::Scale {
                namespace,
                name,
                replicas,
            } => driver.scale_workload(namespace, name, *replicas),
        }
    }
}

impl fmt::Display for ClusterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterOp::EnsureNamespace { namespace } => write!(f, "ensure namespace {namespace}"),
            ClusterOp::ApplyQuota { namespace, quota } => {
                write!(f, "apply quota {}/{}/{} pods to {namespace}", quota.cpu, quota.memory, quota.pods)
            }
            ClusterOp::Deploy {
                namespace,
                name,
                replicas,
                ..
            } => write!(f, "deploy {namespace}/{name} with {replicas} replicas"),
            ClusterOp::Scale {
                namespace,
                name,
                replicas,
            } => write!(f, "scale {namespace}/{name} to {replicas}"),
        }
    }
}

/// Opaque, fallible operations on an orchestration backend.
///
/// Implementations must be safe to call concurrently; the link issues each
/// op from its own task.
pub trait ClusterDriver: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Whether calls reach a real backend. A driver returning false keeps
    /// the link `Unconfigured`.
    fn is_real(&self) -> bool {
        true
    }

    fn ensure_namespace<'a>(&'a self, namespace: &'a str) -> BoxFuture<'a, ClusterResult<()>>;

    fn apply_quota<'a>(&'a self, namespace: &'a str, quota: &'a TenantQuota) -> BoxFuture<'a, ClusterResult<()>>;

    /// Create or update a workload. `op` is always `ClusterOp::Deploy`.
    fn deploy_workload<'a>(&'a self, op: &'a ClusterOp) -> BoxFuture<'a, ClusterResult<()>>;

    fn scale_workload<'a>(&'a self, namespace: &'a str, name: &'a str, replicas: u32) -> BoxFuture<'a, ClusterResult<()>>;
}

/// No backend: every call succeeds without doing anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedDriver;

impl ClusterDriver for SimulatedDriver {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn is_real(&self) -> bool {
        false
    }

    fn ensure_namespace<'a>(&'a self, _namespace: &'a str) -> BoxFuture<'a, ClusterResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn apply_quota<'a>(&'a self, _namespace: &'a str, _quota: &'a TenantQuota) -> BoxFuture<'a, ClusterResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn deploy_workload<'a>(&'a self, _op: &'a ClusterOp) -> BoxFuture<'a, ClusterResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn scale_workload<'a>(&'a self, _namespace: &'a str, _name: &'a str, _replicas: u32) -> BoxFuture<'a, ClusterResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
