//! kubectl-backed driver.
//!
//! Manifests are built as JSON and piped to `kubectl apply -f -`, so no
//! temporary files are written. Every child process is killed when its
//! future is dropped, which is what the link's timeout relies on.

use std::process::Stdio;

use serde_json::{Value, json};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use kubescale_core::{ImageRef, TenantQuota};

use crate::driver::{BoxFuture, ClusterDriver, ClusterOp};
use crate::error::{ClusterError, ClusterResult};

/// Label every managed object carries.
const MANAGED_BY: &str = "kubescale";

#[derive(Debug, Clone)]
pub struct KubectlDriver {
    program: String,
    context: Option<String>,
}

impl KubectlDriver {
    pub fn new(program: impl Into<String>, context: Option<String>) -> Self {
        Self {
            program: program.into(),
            context,
        }
    }

    fn base_args(&self) -> Vec<String> {
        match &self.context {
            Some(ctx) => vec!["--context".to_string(), ctx.clone()],
            None => Vec::new(),
        }
    }

    async fn run(&self, op: &'static str, args: Vec<String>, stdin: Option<String>) -> ClusterResult<()> {
        let mut full = self.base_args();
        full.extend(args);
        debug!(program = %self.program, args = ?full, "running kubectl");

        let mut cmd = Command::new(&self.program);
        cmd.args(&full)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| ClusterError::failed(op, format!("spawning {}: {e}", self.program)))?;

        if let Some(input) = stdin
            && let Some(mut pipe) = child.stdin.take()
        {
            pipe.write_all(input.as_bytes())
                .await
                .map_err(|e| ClusterError::failed(op, format!("writing manifest: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ClusterError::failed(op, e.to_string()))?;

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(ClusterError::failed(op, stderr.trim().to_string()))
    }

    async fn apply(&self, op: &'static str, manifest: Value) -> ClusterResult<()> {
        self.run(op, vec!["apply".into(), "-f".into(), "-".into()], Some(manifest.to_string()))
            .await
    }
}

impl ClusterDriver for KubectlDriver {
    fn name(&self) -> &'static str {
        "kubectl"
    }

    fn ensure_namespace<'a>(&'a self, namespace: &'a str) -> BoxFuture<'a, ClusterResult<()>> {
        Box::pin(async move {
            let result = self
                .run(
                    "ensure_namespace",
                    vec!["create".into(), "namespace".into(), namespace.to_string()],
                    None,
                )
                .await;
            match result {
                Err(ClusterError::Failed { reason, .. }) if reason.contains("AlreadyExists") => {
                    debug!(namespace, "namespace already exists");
                    Ok(())
                }
                other => other,
            }
        })
    }

    fn apply_quota<'a>(&'a self, namespace: &'a str, quota: &'a TenantQuota) -> BoxFuture<'a, ClusterResult<()>> {
        Box::pin(async move { self.apply("apply_quota", quota_manifest(namespace, quota)).await })
    }

    fn deploy_workload<'a>(&'a self, op: &'a ClusterOp) -> BoxFuture<'a, ClusterResult<()>> {
        Box::pin(async move {
            let manifests = deploy_manifests(op)?;
            self.apply("deploy", manifests).await
        })
    }

    fn scale_workload<'a>(&'a self, namespace: &'a str, name: &'a str, replicas: u32) -> BoxFuture<'a, ClusterResult<()>> {
        Box::pin(async move {
            self.run(
                "scale",
                vec![
                    "scale".into(),
                    format!("deployment/{name}"),
                    format!("--replicas={replicas}"),
                    format!("--namespace={namespace}"),
                ],
                None,
            )
            .await
        })
    }
}

// ── Manifests ────────────────────────────────────────────────────

fn quota_manifest(namespace: &str, quota: &TenantQuota) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "ResourceQuota",
        "metadata": {
            "name": "tenant-quota",
            "namespace": namespace,
            "labels": { "app.kubernetes.io/managed-by": MANAGED_BY },
        },
        "spec": {
            "hard": {
                "requests.cpu": quota.cpu.to_string(),
                "requests.memory": quota.memory.to_string(),
                "pods": quota.pods.to_string(),
            }
        }
    })
}

/// Deployment plus ClusterIP service, as one `List`.
fn deploy_manifests(op: &ClusterOp) -> ClusterResult<Value> {
    let ClusterOp::Deploy {
        namespace,
        name,
        image,
        port,
        replicas,
        resources,
    } = op
    else {
        return Err(ClusterError::failed("deploy", format!("not a deploy op: {op}")));
    };
    if let ImageRef::Git { url } = image {
        return Err(ClusterError::failed(
            "deploy",
            format!("{url} is a git source; the cluster needs a built image"),
        ));
    }

    let labels = json!({ "app": name, "app.kubernetes.io/managed-by": MANAGED_BY });
    let deployment = json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": { "name": name, "namespace": namespace, "labels": labels },
        "spec": {
            "replicas": replicas,
            "selector": { "matchLabels": { "app": name } },
            "template": {
                "metadata": { "labels": labels },
                "spec": {
                    "containers": [{
                        "name": name,
                        "image": image.to_string(),
                        "ports": [{ "containerPort": port }],
                        "resources": {
                            "requests": {
                                "cpu": resources.cpu.to_string(),
                                "memory": resources.memory.to_string(),
                            }
                        }
                    }]
                }
            }
        }
    });
    let service = json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": { "name": format!("{name}-service"), "namespace": namespace, "labels": labels },
        "spec": {
            "type": "ClusterIP",
            "selector": { "app": name },
            "ports": [{ "protocol": "TCP", "port": 80, "targetPort": port }],
        }
    });
    Ok(json!({ "apiVersion": "v1", "kind": "List", "items": [deployment, service] }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubescale_core::{Plan, ResourceRequest};

    fn deploy_op(image: &str) -> ClusterOp {
        ClusterOp::Deploy {
            namespace: "tenant-acme".into(),
            name: "tenant-acme-web".into(),
            image: ImageRef::parse(image).unwrap(),
            port: 8080,
            replicas: 2,
            resources: ResourceRequest::default(),
        }
    }

    #[test]
    fn quota_manifest_uses_kubernetes_quantities() {
        let m = quota_manifest("tenant-acme", &TenantQuota::for_plan(Plan::Pro));
        assert_eq!(m["kind"], "ResourceQuota");
        assert_eq!(m["metadata"]["namespace"], "tenant-acme");
        assert_eq!(m["spec"]["hard"]["requests.cpu"], "4000m");
        assert_eq!(m["spec"]["hard"]["requests.memory"], "8Gi");
        assert_eq!(m["spec"]["hard"]["pods"], "50");
    }

    #[test]
    fn deploy_manifest_has_deployment_and_service() {
        let m = deploy_manifests(&deploy_op("nginx:alpine")).unwrap();
        let items = m["items"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        let dep = &items[0];
        assert_eq!(dep["spec"]["replicas"], 2);
        let container = &dep["spec"]["template"]["spec"]["containers"][0];
        assert_eq!(container["image"], "nginx:alpine");
        assert_eq!(container["ports"][0]["containerPort"], 8080);
        assert_eq!(container["resources"]["requests"]["memory"], "128Mi");
        assert_eq!(items[1]["metadata"]["name"], "tenant-acme-web-service");
        assert_eq!(items[1]["spec"]["ports"][0]["targetPort"], 8080);
    }

    #[test]
    fn git_sources_are_not_deployable() {
        let err = deploy_manifests(&deploy_op("https://github.com/acme/web.git")).unwrap_err();
        assert!(matches!(err, ClusterError::Failed { op: "deploy", .. }));
    }

    #[test]
    fn context_prefixes_arguments() {
        let d = KubectlDriver::new("kubectl", Some("kind-dev".into()));
        assert_eq!(d.base_args(), vec!["--context", "kind-dev"]);
        assert!(KubectlDriver::new("kubectl", None).base_args().is_empty());
    }

    #[tokio::test]
    async fn missing_binary_is_a_failure() {
        let d = KubectlDriver::new("/nonexistent/kubescale-kubectl", None);
        let err = d.scale_workload("ns", "web", 1).await.unwrap_err();
        assert!(matches!(err, ClusterError::Failed { op: "scale", .. }));
    }
}
