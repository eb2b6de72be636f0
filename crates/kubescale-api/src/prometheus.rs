//! Prometheus text exposition format.
//!
//! Renders a state snapshot as per-workload gauges labelled with the
//! workload and its tenant.

use std::fmt::Write;

use kubescale_state::{Snapshot, Workload};

/// Render a snapshot into Prometheus text format.
pub fn render_prometheus(snapshot: &Snapshot) -> String {
    let mut out = String::new();

    out.push_str("# HELP kubescale_tick Completed reconciliation ticks.\n");
    out.push_str("# TYPE kubescale_tick counter\n");
    let _ = writeln!(out, "kubescale_tick {}", snapshot.tick);

    gauge(
        &mut out,
        snapshot,
        "kubescale_predicted_traffic",
        "Estimated concurrent users used for the last decision.",
        |_, w| format!("{:.2}", w.metrics.estimated_users),
    );
    gauge(
        &mut out,
        snapshot,
        "kubescale_target_replicas",
        "Replica target after policy and tenant quota.",
        |_, w| w.metrics.target.to_string(),
    );
    gauge(
        &mut out,
        snapshot,
        "kubescale_active_pods",
        "Pending plus running pods.",
        |s, w| s.active_pods(&w.id).to_string(),
    );
    gauge(
        &mut out,
        snapshot,
        "kubescale_hourly_cost",
        "Estimated hourly cost of active pods in USD.",
        |s, w| format!("{:.3}", s.hourly_cost(&w.id)),
    );

    out
}

fn gauge(
    out: &mut String,
    snapshot: &Snapshot,
    name: &str,
    help: &str,
    value: impl Fn(&Snapshot, &Workload) -> String,
) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} gauge");
    for w in &snapshot.workloads {
        let _ = writeln!(
            out,
            "{name}{{workload=\"{}\",tenant=\"{}\"}} {}",
            w.id,
            w.tenant_id,
            value(snapshot, w)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubescale_core::{
        ImageRef, ReplicaBounds, ResourceRequest, ScalingPolicy, WorkloadConfig,
    };
    use kubescale_state::{
        Pod, PodPhase, SyncStatus, WorkloadMetrics, WorkloadStatus,
    };

    fn test_workload(id: &str, users: f64, target: u32) -> Workload {
        Workload {
            id: id.to_string(),
            tenant_id: "tenant-acme".to_string(),
            name: id.to_string(),
            namespace: "tenant-acme".to_string(),
            image: ImageRef::parse("nginx").unwrap(),
            config: WorkloadConfig {
                port: 80,
                replicas: ReplicaBounds { min: 0, max: 5 },
                resources: ResourceRequest::default(),
                scaling_policy: ScalingPolicy::Balanced,
            },
            status: WorkloadStatus::Running,
            metrics: WorkloadMetrics {
                estimated_users: users,
                target,
                ..WorkloadMetrics::default()
            },
            sync: SyncStatus::Mirrored,
            mirrored_replicas: Some(target),
            created_at: 1000,
            seq: 0,
        }
    }

    fn test_pod(n: u64, workload_id: &str, phase: PodPhase) -> Pod {
        Pod {
            id: format!("pod-{n}"),
            name: format!("{workload_id}-{n}"),
            workload_id: workload_id.to_string(),
            phase,
            cpu: 20.0,
            memory_mb: 128.0,
            created_at: 1000,
            seq: n,
            terminating_ticks: 0,
        }
    }

    #[test]
    fn render_empty() {
        let output = render_prometheus(&Snapshot::default());
        assert!(output.contains("# HELP kubescale_predicted_traffic"));
        assert!(output.contains("# TYPE kubescale_active_pods gauge"));
        assert!(output.contains("kubescale_tick 0"));
        assert!(!output.contains("workload=\""));
    }

    #[test]
    fn render_single() {
        let snapshot = Snapshot {
            tick: 7,
            workloads: vec![test_workload("tenant-acme-web", 250.0, 3)],
            pods: vec![
                test_pod(1, "tenant-acme-web", PodPhase::Running),
                test_pod(2, "tenant-acme-web", PodPhase::Pending),
                test_pod(3, "tenant-acme-web", PodPhase::Terminating),
            ],
            ..Snapshot::default()
        };
        let output = render_prometheus(&snapshot);
        let labels = "{workload=\"tenant-acme-web\",tenant=\"tenant-acme\"}";
        assert!(output.contains("kubescale_tick 7"));
        assert!(output.contains(&format!("kubescale_predicted_traffic{labels} 250.00")));
        assert!(output.contains(&format!("kubescale_target_replicas{labels} 3")));
        // Terminating pods are not active.
        assert!(output.contains(&format!("kubescale_active_pods{labels} 2")));
        assert!(output.contains(&format!("kubescale_hourly_cost{labels} 0.192")));
    }

    #[test]
    fn render_multiple() {
        let snapshot = Snapshot {
            workloads: vec![
                test_workload("tenant-acme-web", 100.0, 1),
                test_workload("tenant-acme-api", 0.0, 0),
            ],
            ..Snapshot::default()
        };
        let output = render_prometheus(&snapshot);
        assert!(output.contains("workload=\"tenant-acme-web\""));
        assert!(output.contains("workload=\"tenant-acme-api\""));
        assert_eq!(output.matches("kubescale_active_pods{").count(), 2);
    }
}
