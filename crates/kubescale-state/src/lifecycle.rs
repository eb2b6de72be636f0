//! Pod lifecycle state machine.
//!
//! ```text
//! PENDING ──promote──▶ RUNNING ──┐
//!    │                            ├──begin_termination──▶ TERMINATING ──▶ removed
//!    ├────────begin_termination───┘
//!    └──provision error──▶ FAILED (terminal)
//! ```
//!
//! Every probabilistic step draws from the `Rng` passed in by the caller,
//! so a seeded RNG reproduces a run exactly. No pod leaves the system
//! without passing through `TERMINATING`.

use rand::Rng;
use tracing::debug;

use kubescale_core::config::{LifecycleConfig, TerminationMode};

use crate::types::{Pod, PodPhase};

/// What one lifecycle step did to a pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodStep {
    /// Still pending, or an already terminal `FAILED` pod.
    Unchanged,
    /// `PENDING → RUNNING`.
    Promoted,
    /// `PENDING → FAILED`.
    Failed,
    /// Running pod had its utilization sampled.
    Sampled,
    /// Still terminating.
    Draining,
    /// Terminating pod is done and must be dropped by the caller.
    Remove,
}

/// Applies lifecycle transitions with the configured probabilities.
#[derive(Debug, Clone)]
pub struct PodLifecycle {
    config: LifecycleConfig,
}

impl PodLifecycle {
    pub fn new(config: LifecycleConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// A freshly provisioned pod in `PENDING`.
    pub fn new_pod(&self, id: String, name: String, workload_id: &str, now: u64, seq: u64) -> Pod {
        Pod {
            id,
            name,
            workload_id: workload_id.to_string(),
            phase: PodPhase::Pending,
            cpu: 0.0,
            memory_mb: self.config.initial_memory_mb,
            created_at: now,
            seq,
            terminating_ticks: 0,
        }
    }

    /// Move a pending or running pod to `TERMINATING`.
    ///
    /// Returns false for pods that are already terminating or failed.
    pub fn begin_termination(&self, pod: &mut Pod) -> bool {
        match pod.phase {
            PodPhase::Pending | PodPhase::Running => {
                debug!(pod = %pod.id, from = ?pod.phase, "pod terminating");
                pod.phase = PodPhase::Terminating;
                pod.terminating_ticks = 0;
                true
            }
            PodPhase::Terminating | PodPhase::Failed => false,
        }
    }

    /// Advance a pod by one reconciliation tick.
    pub fn advance<R: Rng + ?Sized>(&self, pod: &mut Pod, rng: &mut R) -> PodStep {
        let c = &self.config;
        match pod.phase {
            PodPhase::Pending => {
                let roll: f64 = rng.r#gen();
                if roll < c.pending_stay_probability {
                    PodStep::Unchanged
                } else if roll < c.pending_stay_probability + c.provision_failure_probability {
                    debug!(pod = %pod.id, "pod failed to provision");
                    pod.phase = PodPhase::Failed;
                    pod.cpu = 0.0;
                    PodStep::Failed
                } else {
                    debug!(pod = %pod.id, "pod running");
                    pod.phase = PodPhase::Running;
                    pod.cpu = pod.cpu.clamp(c.cpu_range[0], c.cpu_range[1]);
                    pod.memory_mb = pod.memory_mb.clamp(c.memory_range_mb[0], c.memory_range_mb[1]);
                    PodStep::Promoted
                }
            }
            PodPhase::Running => {
                pod.cpu = walk(rng, pod.cpu, c.cpu_step, c.cpu_range);
                pod.memory_mb = walk(rng, pod.memory_mb, c.memory_step_mb, c.memory_range_mb);
                PodStep::Sampled
            }
            PodPhase::Terminating => {
                pod.terminating_ticks = pod.terminating_ticks.saturating_add(1);
                let done = match c.termination {
                    TerminationMode::Grace => pod.terminating_ticks > c.termination_grace_ticks,
                    TerminationMode::Stochastic => rng.r#gen::<f64>() < c.removal_probability,
                };
                if done {
                    debug!(pod = %pod.id, ticks = pod.terminating_ticks, "pod removed");
                    PodStep::Remove
                } else {
                    PodStep::Draining
                }
            }
            PodPhase::Failed => PodStep::Unchanged,
        }
    }
}

/// One bounded random-walk step: `value ± uniform(step)`, clamped to `range`.
fn walk<R: Rng + ?Sized>(rng: &mut R, value: f64, step: f64, range: [f64; 2]) -> f64 {
    let delta = if step > 0.0 { rng.gen_range(-step..=step) } else { 0.0 };
    (value + delta).clamp(range[0], range[1])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn lifecycle() -> PodLifecycle {
        PodLifecycle::new(LifecycleConfig::default())
    }

    fn pending_pod(lc: &PodLifecycle) -> Pod {
        lc.new_pod("pod-1".into(), "web-1".into(), "tenant-acme-web", 1000, 1)
    }

    #[test]
    fn new_pod_starts_pending() {
        let lc = lifecycle();
        let pod = pending_pod(&lc);
        assert_eq!(pod.phase, PodPhase::Pending);
        assert!(pod.is_active());
        assert_eq!(pod.memory_mb, 128.0);
    }

    #[test]
    fn certain_promotion_runs_pod() {
        let lc = PodLifecycle::new(LifecycleConfig {
            pending_stay_probability: 0.0,
            ..LifecycleConfig::default()
        });
        let mut rng = StdRng::seed_from_u64(1);
        let mut pod = pending_pod(&lc);
        assert_eq!(lc.advance(&mut pod, &mut rng), PodStep::Promoted);
        assert_eq!(pod.phase, PodPhase::Running);
        assert_eq!(pod.cpu, 5.0);
    }

    #[test]
    fn certain_stay_keeps_pod_pending() {
        let lc = PodLifecycle::new(LifecycleConfig {
            pending_stay_probability: 1.0,
            ..LifecycleConfig::default()
        });
        let mut rng = StdRng::seed_from_u64(1);
        let mut pod = pending_pod(&lc);
        for _ in 0..20 {
            assert_eq!(lc.advance(&mut pod, &mut rng), PodStep::Unchanged);
        }
        assert_eq!(pod.phase, PodPhase::Pending);
    }

    #[test]
    fn provisioning_failure_is_terminal() {
        let lc = PodLifecycle::new(LifecycleConfig {
            pending_stay_probability: 0.0,
            provision_failure_probability: 1.0,
            ..LifecycleConfig::default()
        });
        let mut rng = StdRng::seed_from_u64(3);
        let mut pod = pending_pod(&lc);
        assert_eq!(lc.advance(&mut pod, &mut rng), PodStep::Failed);
        assert!(!pod.is_active());
        assert_eq!(lc.advance(&mut pod, &mut rng), PodStep::Unchanged);
        assert!(!lc.begin_termination(&mut pod));
        assert_eq!(pod.phase, PodPhase::Failed);
    }

    #[test]
    fn running_utilization_stays_in_range() {
        let lc = PodLifecycle::new(LifecycleConfig {
            cpu_step: 25.0,
            memory_step_mb: 100.0,
            ..LifecycleConfig::default()
        });
        let mut rng = StdRng::seed_from_u64(99);
        let mut pod = pending_pod(&lc);
        pod.phase = PodPhase::Running;
        for _ in 0..500 {
            assert_eq!(lc.advance(&mut pod, &mut rng), PodStep::Sampled);
            assert!((5.0..=95.0).contains(&pod.cpu), "cpu {}", pod.cpu);
            assert!((64.0..=512.0).contains(&pod.memory_mb), "mem {}", pod.memory_mb);
        }
    }

    #[test]
    fn grace_period_removal_is_deterministic() {
        let lc = PodLifecycle::new(LifecycleConfig {
            termination_grace_ticks: 2,
            ..LifecycleConfig::default()
        });
        let mut rng = StdRng::seed_from_u64(5);
        let mut pod = pending_pod(&lc);
        pod.phase = PodPhase::Running;

        assert!(lc.begin_termination(&mut pod));
        assert!(!lc.begin_termination(&mut pod));
        assert_eq!(lc.advance(&mut pod, &mut rng), PodStep::Draining);
        assert_eq!(lc.advance(&mut pod, &mut rng), PodStep::Draining);
        assert_eq!(lc.advance(&mut pod, &mut rng), PodStep::Remove);
    }

    #[test]
    fn stochastic_removal_eventually_removes() {
        let lc = PodLifecycle::new(LifecycleConfig {
            termination: TerminationMode::Stochastic,
            ..LifecycleConfig::default()
        });
        let mut rng = StdRng::seed_from_u64(11);
        let mut pod = pending_pod(&lc);
        lc.begin_termination(&mut pod);

        let mut steps = 0;
        while lc.advance(&mut pod, &mut rng) != PodStep::Remove {
            steps += 1;
            assert!(steps < 100, "pod never removed");
        }
        assert_eq!(pod.phase, PodPhase::Terminating);
    }

    #[test]
    fn same_seed_same_sequence() {
        let lc = lifecycle();
        let run = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut pod = pending_pod(&lc);
            let mut trace = Vec::new();
            for _ in 0..30 {
                lc.advance(&mut pod, &mut rng);
                trace.push((pod.phase, pod.cpu.to_bits(), pod.memory_mb.to_bits()));
            }
            trace
        };
        assert_eq!(run(42), run(42));
    }
}
