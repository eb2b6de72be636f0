//! kubescale.toml configuration parser.
//!
//! Every field has a default, so an empty file (or no file at all) yields
//! the reference behaviour: 2s ticks, churn cap 2, 100 users per pod.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::quantity::{CpuMillis, HumanDuration, MemoryBytes};
use crate::types::{Plan, TenantQuota};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleConfig {
    pub reconcile: ReconcileConfig,
    pub policy: PolicyConfig,
    pub lifecycle: LifecycleConfig,
    pub traffic: TrafficConfig,
    pub cluster: ClusterConfig,
    /// Quota overrides keyed by plan name (`basic`, `pro`, `enterprise`).
    pub plans: BTreeMap<String, PlanQuotaConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub tick_interval: HumanDuration,
    pub prediction_interval: HumanDuration,
    pub max_churn_per_tick: u32,
    /// Seed for the reconciler's RNG. Absent means OS entropy.
    pub seed: Option<u64>,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            tick_interval: HumanDuration::from_secs(2),
            prediction_interval: HumanDuration::from_secs(10),
            max_churn_per_tick: 2,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub users_per_pod: u32,
    pub performance_buffer: u32,
    pub low_traffic_threshold: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            users_per_pod: 100,
            performance_buffer: 2,
            low_traffic_threshold: 10.0,
        }
    }
}

/// How `TERMINATING` pods leave the system.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationMode {
    /// Removed after a fixed number of ticks.
    #[default]
    Grace,
    /// Removed with `removal_probability` per tick.
    Stochastic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub pending_stay_probability: f64,
    pub provision_failure_probability: f64,
    pub termination: TerminationMode,
    pub termination_grace_ticks: u32,
    pub removal_probability: f64,
    pub cpu_range: [f64; 2],
    pub cpu_step: f64,
    pub memory_range_mb: [f64; 2],
    pub memory_step_mb: f64,
    pub initial_memory_mb: f64,
    /// FAILED pods kept per workload for display; older ones are dropped.
    pub failed_retention: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            pending_stay_probability: 0.4,
            provision_failure_probability: 0.0,
            termination: TerminationMode::Grace,
            termination_grace_ticks: 1,
            removal_probability: 0.6,
            cpu_range: [5.0, 95.0],
            cpu_step: 4.0,
            memory_range_mb: [64.0, 512.0],
            memory_step_mb: 8.0,
            initial_memory_mb: 128.0,
            failed_retention: 5,
        }
    }
}

/// Where a workload's demand estimate comes from when nothing has been
/// submitted for it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficMode {
    /// Jitter from `initial_estimate`.
    #[default]
    Simulated,
    /// Zero demand until a prediction arrives.
    External,
}

/// Built-in prediction source driven by the daemon.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    #[default]
    None,
    Diurnal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficConfig {
    pub mode: TrafficMode,
    pub initial_estimate: f64,
    pub volatility: f64,
    pub floor: f64,
    /// Age after which an external signal is considered lost. `0s` disables.
    pub signal_timeout: HumanDuration,
    pub feed: FeedKind,
    pub history_len: usize,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            mode: TrafficMode::Simulated,
            initial_estimate: 150.0,
            volatility: 0.05,
            floor: 0.0,
            signal_timeout: HumanDuration::from_secs(30),
            feed: FeedKind::None,
            history_len: 40,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    #[default]
    Simulated,
    Kubectl,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub driver: DriverKind,
    pub call_timeout: HumanDuration,
    pub backoff_initial: HumanDuration,
    pub backoff_max: HumanDuration,
    pub kubectl_path: String,
    pub context: Option<String>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            driver: DriverKind::Simulated,
            call_timeout: HumanDuration::from_secs(1),
            backoff_initial: HumanDuration::from_secs(2),
            backoff_max: HumanDuration::from_secs(60),
            kubectl_path: "kubectl".to_string(),
            context: None,
        }
    }
}

/// Partial quota override for one plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanQuotaConfig {
    pub cpu: Option<CpuMillis>,
    pub memory: Option<MemoryBytes>,
    pub pods: Option<u32>,
}

impl ScaleConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        Ok(config)
    }

    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        let config: ScaleConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Effective quota for a plan: built-in values with overrides applied.
    pub fn quota_for(&self, plan: Plan) -> TenantQuota {
        let mut quota = TenantQuota::for_plan(plan);
        if let Some(o) = self.plans.get(plan.as_str()) {
            if let Some(cpu) = o.cpu {
                quota.cpu = cpu;
            }
            if let Some(memory) = o.memory {
                quota.memory = memory;
            }
            if let Some(pods) = o.pods {
                quota.pods = pods;
            }
        }
        quota
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let bad = |msg: String| Err(ValidationError::InvalidConfig(msg));

        if self.reconcile.tick_interval.is_zero() {
            return bad("reconcile.tick_interval must be nonzero".into());
        }
        if self.reconcile.max_churn_per_tick == 0 {
            return bad("reconcile.max_churn_per_tick must be at least 1".into());
        }
        if self.policy.users_per_pod == 0 {
            return bad("policy.users_per_pod must be at least 1".into());
        }
        if !self.policy.low_traffic_threshold.is_finite() || self.policy.low_traffic_threshold < 0.0 {
            return bad("policy.low_traffic_threshold must be a nonnegative number".into());
        }

        let lc = &self.lifecycle;
        for (name, p) in [
            ("lifecycle.pending_stay_probability", lc.pending_stay_probability),
            ("lifecycle.provision_failure_probability", lc.provision_failure_probability),
            ("lifecycle.removal_probability", lc.removal_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return bad(format!("{name} must be within [0, 1], got {p}"));
            }
        }
        // One roll per pending pod: [0, stay) stays, [stay, stay + fail) fails.
        if lc.pending_stay_probability + lc.provision_failure_probability > 1.0 + f64::EPSILON {
            return bad(
                "lifecycle.pending_stay_probability + provision_failure_probability must not exceed 1"
                    .into(),
            );
        }
        for (name, [lo, hi]) in [
            ("lifecycle.cpu_range", lc.cpu_range),
            ("lifecycle.memory_range_mb", lc.memory_range_mb),
        ] {
            if !(lo.is_finite() && hi.is_finite()) || lo > hi || lo < 0.0 {
                return bad(format!("{name} must be an ordered nonnegative range"));
            }
        }
        if lc.failed_retention == 0 {
            return bad("lifecycle.failed_retention must be at least 1".into());
        }
        if lc.cpu_step < 0.0 || lc.memory_step_mb < 0.0 {
            return bad("lifecycle step sizes must be nonnegative".into());
        }
        if lc.termination == TerminationMode::Stochastic && lc.removal_probability == 0.0 {
            return bad("stochastic termination needs a nonzero removal_probability".into());
        }

        let t = &self.traffic;
        if !(0.0..=1.0).contains(&t.volatility) {
            return bad(format!("traffic.volatility must be within [0, 1], got {}", t.volatility));
        }
        if !t.floor.is_finite() || t.floor < 0.0 || !t.initial_estimate.is_finite() || t.initial_estimate < 0.0 {
            return bad("traffic.floor and traffic.initial_estimate must be nonnegative".into());
        }

        for name in self.plans.keys() {
            name.parse::<Plan>()?;
        }

        let c = &self.cluster;
        if c.call_timeout.is_zero() {
            return bad("cluster.call_timeout must be nonzero".into());
        }
        if c.call_timeout.as_duration() >= self.reconcile.tick_interval.as_duration() {
            return bad("cluster.call_timeout must be shorter than the tick interval".into());
        }
        if c.backoff_initial > c.backoff_max {
            return bad("cluster.backoff_initial must not exceed backoff_max".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_yields_defaults() {
        let config = ScaleConfig::from_toml("").unwrap();
        assert_eq!(config, ScaleConfig::default());
        assert_eq!(config.reconcile.max_churn_per_tick, 2);
        assert_eq!(config.policy.users_per_pod, 100);
        assert_eq!(config.lifecycle.cpu_range, [5.0, 95.0]);
    }

    #[test]
    fn parse_sections() {
        let config = ScaleConfig::from_toml(
            r#"
[reconcile]
tick_interval = "1s"
seed = 42

[policy]
users_per_pod = 50

[lifecycle]
termination = "stochastic"

[traffic]
mode = "external"
feed = "diurnal"

[cluster]
driver = "kubectl"
call_timeout = "500ms"

[plans.basic]
pods = 4
"#,
        )
        .unwrap();
        assert_eq!(config.reconcile.seed, Some(42));
        assert_eq!(config.policy.users_per_pod, 50);
        assert_eq!(config.lifecycle.termination, TerminationMode::Stochastic);
        assert_eq!(config.traffic.mode, TrafficMode::External);
        assert_eq!(config.traffic.feed, FeedKind::Diurnal);
        assert_eq!(config.cluster.driver, DriverKind::Kubectl);
        assert_eq!(config.quota_for(Plan::Basic).pods, 4);
        assert_eq!(config.quota_for(Plan::Basic).cpu, CpuMillis(2000));
    }

    #[test]
    fn rejects_out_of_range_probability() {
        let err = ScaleConfig::from_toml("[lifecycle]\npending_stay_probability = 1.5\n").unwrap_err();
        assert!(err.to_string().contains("pending_stay_probability"));
    }

    #[test]
    fn stay_and_failure_share_one_roll() {
        let ok = ScaleConfig::from_toml(
            "[lifecycle]\npending_stay_probability = 0.4\nprovision_failure_probability = 0.5\n",
        );
        assert!(ok.is_ok());

        let err = ScaleConfig::from_toml(
            "[lifecycle]\npending_stay_probability = 0.9\nprovision_failure_probability = 0.5\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("must not exceed 1"));

        let edge = ScaleConfig::from_toml(
            "[lifecycle]\npending_stay_probability = 0.0\nprovision_failure_probability = 1.0\n",
        );
        assert!(edge.is_ok());
    }

    #[test]
    fn rejects_zero_failed_retention() {
        assert_eq!(ScaleConfig::default().lifecycle.failed_retention, 5);
        assert!(ScaleConfig::from_toml("[lifecycle]\nfailed_retention = 0\n").is_err());
    }

    #[test]
    fn rejects_unknown_plan_override() {
        assert!(ScaleConfig::from_toml("[plans.platinum]\npods = 1\n").is_err());
    }

    #[test]
    fn rejects_zero_churn_cap() {
        assert!(ScaleConfig::from_toml("[reconcile]\nmax_churn_per_tick = 0\n").is_err());
    }

    #[test]
    fn rejects_timeout_longer_than_tick() {
        let toml = "[reconcile]\ntick_interval = \"2s\"\n[cluster]\ncall_timeout = \"5s\"\n";
        assert!(ScaleConfig::from_toml(toml).is_err());
    }

    #[test]
    fn from_file_reads_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[policy]\nperformance_buffer = 3").unwrap();
        let config = ScaleConfig::from_file(file.path()).unwrap();
        assert_eq!(config.policy.performance_buffer, 3);
    }

    #[test]
    fn toml_round_trip_keeps_values() {
        let mut config = ScaleConfig::default();
        config.reconcile.seed = Some(7);
        let s = config.to_toml_string().unwrap();
        assert!(s.contains("tick_interval = \"2s\""));
        assert_eq!(ScaleConfig::from_toml(&s).unwrap(), config);
    }
}
