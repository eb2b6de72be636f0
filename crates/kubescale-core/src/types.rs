//! Vocabulary shared by the state model, the policy engine and the API.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ValidationError, ValidationResult};
use crate::quantity::{CpuMillis, MemoryBytes};

/// Unique identifier of a tenant (`tenant-<slug>`).
pub type TenantId = String;

/// Unique identifier of a workload (`<tenant_id>-<slug>`).
pub type WorkloadId = String;

/// Unique identifier of a pod (`pod-<n>`, never reused).
pub type PodId = String;

// ── Plans ────────────────────────────────────────────────────────

/// Subscription plan; selects the tenant's quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    Basic,
    Pro,
    Enterprise,
}

impl Plan {
    pub fn as_str(self) -> &'static str {
        match self {
            Plan::Basic => "basic",
            Plan::Pro => "pro",
            Plan::Enterprise => "enterprise",
        }
    }
}

impl FromStr for Plan {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(Plan::Basic),
            "pro" => Ok(Plan::Pro),
            "enterprise" => Ok(Plan::Enterprise),
            _ => Err(ValidationError::UnknownPlan(s.to_string())),
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Scaling policy ───────────────────────────────────────────────

/// How aggressively a workload trades cost for headroom.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScalingPolicy {
    /// Scale to zero under low traffic, otherwise exact capacity.
    CostFirst,
    /// Exact capacity with a floor of one replica while traffic is nonzero.
    #[default]
    Balanced,
    /// Exact capacity plus a fixed replica buffer.
    PerformanceFirst,
}

impl ScalingPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            ScalingPolicy::CostFirst => "cost-first",
            ScalingPolicy::Balanced => "balanced",
            ScalingPolicy::PerformanceFirst => "performance-first",
        }
    }
}

impl FromStr for ScalingPolicy {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "cost-first" | "cost" => Ok(ScalingPolicy::CostFirst),
            "balanced" => Ok(ScalingPolicy::Balanced),
            "performance-first" | "performance" => Ok(ScalingPolicy::PerformanceFirst),
            _ => Err(ValidationError::UnknownPolicy(s.to_string())),
        }
    }
}

impl fmt::Display for ScalingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Bounds and resources ─────────────────────────────────────────

/// Min/max replica count for a workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaBounds {
    pub min: u32,
    pub max: u32,
}

impl ReplicaBounds {
    pub fn new(min: u32, max: u32) -> ValidationResult<Self> {
        let bounds = Self { min, max };
        bounds.validate()?;
        Ok(bounds)
    }

    pub fn validate(&self) -> ValidationResult<()> {
        if self.min > self.max {
            return Err(ValidationError::InvalidBounds {
                min: self.min,
                max: self.max,
            });
        }
        if self.max == 0 {
            return Err(ValidationError::ZeroMaxReplicas);
        }
        Ok(())
    }

    /// Clamp into `[min, max]`.
    pub fn clamp(&self, n: u32) -> u32 {
        n.min(self.max).max(self.min)
    }
}

/// Resources requested by a single replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub cpu: CpuMillis,
    pub memory: MemoryBytes,
}

impl Default for ResourceRequest {
    fn default() -> Self {
        Self {
            cpu: CpuMillis(100),
            memory: MemoryBytes::from_mebibytes(128),
        }
    }
}

/// Per-tenant resource ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantQuota {
    pub cpu: CpuMillis,
    pub memory: MemoryBytes,
    pub pods: u32,
}

impl TenantQuota {
    /// Built-in quota for a plan.
    pub fn for_plan(plan: Plan) -> Self {
        match plan {
            Plan::Basic => Self {
                cpu: CpuMillis(2000),
                memory: MemoryBytes::from_gibibytes(4),
                pods: 10,
            },
            Plan::Pro => Self {
                cpu: CpuMillis(4000),
                memory: MemoryBytes::from_gibibytes(8),
                pods: 50,
            },
            Plan::Enterprise => Self {
                cpu: CpuMillis(16000),
                memory: MemoryBytes::from_gibibytes(32),
                pods: 200,
            },
        }
    }
}

/// Deploy-time configuration of a workload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    pub replicas: ReplicaBounds,
    #[serde(default)]
    pub resources: ResourceRequest,
    #[serde(default)]
    pub scaling_policy: ScalingPolicy,
}

fn default_port() -> u16 {
    80
}

impl WorkloadConfig {
    pub fn validate(&self) -> ValidationResult<()> {
        self.replicas.validate()
    }
}

// ── Names ────────────────────────────────────────────────────────

/// Lowercase, collapse every run of non-alphanumerics into one `-`,
/// and trim leading/trailing dashes.
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}

/// Validate a human-supplied name and return its slug.
///
/// The slug becomes part of a namespace identifier, so it must fit in a
/// DNS label once prefixed.
pub fn validate_name(kind: &'static str, name: &str) -> ValidationResult<String> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName(kind));
    }
    let slug = slugify(name);
    if slug.is_empty() || slug.len() > 48 {
        return Err(ValidationError::InvalidName {
            kind,
            name: name.to_string(),
        });
    }
    Ok(slug)
}
