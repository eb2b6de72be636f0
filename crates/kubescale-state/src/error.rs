//! Error taxonomy of the control plane.

use kubescale_core::ValidationError;
use thiserror::Error;

/// Result type alias for platform operations.
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Errors surfaced by boundary operations and recovered inside the loop.
///
/// `Validation`, the `*NotFound` variants and deploy-time `QuotaExceeded`
/// go back to the caller. `ClusterUnavailable` never leaves the loop.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlatformError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("tenant not found: {0}")]
    TenantNotFound(String),

    #[error("workload not found: {0}")]
    WorkloadNotFound(String),

    #[error("quota exceeded for tenant {tenant}: {resource} would reach {requested}, limit {limit}")]
    QuotaExceeded {
        tenant: String,
        resource: &'static str,
        requested: u64,
        limit: u64,
    },

    #[error("cluster unavailable: {0}")]
    ClusterUnavailable(String),
}

impl PlatformError {
    /// Whether this error is the caller's fault (as opposed to the backend's).
    pub fn is_client_error(&self) -> bool {
        !matches!(self, PlatformError::ClusterUnavailable(_))
    }
}
