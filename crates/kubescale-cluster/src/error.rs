use std::time::Duration;

use thiserror::Error;

pub type ClusterResult<T> = Result<T, ClusterError>;

/// Why a backend call did not succeed. All variants are recoverable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClusterError {
    #[error("{op} failed: {reason}")]
    Failed { op: &'static str, reason: String },

    #[error("{op} timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },

    #[error("{op} skipped: backend degraded, next retry in {retry_in:?}")]
    BackingOff { op: &'static str, retry_in: Duration },
}

impl ClusterError {
    pub fn failed(op: &'static str, reason: impl Into<String>) -> Self {
        ClusterError::Failed {
            op,
            reason: reason.into(),
        }
    }

    /// Whether the backend was actually contacted.
    pub fn reached_backend(&self) -> bool {
        !matches!(self, ClusterError::BackingOff { .. })
    }
}
