//! Boundary validation errors.

use thiserror::Error;

pub type ValidationResult<T> = Result<T, ValidationError>;

/// Malformed input rejected before it can reach reconciliation state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{0} name must not be empty")]
    EmptyName(&'static str),

    #[error("invalid {kind} name: {name:?}")]
    InvalidName { kind: &'static str, name: String },

    #[error("{kind} already exists: {id}")]
    Duplicate { kind: &'static str, id: String },

    #[error("invalid image reference: {0:?}")]
    InvalidImage(String),

    #[error("invalid replica bounds: min {min} > max {max}")]
    InvalidBounds { min: u32, max: u32 },

    #[error("replica bounds must allow at least one replica")]
    ZeroMaxReplicas,

    #[error("invalid resource quantity: {0:?}")]
    InvalidQuantity(String),

    #[error("invalid duration: {0:?}")]
    InvalidDuration(String),

    #[error("unknown plan: {0:?}")]
    UnknownPlan(String),

    #[error("unknown scaling policy: {0:?}")]
    UnknownPolicy(String),

    #[error("invalid prediction: {0}")]
    InvalidPrediction(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
