//! kubescale-core — shared vocabulary for the KubeScale control plane.
//!
//! Holds the types every other crate agrees on (plans, scaling policies,
//! replica bounds, resource quantities), boundary validation for names and
//! image references, and the `kubescale.toml` configuration model.

pub mod config;
pub mod error;
pub mod image;
pub mod quantity;
pub mod types;

pub use config::ScaleConfig;
pub use error::{ValidationError, ValidationResult};
pub use image::ImageRef;
pub use quantity::{CpuMillis, HumanDuration, MemoryBytes};
pub use types::*;
