//! kubescale-cluster — best-effort mirroring to a real orchestration backend.
//!
//! The reconciler never talks to a backend directly. It emits `ClusterOp`s
//! and hands them to a `ClusterLink`, which owns the driver, bounds every
//! call with a timeout and tracks whether the backend is reachable.
//!
//! # Architecture
//!
//! ```text
//! Reconciler ──ClusterOp──▶ ClusterLink ──▶ dyn ClusterDriver
//!                              │              ├── SimulatedDriver (no-op)
//!                              │              └── KubectlDriver   (kubectl apply / scale)
//!                              ▼
//!                           LinkState
//!   Unconfigured   simulated driver, never changes
//!   Available      last call succeeded
//!   Degraded       last call failed; calls skipped until retry_at,
//!                  backoff doubles up to backoff_max
//! ```

pub mod driver;
pub mod error;
pub mod kubectl;
pub mod link;

pub use driver::{BoxFuture, ClusterDriver, ClusterOp, SimulatedDriver};
pub use error::{ClusterError, ClusterResult};
pub use kubectl::KubectlDriver;
pub use link::{ClusterLink, LinkMode, LinkState};
