//! kubescale-state — the owned, in-memory state of the control plane.
//!
//! Holds tenants, workloads, pods and traffic signals in a single
//! `ClusterState` container. There is no process-wide singleton: whoever
//! owns a `ClusterState` owns a whole independent simulation, which is
//! what lets tests run many of them side by side.
//!
//! # Architecture
//!
//! ```text
//! ClusterState
//!   ├── tenants    (quota + deploy-time reservations)
//!   ├── workloads  (bounds, policy, status, last decision)
//!   ├── pods       (insertion-ordered, ids never reused)
//!   ├── signals    (latest TrafficSample per workload)
//!   └── history    (bounded TrafficPoint ring, display only)
//!
//! quota      check_and_reserve() at deploy, allocate_targets() per tick
//! lifecycle  PENDING → RUNNING → TERMINATING → removed, FAILED terminal
//! ```
//!
//! Readers never touch the container directly; they get a `Snapshot`.

pub mod error;
pub mod lifecycle;
pub mod quota;
pub mod store;
pub mod types;

pub use error::{PlatformError, PlatformResult};
pub use lifecycle::{PodLifecycle, PodStep};
pub use store::{ClusterState, Snapshot};
pub use types::*;
