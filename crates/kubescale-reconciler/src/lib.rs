//! kubescale-reconciler — the control loop.
//!
//! `Reconciler::tick` drives every workload one step toward its target:
//!
//! ```text
//! for each workload (oldest first):
//!   1. estimate  = TrafficSource::estimate
//!   2. desired   = policy::target(estimate, policy, bounds)
//! for each tenant:
//!   3. target    = allocate_targets(quota.pods, floors + desired)     // tick-start counts
//!      creations = distribute(quota.pods - tenant_active, wants)
//! for each workload:
//!   4. diff      = target - active                                    // TERMINATING excluded
//!   5. diff > 0: spawn min(diff, churn) PENDING pods
//!   6. diff < 0: terminate min(-diff, churn) pods, RUNNING oldest first, then PENDING
//! 7. advance every pod one lifecycle step, drop finished pods and FAILED pods past retention
//! 8. record metrics/status/history, emit SyncIntents for the cluster link
//! ```
//!
//! The tick is synchronous and runs under the state write lock, so readers
//! only ever see whole ticks. `Platform` releases the lock before
//! dispatching the tick's intents to the `ClusterLink`.

pub mod platform;
pub mod reconciler;

pub use platform::{Health, Platform};
pub use reconciler::{Decision, Reconciler, SyncIntent, TickReport};
