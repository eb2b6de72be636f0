//! kubescale-autoscale — traffic-driven replica targets.
//!
//! Turns a demand estimate into a replica count. The policy engine is a
//! pure function; the only randomness lives in the traffic source and
//! is drawn from an RNG supplied by the caller.
//!
//! # Scaling Algorithm
//!
//! ```text
//! raw = ceil(estimate / users_per_pod)
//!
//! performance-first:  raw += buffer
//! cost-first:         if estimate < low_traffic_threshold: return 0   // scale-to-zero
//! balanced:           if estimate > 0: raw = max(raw, 1)
//!
//! target = clamp(raw, min, max)
//! ```
//!
//! Scale-to-zero is the only path that may return less than `min`.
//!
//! # Traffic Signals
//!
//! ```text
//! Unfed ──prediction──▶ External ──no prediction for signal_timeout──▶ Lost
//!   │                      ▲                                           │
//!   │ (simulated mode:     └──────────────prediction───────────────────┘
//!   │  jitter from initial_estimate)
//! ```

pub mod feed;
pub mod policy;
pub mod traffic;

pub use feed::{DiurnalFeed, Prediction, PredictionFeed};
pub use policy::{ScalingParams, floor_for, target};
pub use traffic::TrafficSource;
