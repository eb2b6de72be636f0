//! Prediction feeds.
//!
//! A feed produces external predictions on its own schedule, the way an
//! outside forecasting service would. The daemon polls it every
//! `prediction_interval` and submits what it returns.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use kubescale_state::Workload;

const MS_PER_HOUR: f64 = 3_600_000.0;

/// An estimate produced by a feed.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub estimated_users: f64,
    pub confidence: f64,
    pub explanation: String,
}

/// A source of external traffic predictions.
pub trait PredictionFeed: Send {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Predict demand for one workload at `now` (unix ms). `None` skips it.
    fn predict(&mut self, workload: &Workload, now: u64) -> Option<Prediction>;
}

/// Daily sine curve with noise.
///
/// `users = max(0, base + sin(hour / 24 · 2π) · amplitude + uniform[0, jitter))`
/// where `hour` is the fractional UTC hour of `now`.
pub struct DiurnalFeed {
    base: f64,
    amplitude: f64,
    jitter: f64,
    confidence: f64,
    rng: StdRng,
}

impl DiurnalFeed {
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            base: 100.0,
            amplitude: 500.0,
            jitter: 50.0,
            confidence: 0.89,
            rng: match seed {
                Some(s) => StdRng::seed_from_u64(s),
                None => StdRng::from_entropy(),
            },
        }
    }

    pub fn with_curve(mut self, base: f64, amplitude: f64, jitter: f64) -> Self {
        self.base = base;
        self.amplitude = amplitude;
        self.jitter = jitter;
        self
    }

    fn hour_of_day(now: u64) -> f64 {
        (now as f64 / MS_PER_HOUR) % 24.0
    }
}

impl PredictionFeed for DiurnalFeed {
    fn name(&self) -> &str {
        "diurnal"
    }

    fn predict(&mut self, _workload: &Workload, now: u64) -> Option<Prediction> {
        let hour = Self::hour_of_day(now);
        let wave = (hour / 24.0 * std::f64::consts::TAU).sin() * self.amplitude;
        let noise = if self.jitter > 0.0 {
            self.rng.gen_range(0.0..self.jitter)
        } else {
            0.0
        };
        let estimated_users = (self.base + wave + noise).max(0.0);
        Some(Prediction {
            estimated_users,
            confidence: self.confidence,
            explanation: format!("diurnal curve at {hour:.2}h UTC"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubescale_core::{ImageRef, ReplicaBounds, ResourceRequest, ScalingPolicy, WorkloadConfig};
    use kubescale_state::{SyncStatus, WorkloadMetrics, WorkloadStatus};

    fn workload() -> Workload {
        Workload {
            id: "tenant-acme-web".into(),
            tenant_id: "tenant-acme".into(),
            name: "web".into(),
            namespace: "tenant-acme".into(),
            image: ImageRef::parse("nginx:alpine").unwrap(),
            config: WorkloadConfig {
                port: 80,
                replicas: ReplicaBounds { min: 1, max: 5 },
                resources: ResourceRequest::default(),
                scaling_policy: ScalingPolicy::Balanced,
            },
            status: WorkloadStatus::Pending,
            metrics: WorkloadMetrics::default(),
            sync: SyncStatus::Pending,
            mirrored_replicas: None,
            created_at: 0,
            seq: 1,
        }
    }

    const HOUR: u64 = 3_600_000;

    #[test]
    fn peak_at_six_trough_at_eighteen() {
        let mut feed = DiurnalFeed::new(Some(1)).with_curve(100.0, 500.0, 0.0);
        let w = workload();
        let peak = feed.predict(&w, 6 * HOUR).unwrap();
        let trough = feed.predict(&w, 18 * HOUR).unwrap();
        assert!((peak.estimated_users - 600.0).abs() < 1e-6);
        // 100 - 500 is floored.
        assert_eq!(trough.estimated_users, 0.0);
        assert_eq!(peak.confidence, 0.89);
    }

    #[test]
    fn wraps_around_days() {
        let mut feed = DiurnalFeed::new(Some(1)).with_curve(100.0, 500.0, 0.0);
        let w = workload();
        let a = feed.predict(&w, 3 * HOUR).unwrap().estimated_users;
        let b = feed.predict(&w, 27 * HOUR).unwrap().estimated_users;
        assert!((a - b).abs() < 1e-6);
    }

    #[test]
    fn noise_stays_within_jitter() {
        let mut feed = DiurnalFeed::new(Some(9));
        let w = workload();
        for _ in 0..100 {
            // sin(0) = 0, so only base + noise remains.
            let p = feed.predict(&w, 0).unwrap();
            assert!((100.0..150.0).contains(&p.estimated_users), "{}", p.estimated_users);
        }
    }

    #[test]
    fn seeded_feeds_agree() {
        let w = workload();
        let mut a = DiurnalFeed::new(Some(5));
        let mut b = DiurnalFeed::new(Some(5));
        for t in 0..20 {
            assert_eq!(a.predict(&w, t * HOUR), b.predict(&w, t * HOUR));
        }
    }
}
