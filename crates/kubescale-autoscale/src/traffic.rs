//! Traffic signal source.
//!
//! Produces the demand estimate the policy engine scales on. A workload
//! fed by external predictions uses the latest one verbatim; otherwise the
//! estimate is simulated by bounded jitter around the previous value:
//!
//! ```text
//! next = max(floor, previous + uniform(-previous × volatility, +previous × volatility))
//! ```
//!
//! Falling back from external predictions to simulation only happens when
//! the signal is explicitly detected as lost (no prediction for
//! `signal_timeout`).

use rand::Rng;
use tracing::{debug, info, warn};

use kubescale_core::config::{TrafficConfig, TrafficMode};
use kubescale_core::ValidationError;
use kubescale_state::{Provenance, SignalMode, TrafficSample, TrafficSignal};

#[derive(Debug, Clone)]
pub struct TrafficSource {
    config: TrafficConfig,
}

impl TrafficSource {
    pub fn new(config: TrafficConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrafficConfig {
        &self.config
    }

    /// Record an external prediction and mark the workload externally fed.
    pub fn submit(
        &self,
        signal: &mut TrafficSignal,
        workload_id: &str,
        estimated_users: f64,
        confidence: Option<f64>,
        now: u64,
    ) -> Result<(), ValidationError> {
        validate_prediction(estimated_users, confidence)?;
        if signal.mode == SignalMode::Lost {
            info!(workload = %workload_id, "external traffic signal restored");
        }
        signal.mode = SignalMode::External;
        signal.last_external_at = Some(now);
        signal.latest = Some(TrafficSample {
            workload_id: workload_id.to_string(),
            estimated_users,
            timestamp: now,
            confidence,
            provenance: Provenance::External,
        });
        debug!(workload = %workload_id, estimated_users, "prediction accepted");
        Ok(())
    }

    /// Current demand estimate for a workload, advancing its signal.
    pub fn estimate<R: Rng + ?Sized>(
        &self,
        signal: &mut TrafficSignal,
        workload_id: &str,
        now: u64,
        rng: &mut R,
    ) -> f64 {
        if signal.mode == SignalMode::External && self.is_lost(signal, now) {
            warn!(
                workload = %workload_id,
                timeout = %self.config.signal_timeout,
                "external traffic signal lost, falling back to simulation"
            );
            signal.mode = SignalMode::Lost;
        }

        match signal.mode {
            SignalMode::External => signal
                .latest
                .as_ref()
                .map_or(0.0, |s| s.estimated_users),
            SignalMode::Unfed if self.config.mode == TrafficMode::External => 0.0,
            SignalMode::Unfed | SignalMode::Lost => {
                let previous = signal
                    .latest
                    .as_ref()
                    .map_or(self.config.initial_estimate, |s| s.estimated_users);
                let next = self.jitter(previous, rng);
                signal.latest = Some(TrafficSample {
                    workload_id: workload_id.to_string(),
                    estimated_users: next,
                    timestamp: now,
                    confidence: None,
                    provenance: Provenance::Fallback,
                });
                next
            }
        }
    }

    fn is_lost(&self, signal: &TrafficSignal, now: u64) -> bool {
        let timeout = self.config.signal_timeout.as_duration();
        if timeout.is_zero() {
            return false;
        }
        match signal.last_external_at {
            Some(at) => now.saturating_sub(at) > timeout.as_millis() as u64,
            None => false,
        }
    }

    fn jitter<R: Rng + ?Sized>(&self, previous: f64, rng: &mut R) -> f64 {
        let volatility = previous.abs() * self.config.volatility;
        let delta = if volatility > 0.0 {
            rng.gen_range(-volatility..=volatility)
        } else {
            0.0
        };
        (previous + delta).max(self.config.floor)
    }
}

/// Reject predictions the policy engine cannot interpret.
pub fn validate_prediction(estimated_users: f64, confidence: Option<f64>) -> Result<(), ValidationError> {
    if !estimated_users.is_finite() || estimated_users < 0.0 {
        return Err(ValidationError::InvalidPrediction(format!(
            "estimated users must be a nonnegative number, got {estimated_users}"
        )));
    }
    if let Some(c) = confidence
        && !(0.0..=1.0).contains(&c)
    {
        return Err(ValidationError::InvalidPrediction(format!(
            "confidence must be within [0, 1], got {c}"
        )));
    }
    Ok(())
}
