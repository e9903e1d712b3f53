//! Hysteresis counter.
//!
//! Converts a stream of per-check outcomes into at most one transition per
//! crossing of the threshold boundary. All operations are lock-free so the
//! current health can be read from any task without blocking.

use std::sync::atomic::{AtomicU32, Ordering};

/// A crossing of the threshold boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    BecameHealthy,
    BecameUnhealthy,
}

/// Consecutive failure counter with a fixed threshold.
///
/// Healthy iff `count < threshold`. The count never exceeds
/// `threshold + 1`.
#[derive(Debug)]
pub struct FailureCounter {
    count: AtomicU32,
    threshold: u32,
}

impl FailureCounter {
    /// Start at `threshold`: unhealthy until a result proves otherwise.
    pub fn new(threshold: u32) -> Self {
        Self {
            count: AtomicU32::new(threshold),
            threshold,
        }
    }

    /// Failures needed to report unhealthy.
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Current consecutive failure count.
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }

    /// `count < threshold`.
    pub fn is_healthy(&self) -> bool {
        self.count() < self.threshold
    }

    /// Apply one outcome and report the transition it caused, if any.
    pub fn record(&self, healthy: bool) -> Option<Transition> {
        if healthy {
            self.record_success()
        } else {
            self.record_failure()
        }
    }

    /// Reset to zero. Fires only if the counter was at or past the threshold.
    pub fn record_success(&self) -> Option<Transition> {
        let prev = self.count.swap(0, Ordering::SeqCst);
        (prev >= self.threshold).then_some(Transition::BecameHealthy)
    }

    /// Increment, clamped at `threshold + 1`. Fires only on the increment
    /// that lands exactly on the threshold.
    pub fn record_failure(&self) -> Option<Transition> {
        let cap = self.threshold.saturating_add(1);
        let prev = self
            .count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| {
                Some(c.saturating_add(1).min(cap))
            })
            .unwrap_or_else(|c| c);
        let new = prev.saturating_add(1).min(cap);
        (new == self.threshold && prev < self.threshold).then_some(Transition::BecameUnhealthy)
    }
}
