//! Progress logging for long-running exports.

use crate::config::PROGRESS_LOG_STEP_PERCENT;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Counts processed ids across workers and logs each crossed percentage step.
#[derive(Debug)]
pub struct ProgressTracker {
    total: u64,
    done: AtomicU64,
    enabled: bool,
}

impl ProgressTracker {
    pub fn new(total: u64, enabled: bool) -> Self {
        Self {
            total,
            done: AtomicU64::new(0),
            enabled,
        }
    }

    /// Record `count` more processed ids.
    pub fn record(&self, count: u64) {
        if count == 0 {
            return;
        }
        let before = self.done.fetch_add(count, Ordering::Relaxed);
        if !self.enabled || self.total == 0 {
            return;
        }
        let after = before + count;
        let step_before = step_of(before, self.total);
        let step_after = step_of(after, self.total);
        if step_after > step_before {
            info!(
                processed = after,
                total = self.total,
                "export progress {}%",
                step_after * PROGRESS_LOG_STEP_PERCENT
            );
        }
    }

    pub fn processed(&self) -> u64 {
        self.done.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}

#[inline]
fn step_of(done: u64, total: u64) -> u64 {
    let percent = done.min(total).saturating_mul(100) / total;
    percent / PROGRESS_LOG_STEP_PERCENT
}
