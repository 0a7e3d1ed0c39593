//! Health monitoring and metrics for pipeline stages

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::types::StageRole;

fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Progress counters for one stage
///
/// Written by the stage task, read by the pipeline monitor. All fields use
/// atomic operations for thread-safe access.
#[derive(Debug)]
pub struct StageHealth {
    name: String,
    role: StageRole,

    /// Number of items fully processed
    items_processed: AtomicU64,

    /// Number of capability failures
    failures: AtomicU64,

    /// Timestamp (as Unix microseconds) of the last processed item, or of
    /// stage creation before the first one
    last_item_time: AtomicU64,

    /// Set once the stage has left its run loop
    finished: AtomicBool,
}

impl StageHealth {
    pub fn new(name: impl Into<String>, role: StageRole) -> Self {
        Self {
            name: name.into(),
            role,
            items_processed: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            last_item_time: AtomicU64::new(now_micros()),
            finished: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record a processed item
    pub fn record_item(&self) {
        self.last_item_time.store(now_micros(), Ordering::Relaxed);
        self.items_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a capability failure
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Mark the stage as done
    pub fn mark_finished(&self) {
        self.finished.store(true, Ordering::Relaxed);
    }

    pub fn items_processed(&self) -> u64 {
        self.items_processed.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }

    /// Check if a running stage processed nothing for `threshold`
    ///
    /// A stage blocked on a full output channel whose consumer no longer
    /// reads shows up here.
    pub fn is_stalled(&self, threshold: Duration) -> bool {
        if self.is_finished() {
            return false;
        }
        let last = self.last_item_time.load(Ordering::Relaxed);
        let elapsed_micros = now_micros().saturating_sub(last);
        elapsed_micros > threshold.as_micros() as u64
    }

    /// Get a summary of health metrics
    pub fn summary(&self) -> HealthSummary {
        HealthSummary {
            name: self.name.clone(),
            role: self.role,
            items_processed: self.items_processed(),
            failures: self.failures(),
            finished: self.is_finished(),
        }
    }
}

/// Snapshot of one stage's health
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthSummary {
    pub name: String,
    pub role: StageRole,
    pub items_processed: u64,
    pub failures: u64,
    pub finished: bool,
}

impl std::fmt::Display for HealthSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}]: items={} failures={}{}",
            self.name,
            self.role,
            self.items_processed,
            self.failures,
            if self.finished { " (finished)" } else { "" }
        )
    }
}
