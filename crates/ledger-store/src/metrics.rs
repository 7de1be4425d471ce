//! Metrics and reporting for store operations.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Store operation metrics (thread-safe counters), owned by a store instance.
#[derive(Debug, Clone)]
pub struct StoreMetrics {
    /// Responses pushed for new transactions
    pub pushes: Arc<AtomicU64>,
    /// Responses replaced without history expansion
    pub replaces: Arc<AtomicU64>,
    /// Rejected requests recorded with their error
    pub errors_recorded: Arc<AtomicU64>,
    /// Object histories rewritten by expansion
    pub history_expansions: Arc<AtomicU64>,
    /// History entries dropped because fully shadowed
    pub history_entries_dropped: Arc<AtomicU64>,
    /// Commits of pending writes
    pub commits: Arc<AtomicU64>,
    /// Time spent expanding histories, in microseconds
    pub expansion_micros: Arc<AtomicU64>,
}

impl Default for StoreMetrics {
    fn default() -> Self {
        Self {
            pushes: Arc::new(AtomicU64::new(0)),
            replaces: Arc::new(AtomicU64::new(0)),
            errors_recorded: Arc::new(AtomicU64::new(0)),
            history_expansions: Arc::new(AtomicU64::new(0)),
            history_entries_dropped: Arc::new(AtomicU64::new(0)),
            commits: Arc::new(AtomicU64::new(0)),
            expansion_micros: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl StoreMetrics {
    pub fn record_push(&self) {
        self.pushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_replace(&self) {
        self.replaces.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors_recorded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the expansion of one history and how many entries it dropped.
    pub fn record_expansion(&self, dropped: u64) {
        self.history_expansions.fetch_add(1, Ordering::Relaxed);
        self.history_entries_dropped
            .fetch_add(dropped, Ordering::Relaxed);
    }

    pub fn record_commit(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    /// Add time spent expanding histories.
    pub fn record_expansion_time(&self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.expansion_micros.fetch_add(micros, Ordering::Relaxed);
    }

    /// Get a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            pushes: self.pushes.load(Ordering::Relaxed),
            replaces: self.replaces.load(Ordering::Relaxed),
            errors_recorded: self.errors_recorded.load(Ordering::Relaxed),
            history_expansions: self.history_expansions.load(Ordering::Relaxed),
            history_entries_dropped: self.history_entries_dropped.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            expansion_micros: self.expansion_micros.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of metrics (for reporting).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub pushes: u64,
    pub replaces: u64,
    pub errors_recorded: u64,
    pub history_expansions: u64,
    pub history_entries_dropped: u64,
    pub commits: u64,
    pub expansion_micros: u64,
}

impl MetricsSnapshot {
    /// Average number of entries dropped per expanded history.
    pub fn drop_rate(&self) -> f64 {
        if self.history_expansions == 0 {
            return 0.0;
        }
        self.history_entries_dropped as f64 / self.history_expansions as f64
    }

    /// Format a human-readable report.
    pub fn format_report(&self) -> String {
        let mut lines = Vec::new();
        lines.push("Store Metrics Report".to_string());
        lines.push("=".repeat(50));
        lines.push(format!("  Pushes:              {}", self.pushes));
        lines.push(format!("  Replaces:            {}", self.replaces));
        lines.push(format!("  Rejections recorded: {}", self.errors_recorded));
        lines.push(format!("  Commits:             {}", self.commits));
        lines.push(String::new());
        lines.push("Histories:".to_string());
        lines.push(format!("  Expansions:          {}", self.history_expansions));
        lines.push(format!(
            "  Entries dropped:     {}",
            self.history_entries_dropped
        ));
        lines.push(format!("  Dropped/expansion:   {:.2}", self.drop_rate()));
        lines.push(format!(
            "  Time spent:          {:.3} ms",
            self.expansion_micros as f64 / 1000.0
        ));
        lines.join("\n")
    }
}
