//! Per-rule evaluation statistics for diagnostics dashboards.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleStats {
    pub evaluations: u64,
    pub failures: u64,
    pub total_duration: Duration,
    pub max_duration: Duration,
}

impl RuleStats {
    pub fn average_duration(&self) -> Duration {
        if self.evaluations == 0 {
            Duration::ZERO
        } else {
            self.total_duration / self.evaluations as u32
        }
    }
}

/// Thread-safe counters keyed by rule id. Purely observational: dropping
/// the monitor changes nothing about evaluation results.
#[derive(Debug, Default)]
pub struct RulePerformanceMonitor {
    stats: Mutex<HashMap<String, RuleStats>>,
}

impl RulePerformanceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, rule_id: &str, duration: Duration, passed: bool) {
        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        let entry = stats.entry(rule_id.to_string()).or_default();
        entry.evaluations += 1;
        if !passed {
            entry.failures += 1;
        }
        entry.total_duration += duration;
        entry.max_duration = entry.max_duration.max(duration);
    }

    pub fn stats_for(&self, rule_id: &str) -> Option<RuleStats> {
        let stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        stats.get(rule_id).cloned()
    }

    /// Snapshot sorted by evaluation count, busiest first.
    pub fn snapshot(&self) -> Vec<(String, RuleStats)> {
        let stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries: Vec<_> = stats
            .iter()
            .map(|(id, s)| (id.clone(), s.clone()))
            .collect();
        entries.sort_by(|a, b| b.1.evaluations.cmp(&a.1.evaluations));
        entries
    }

    pub fn reset(&self) {
        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        stats.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_counts_and_failures() {
        let monitor = RulePerformanceMonitor::new();
        monitor.record("r1", Duration::from_millis(4), true);
        monitor.record("r1", Duration::from_millis(2), false);
        monitor.record("r2", Duration::from_millis(1), true);

        let stats = monitor.stats_for("r1").unwrap();
        assert_eq!(stats.evaluations, 2);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.max_duration, Duration::from_millis(4));
        assert_eq!(stats.average_duration(), Duration::from_millis(3));
    }

    #[test]
    fn snapshot_orders_by_busyness() {
        let monitor = RulePerformanceMonitor::new();
        monitor.record("quiet", Duration::ZERO, true);
        monitor.record("busy", Duration::ZERO, true);
        monitor.record("busy", Duration::ZERO, true);

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot[0].0, "busy");
        assert_eq!(snapshot.len(), 2);

        monitor.reset();
        assert!(monitor.snapshot().is_empty());
    }
}
