//! Service-level request counters feeding the health report.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Lock-free counters over all solve requests handled by one service.
#[derive(Debug, Default)]
pub struct ServiceStats {
    total: AtomicU64,
    succeeded: AtomicU64,
    total_millis: AtomicU64,
}

/// Point-in-time view of [`ServiceStats`].
#[derive(Debug, Clone, Copy)]
pub struct StatsSnapshot {
    pub total_requests: u64,
    pub succeeded: u64,
    pub success_rate: f64,
    pub average_time_seconds: f64,
}

impl ServiceStats {
    pub fn record(&self, success: bool, elapsed: Duration) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if success {
            self.succeeded.fetch_add(1, Ordering::Relaxed);
        }
        self.total_millis
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let total = self.total.load(Ordering::Relaxed);
        let succeeded = self.succeeded.load(Ordering::Relaxed);
        let millis = self.total_millis.load(Ordering::Relaxed);
        StatsSnapshot {
            total_requests: total,
            succeeded,
            success_rate: if total == 0 {
                1.0
            } else {
                succeeded as f64 / total as f64
            },
            average_time_seconds: if total == 0 {
                0.0
            } else {
                millis as f64 / total as f64 / 1_000.0
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_stats_report_full_success() {
        let stats = ServiceStats::default();
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_requests, 0);
        assert_eq!(snapshot.success_rate, 1.0);
        assert_eq!(snapshot.average_time_seconds, 0.0);
    }

    #[test]
    fn test_rates_and_averages() {
        let stats = ServiceStats::default();
        stats.record(true, Duration::from_millis(100));
        stats.record(true, Duration::from_millis(300));
        stats.record(false, Duration::from_millis(200));
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_requests, 3);
        assert!((snapshot.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!((snapshot.average_time_seconds - 0.2).abs() < 1e-9);
    }
}
