//! Bounded per-service health history and derived aggregates.
//!
//! One `ServiceHealthRecord` per service, created lazily on first probe
//! and owned exclusively by the store. Entries are keyed per service so
//! concurrent probes of different services never contend.

use std::collections::VecDeque;

use dashmap::DashMap;

use warden_common::{HealthCheckResult, ServiceMetrics};

/// Post-update streak counters, returned from `record` so callers do not
/// need a second lookup.
#[derive(Debug, Clone, Copy)]
pub struct Streaks {
    pub failures: u32,
    pub successes: u32,
}

struct ServiceHealthRecord {
    history: VecDeque<HealthCheckResult>,
    failure_streak: u32,
    success_streak: u32,
    last_failure: Option<u64>,
    total_requests: u64,
    total_failures: u64,
}

impl ServiceHealthRecord {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(capacity),
            failure_streak: 0,
            success_streak: 0,
            last_failure: None,
            total_requests: 0,
            total_failures: 0,
        }
    }
}

pub struct MetricsStore {
    records: DashMap<String, ServiceHealthRecord>,
    capacity: usize,
}

impl MetricsStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: DashMap::new(),
            capacity,
        }
    }

    /// Append a result to its service's history, evicting the oldest
    /// entry at capacity, and update the streak counters.
    ///
    /// Invariant maintained: at most one of {failure streak, success
    /// streak} is nonzero. `last_failure` is retained across recoveries
    /// for reporting.
    pub fn record(&self, result: HealthCheckResult) -> Streaks {
        let mut record = self
            .records
            .entry(result.service.clone())
            .or_insert_with(|| ServiceHealthRecord::with_capacity(self.capacity));

        record.total_requests += 1;
        if result.healthy {
            record.success_streak += 1;
            record.failure_streak = 0;
        } else {
            record.failure_streak += 1;
            record.success_streak = 0;
            record.total_failures += 1;
            record.last_failure = Some(result.timestamp);
        }

        if record.history.len() == self.capacity {
            record.history.pop_front();
        }
        record.history.push_back(result);

        Streaks {
            failures: record.failure_streak,
            successes: record.success_streak,
        }
    }

    /// Derive aggregates over the retained window. Pure read.
    pub fn snapshot(&self, service: &str) -> Option<ServiceMetrics> {
        let record = self.records.get(service)?;
        let total = record.history.len();
        let healthy = record.history.iter().filter(|r| r.healthy).count();

        let success_rate = if total == 0 {
            0.0
        } else {
            healthy as f64 / total as f64 * 100.0
        };
        let avg_response_time_ms = if total == 0 {
            0.0
        } else {
            record
                .history
                .iter()
                .map(|r| r.response_time_ms as f64)
                .sum::<f64>()
                / total as f64
        };

        Some(ServiceMetrics {
            success_rate,
            avg_response_time_ms,
            uptime_percent: success_rate,
            failure_streak: record.failure_streak,
            success_streak: record.success_streak,
            total_requests: record.total_requests,
            total_failures: record.total_failures,
            last_failure: record.last_failure,
        })
    }

    /// Most recent result for a service, if it has been probed.
    pub fn latest(&self, service: &str) -> Option<HealthCheckResult> {
        self.records
            .get(service)
            .and_then(|record| record.history.back().cloned())
    }

    /// Number of retained entries for a service.
    pub fn history_len(&self, service: &str) -> usize {
        self.records
            .get(service)
            .map(|record| record.history.len())
            .unwrap_or(0)
    }

    #[cfg(test)]
    fn history_timestamps(&self, service: &str) -> Vec<u64> {
        self.records
            .get(service)
            .map(|record| record.history.iter().map(|r| r.timestamp).collect())
            .unwrap_or_default()
    }
}
