//! Point-in-time status snapshots.

use std::collections::BTreeMap;

use warden_common::{unix_now, ServiceReport, StatusReport, StatusSummary};

use crate::state::SupervisorState;

/// Assemble the fleet snapshot. Pure read over current state; services
/// that have not been probed yet appear with no `last_check` and count
/// as unhealthy, so the report stays best-effort rather than erroring.
pub fn build_status_report(state: &SupervisorState) -> StatusReport {
    let mut services = BTreeMap::new();
    let mut healthy_count = 0u32;

    for spec in &state.config.services {
        let latest = state.metrics.latest(&spec.name);
        let metrics = state.metrics.snapshot(&spec.name).unwrap_or_default();
        let (last_remediation, last_remediation_ok) = state.remediation.last_remediation(&spec.name);

        let healthy = latest.as_ref().map(|r| r.healthy).unwrap_or(false);
        if healthy {
            healthy_count += 1;
        }

        services.insert(
            spec.name.clone(),
            ServiceReport {
                healthy,
                critical: spec.critical,
                state: state.remediation.service_state(&spec.name),
                response_time_ms: latest.as_ref().map(|r| r.response_time_ms),
                status_code: latest.as_ref().and_then(|r| r.status_code),
                error: latest.as_ref().and_then(|r| r.error.clone()),
                cpu: latest.as_ref().map(|r| r.cpu_percent).unwrap_or(0.0),
                memory: latest.as_ref().map(|r| r.memory_percent).unwrap_or(0.0),
                last_check: latest.as_ref().map(|r| r.timestamp),
                metrics,
                last_remediation,
                last_remediation_ok,
            },
        );
    }

    let total = state.config.services.len() as u32;
    let health_score = if total == 0 {
        100.0
    } else {
        f64::from(healthy_count) / f64::from(total) * 100.0
    };

    StatusReport {
        timestamp: unix_now(),
        summary: StatusSummary {
            total,
            healthy: healthy_count,
            unhealthy: total - healthy_count,
            health_score,
        },
        services,
    }
}
