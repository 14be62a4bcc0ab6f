//! Shared vocabulary for the supervisor and its clients.
//!
//! Everything here crosses the HTTP boundary, so timestamps are unix
//! seconds and durations are integral milliseconds.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Outcome of a single health probe against one service.
///
/// Created once per probe and never mutated afterwards; the metrics
/// store owns the copies it retains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub service: String,
    pub timestamp: u64,
    pub healthy: bool,
    pub response_time_ms: u64,
    pub status_code: Option<u16>,
    pub error: Option<String>,
    pub cpu_percent: f64,
    pub memory_percent: f64,
}

/// Where a service sits in its failure/recovery trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceState {
    #[serde(rename = "healthy")]
    Healthy,
    #[serde(rename = "degraded")]
    Degraded,
    #[serde(rename = "down")]
    Down,
    #[serde(rename = "recovering")]
    Recovering,
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ServiceState::Healthy => "healthy",
            ServiceState::Degraded => "degraded",
            ServiceState::Down => "down",
            ServiceState::Recovering => "recovering",
        };
        f.write_str(s)
    }
}

/// Aggregates derived from a service's retained check history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceMetrics {
    /// Healthy checks / total checks in the window, percent.
    pub success_rate: f64,
    pub avg_response_time_ms: f64,
    /// Synonym for success rate over the window; kept as its own field
    /// because operators read them differently.
    pub uptime_percent: f64,
    pub failure_streak: u32,
    pub success_streak: u32,
    pub total_requests: u64,
    pub total_failures: u64,
    pub last_failure: Option<u64>,
}

/// Per-service section of the status report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceReport {
    pub healthy: bool,
    pub critical: bool,
    pub state: ServiceState,
    pub response_time_ms: Option<u64>,
    pub status_code: Option<u16>,
    pub error: Option<String>,
    pub cpu: f64,
    pub memory: f64,
    pub last_check: Option<u64>,
    pub metrics: ServiceMetrics,
    /// Unix seconds of the last restart attempt, if any.
    pub last_remediation: Option<u64>,
    pub last_remediation_ok: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSummary {
    pub total: u32,
    pub healthy: u32,
    pub unhealthy: u32,
    /// healthy / total * 100, or 100 when no services are configured.
    pub health_score: f64,
}

/// Point-in-time snapshot of the whole fleet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub timestamp: u64,
    pub summary: StatusSummary,
    pub services: BTreeMap<String, ServiceReport>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertSeverity {
    #[serde(rename = "info")]
    Info,
    #[serde(rename = "warning")]
    Warning,
    #[serde(rename = "critical")]
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertKind {
    #[serde(rename = "state_change")]
    StateChange,
    #[serde(rename = "remediation_started")]
    RemediationStarted,
    #[serde(rename = "remediation_succeeded")]
    RemediationSucceeded,
    #[serde(rename = "remediation_failed")]
    RemediationFailed,
}

/// Event published on state transitions and remediation outcomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceAlert {
    pub service: String,
    pub severity: AlertSeverity,
    pub kind: AlertKind,
    pub message: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairFailure {
    pub service: String,
    pub error: String,
}

/// Outcome of a manual repair sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairResponse {
    pub attempted: u32,
    pub succeeded: u32,
    pub failures: Vec<RepairFailure>,
}
