pub mod config;
pub mod error;
pub mod types;

pub use config::{ServiceSpec, SupervisorConfig};
pub use error::{Result, WardenError};
pub use types::{
    AlertKind, AlertSeverity, HealthCheckResult, RepairFailure, RepairResponse, ServiceAlert,
    ServiceMetrics, ServiceReport, ServiceState, StatusReport, StatusSummary,
};

pub const WARDEN_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Unix timestamp in seconds, the wire representation for all report fields.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
