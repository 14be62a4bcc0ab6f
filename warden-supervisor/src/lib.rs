//! Self-healing service supervisor.
//!
//! The supervisor probes a fixed fleet of HTTP services on an interval,
//! keeps bounded per-service health history, classifies each service's
//! trajectory with failure/recovery streaks, and restarts services that
//! cross into `Down` — with a cooldown and an at-most-one-in-flight
//! guarantee per service.

pub mod api;
pub mod metrics;
pub mod probe;
pub mod remediation;
pub mod report;
pub mod resources;
pub mod restart;
pub mod scheduler;
pub mod server;
pub mod state;
pub mod telemetry;

pub use metrics::{MetricsStore, Streaks};
pub use probe::HealthProbe;
pub use remediation::RemediationController;
pub use resources::{NoopSampler, ProcfsSampler, ResourceSampler, ResourceUsage};
pub use restart::{CommandRestarter, RestartAction};
pub use server::SupervisorServer;
pub use state::SupervisorState;
