//! Explicit supervisor state: constructed once at startup and passed by
//! reference to every component. No ambient globals.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;

use warden_common::SupervisorConfig;

use crate::metrics::MetricsStore;
use crate::probe::HealthProbe;
use crate::remediation::{AlertLog, RemediationConfig, RemediationController};
use crate::resources::ResourceSampler;
use crate::restart::RestartAction;
use crate::telemetry::Telemetry;

const ALERT_LOG_CAPACITY: usize = 256;

pub struct SupervisorState {
    pub config: Arc<SupervisorConfig>,
    pub probe: HealthProbe,
    pub sampler: Arc<dyn ResourceSampler>,
    pub metrics: MetricsStore,
    pub remediation: RemediationController,
    pub telemetry: Telemetry,
    pub alerts: AlertLog,
    pub started_at: Instant,
}

impl SupervisorState {
    pub fn new(
        config: SupervisorConfig,
        restarter: Arc<dyn RestartAction>,
        sampler: Arc<dyn ResourceSampler>,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            probe: HealthProbe::new(config.default_timeout())?,
            metrics: MetricsStore::new(config.history_size),
            remediation: RemediationController::new(RemediationConfig::from(&config), restarter),
            telemetry: Telemetry::new()?,
            alerts: AlertLog::new(ALERT_LOG_CAPACITY),
            sampler,
            started_at: Instant::now(),
            config: Arc::new(config),
        })
    }
}
