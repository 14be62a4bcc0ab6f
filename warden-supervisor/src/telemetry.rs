//! Prometheus exposition for the supervisor itself.

use anyhow::Result;
use prometheus::{Encoder, GaugeVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

use warden_common::HealthCheckResult;

pub struct Telemetry {
    registry: Registry,
    checks_total: IntCounterVec,
    restarts_total: IntCounterVec,
    service_up: IntGaugeVec,
    response_time_seconds: GaugeVec,
}

impl Telemetry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let checks_total = IntCounterVec::new(
            Opts::new("warden_health_checks_total", "Health checks performed"),
            &["service", "outcome"],
        )?;
        registry.register(Box::new(checks_total.clone()))?;

        let restarts_total = IntCounterVec::new(
            Opts::new("warden_restarts_total", "Restart commands dispatched"),
            &["service", "outcome"],
        )?;
        registry.register(Box::new(restarts_total.clone()))?;

        let service_up = IntGaugeVec::new(
            Opts::new("warden_service_up", "Latest probe outcome per service"),
            &["service"],
        )?;
        registry.register(Box::new(service_up.clone()))?;

        let response_time_seconds = GaugeVec::new(
            Opts::new(
                "warden_response_time_seconds",
                "Latest probe response time per service",
            ),
            &["service"],
        )?;
        registry.register(Box::new(response_time_seconds.clone()))?;

        Ok(Self {
            registry,
            checks_total,
            restarts_total,
            service_up,
            response_time_seconds,
        })
    }

    pub fn observe_check(&self, result: &HealthCheckResult) {
        let outcome = if result.healthy { "success" } else { "failure" };
        self.checks_total
            .with_label_values(&[result.service.as_str(), outcome])
            .inc();
        self.service_up
            .with_label_values(&[result.service.as_str()])
            .set(i64::from(result.healthy));
        self.response_time_seconds
            .with_label_values(&[result.service.as_str()])
            .set(result.response_time_ms as f64 / 1000.0);
    }

    pub fn observe_restart(&self, service: &str, ok: bool) {
        let outcome = if ok { "success" } else { "failure" };
        self.restarts_total
            .with_label_values(&[service, outcome])
            .inc();
    }

    /// Prometheus text format.
    pub fn export(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
