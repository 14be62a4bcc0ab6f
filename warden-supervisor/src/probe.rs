//! Single-shot HTTP health probes.
//!
//! A probe issues one GET against `endpoint + health_path` with a
//! per-service timeout and classifies the outcome. It never touches
//! shared state; the scheduler owns feeding results into the store.

use std::time::{Duration, Instant};

use warden_common::{unix_now, HealthCheckResult, ServiceSpec};

pub struct HealthProbe {
    client: reqwest::Client,
    default_timeout: Duration,
}

impl HealthProbe {
    pub fn new(default_timeout: Duration) -> anyhow::Result<Self> {
        // No client-wide timeout: each request carries its own bound so
        // per-service limits stay independent.
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            default_timeout,
        })
    }

    /// Probe one service. Infallible by design: every failure mode is a
    /// populated unhealthy result, never an error.
    pub async fn check(&self, spec: &ServiceSpec) -> HealthCheckResult {
        let url = spec.health_url();
        let timeout = spec.timeout(self.default_timeout);
        let start = Instant::now();

        match self.client.get(&url).timeout(timeout).send().await {
            Ok(response) => {
                let elapsed = start.elapsed().min(timeout);
                let code = response.status().as_u16();
                if response.status().is_success() {
                    HealthCheckResult {
                        service: spec.name.clone(),
                        timestamp: unix_now(),
                        healthy: true,
                        response_time_ms: elapsed.as_millis() as u64,
                        status_code: Some(code),
                        error: None,
                        cpu_percent: 0.0,
                        memory_percent: 0.0,
                    }
                } else {
                    HealthCheckResult {
                        service: spec.name.clone(),
                        timestamp: unix_now(),
                        healthy: false,
                        response_time_ms: elapsed.as_millis() as u64,
                        status_code: Some(code),
                        error: Some(format!("HTTP {}", code)),
                        cpu_percent: 0.0,
                        memory_percent: 0.0,
                    }
                }
            }
            Err(e) if e.is_timeout() => HealthCheckResult {
                service: spec.name.clone(),
                timestamp: unix_now(),
                healthy: false,
                // Measured end-to-end but capped at the timeout value.
                response_time_ms: timeout.as_millis() as u64,
                status_code: None,
                error: Some("Timeout".to_string()),
                cpu_percent: 0.0,
                memory_percent: 0.0,
            },
            Err(e) => HealthCheckResult {
                service: spec.name.clone(),
                timestamp: unix_now(),
                healthy: false,
                response_time_ms: start.elapsed().min(timeout).as_millis() as u64,
                status_code: None,
                error: Some(transport_error_text(&e)),
                cpu_percent: 0.0,
                memory_percent: 0.0,
            },
        }
    }
}

/// Innermost cause, so reports say "Connection refused" rather than the
/// client wrapper text.
fn transport_error_text(err: &reqwest::Error) -> String {
    let mut source: &dyn std::error::Error = err;
    while let Some(inner) = source.source() {
        source = inner;
    }
    source.to_string()
}
