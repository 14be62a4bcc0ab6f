//! HTTP status API.
//!
//! Read endpoints are pure views over current state; `/repair` is the
//! one mutating operation and maps straight onto the remediation
//! controller.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use warden_common::{
    RepairFailure, RepairResponse, ServiceAlert, ServiceReport, StatusReport, WARDEN_VERSION,
};

use crate::report::build_status_report;
use crate::state::SupervisorState;

#[derive(Debug, Deserialize)]
pub struct AlertsQuery {
    count: Option<usize>,
}

pub fn router(state: Arc<SupervisorState>) -> Router {
    Router::new()
        .route("/health", get(liveness))
        .route("/status", get(status))
        .route("/status/:service", get(service_status))
        .route("/alerts", get(alerts))
        .route("/repair", post(repair))
        .route("/metrics", get(metrics))
        // Dashboards consume the status API cross-origin.
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// GET /health - the supervisor's own liveness
async fn liveness(State(state): State<Arc<SupervisorState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": WARDEN_VERSION,
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    }))
}

/// GET /status - full fleet snapshot
async fn status(State(state): State<Arc<SupervisorState>>) -> Json<StatusReport> {
    Json(build_status_report(&state))
}

/// GET /status/:service - one service's section of the snapshot
async fn service_status(
    Path(service): Path<String>,
    State(state): State<Arc<SupervisorState>>,
) -> Result<Json<ServiceReport>, StatusCode> {
    let mut report = build_status_report(&state);
    report
        .services
        .remove(&service)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// GET /alerts - recent state transitions and remediation outcomes
async fn alerts(
    Query(query): Query<AlertsQuery>,
    State(state): State<Arc<SupervisorState>>,
) -> Json<Vec<ServiceAlert>> {
    Json(state.alerts.recent(query.count.unwrap_or(50)))
}

/// POST /repair - remediate every currently-unhealthy service
async fn repair(State(state): State<Arc<SupervisorState>>) -> Json<RepairResponse> {
    Json(repair_all(&state).await)
}

/// GET /metrics - Prometheus exposition
async fn metrics(State(state): State<Arc<SupervisorState>>) -> Result<String, StatusCode> {
    state.telemetry.export().map_err(|e| {
        error!("failed to export metrics: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

/// Invoke remediation for every service whose latest probe is unhealthy.
/// Manual repair bypasses the cooldown; the per-service in-flight
/// guarantee still holds.
pub async fn repair_all(state: &Arc<SupervisorState>) -> RepairResponse {
    let report = build_status_report(state);
    let unhealthy: Vec<String> = report
        .services
        .iter()
        .filter(|(_, service)| !service.healthy)
        .map(|(name, _)| name.clone())
        .collect();

    info!(count = unhealthy.len(), "manual repair sweep requested");

    let attempts = unhealthy.into_iter().map(|name| {
        let state = Arc::clone(state);
        async move {
            let outcome = state.remediation.force_remediate(&name).await;
            (name, outcome)
        }
    });
    let outcomes = futures::future::join_all(attempts).await;

    let mut response = RepairResponse {
        attempted: 0,
        succeeded: 0,
        failures: Vec::new(),
    };
    for (name, outcome) in outcomes {
        response.attempted += 1;
        match outcome {
            Ok(()) => response.succeeded += 1,
            Err(e) => response.failures.push(RepairFailure {
                service: name,
                error: e.to_string(),
            }),
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    use warden_common::{HealthCheckResult, ServiceSpec, SupervisorConfig};

    use crate::resources::NoopSampler;
    use crate::restart::CommandRestarter;

    async fn serve(state: Arc<SupervisorState>) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(state);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn seeded_state() -> Arc<SupervisorState> {
        let mut config = SupervisorConfig::default();
        config.services = vec![
            ServiceSpec::new("gateway", "http://127.0.0.1:1"),
            ServiceSpec::new("market-data", "http://127.0.0.1:2"),
        ];
        let state = SupervisorState::new(
            config,
            Arc::new(CommandRestarter::new(vec!["true".to_string()])),
            Arc::new(NoopSampler),
        )
        .unwrap();

        state.metrics.record(HealthCheckResult {
            service: "gateway".to_string(),
            timestamp: 1_700_000_000,
            healthy: true,
            response_time_ms: 12,
            status_code: Some(200),
            error: None,
            cpu_percent: 0.0,
            memory_percent: 0.0,
        });
        state.metrics.record(HealthCheckResult {
            service: "market-data".to_string(),
            timestamp: 1_700_000_000,
            healthy: false,
            response_time_ms: 5000,
            status_code: None,
            error: Some("Timeout".to_string()),
            cpu_percent: 0.0,
            memory_percent: 0.0,
        });
        Arc::new(state)
    }

    #[tokio::test]
    async fn status_endpoint_returns_snapshot() {
        let addr = serve(seeded_state()).await;
        let report: StatusReport = reqwest::get(format!("http://{}/status", addr))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(report.summary.total, 2);
        assert_eq!(report.summary.healthy, 1);
        assert_eq!(report.summary.health_score, 50.0);
        assert_eq!(
            report.services["market-data"].error.as_deref(),
            Some("Timeout")
        );
    }

    #[tokio::test]
    async fn service_endpoint_404s_unknown_names() {
        let addr = serve(seeded_state()).await;

        let response = reqwest::get(format!("http://{}/status/gateway", addr))
            .await
            .unwrap();
        assert!(response.status().is_success());
        let report: ServiceReport = response.json().await.unwrap();
        assert!(report.healthy);

        let response = reqwest::get(format!("http://{}/status/nope", addr))
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 404);
    }

    #[tokio::test]
    async fn repair_targets_only_unhealthy_services() {
        let state = seeded_state();
        let addr = serve(Arc::clone(&state)).await;

        let client = reqwest::Client::new();
        let response: RepairResponse = client
            .post(format!("http://{}/repair", addr))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(response.attempted, 1);
        assert_eq!(response.succeeded, 1);
        assert!(response.failures.is_empty());

        let (at, ok) = state.remediation.last_remediation("market-data");
        assert!(at.is_some());
        assert_eq!(ok, Some(true));
        let (at, _) = state.remediation.last_remediation("gateway");
        assert!(at.is_none());
    }

    #[tokio::test]
    async fn liveness_and_metrics_respond() {
        let state = seeded_state();
        state.telemetry.observe_check(&HealthCheckResult {
            service: "gateway".to_string(),
            timestamp: 0,
            healthy: true,
            response_time_ms: 10,
            status_code: Some(200),
            error: None,
            cpu_percent: 0.0,
            memory_percent: 0.0,
        });
        let addr = serve(state).await;

        let live: serde_json::Value = reqwest::get(format!("http://{}/health", addr))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(live["status"], "ok");

        let text = reqwest::get(format!("http://{}/metrics", addr))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(text.contains("warden_health_checks_total"));
    }
}
