//! Supervisor wiring: builds the state, spawns the scheduler and alert
//! forwarder, and serves the status API until shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use warden_common::{AlertKind, AlertSeverity, SupervisorConfig};

use crate::api;
use crate::resources::{NoopSampler, ProcfsSampler, ResourceSampler};
use crate::restart::CommandRestarter;
use crate::scheduler;
use crate::state::SupervisorState;

pub struct SupervisorServer {
    state: Arc<SupervisorState>,
}

impl SupervisorServer {
    pub fn new(config: SupervisorConfig) -> Result<Self> {
        let restarter = Arc::new(CommandRestarter::new(config.restart_command.clone()));
        let sampler: Arc<dyn ResourceSampler> = if cfg!(target_os = "linux") {
            Arc::new(ProcfsSampler::new())
        } else {
            Arc::new(NoopSampler)
        };
        let state = Arc::new(SupervisorState::new(config, restarter, sampler)?);
        Ok(Self { state })
    }

    pub fn state(&self) -> Arc<SupervisorState> {
        Arc::clone(&self.state)
    }

    /// Run until a shutdown signal arrives on `shutdown`.
    pub async fn run(self, shutdown: broadcast::Sender<()>) -> Result<()> {
        let state = self.state;

        let forwarder = spawn_alert_forwarder(Arc::clone(&state), shutdown.subscribe());
        let scheduler_task = tokio::spawn(scheduler::run(
            Arc::clone(&state),
            shutdown.subscribe(),
        ));

        let addr = SocketAddr::new(state.config.bind_address, state.config.http_port);
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind status API to {}", addr))?;
        info!("status API listening on {}", addr);

        let app = api::router(Arc::clone(&state));
        let mut shutdown_rx = shutdown.subscribe();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await
            .context("status API server failed")?;

        let _ = scheduler_task.await;
        let _ = forwarder.await;
        info!("supervisor stopped");
        Ok(())
    }
}

/// Drain the controller's alert stream: log each alert, feed restart
/// outcomes into telemetry, and retain alerts for the /alerts endpoint.
pub fn spawn_alert_forwarder(
    state: Arc<SupervisorState>,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    let mut alerts = state.remediation.subscribe_alerts();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                received = alerts.recv() => match received {
                    Ok(alert) => {
                        match alert.severity {
                            AlertSeverity::Critical | AlertSeverity::Warning => {
                                warn!(service = %alert.service, kind = ?alert.kind, "{}", alert.message)
                            }
                            AlertSeverity::Info => {
                                info!(service = %alert.service, kind = ?alert.kind, "{}", alert.message)
                            }
                        }
                        match alert.kind {
                            AlertKind::RemediationSucceeded => {
                                state.telemetry.observe_restart(&alert.service, true)
                            }
                            AlertKind::RemediationFailed => {
                                state.telemetry.observe_restart(&alert.service, false)
                            }
                            _ => {}
                        }
                        state.alerts.push(alert);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("alert stream lagged, {} alerts dropped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = shutdown.recv() => break,
            }
        }
    })
}
