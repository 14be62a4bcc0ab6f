//! The periodic probe loop.
//!
//! Each cycle fans out one task per configured service (probe + resource
//! sample run concurrently inside it), waits for all of them, and feeds
//! every result through the metrics store into the remediation
//! controller. Per-service timeouts bound each task individually, so a
//! cycle's wall-clock time tracks the slowest single probe rather than
//! the sum.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::state::SupervisorState;

pub async fn run(state: Arc<SupervisorState>, mut shutdown: broadcast::Receiver<()>) {
    let mut ticker = interval(state.config.probe_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(
        interval_secs = state.config.probe_interval_secs,
        services = state.config.services.len(),
        "probe scheduler started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // Dropping the cycle future aborts its JoinSet, which
                // abandons in-flight probes. Restart tasks are spawned
                // detached and run to completion regardless.
                tokio::select! {
                    _ = run_cycle(&state) => {}
                    _ = shutdown.recv() => {
                        info!("probe scheduler shutting down mid-cycle");
                        return;
                    }
                }
            }
            _ = shutdown.recv() => {
                info!("probe scheduler shutting down");
                return;
            }
        }
    }
}

/// Run one full probe cycle across the fleet.
pub async fn run_cycle(state: &Arc<SupervisorState>) {
    let mut probes = JoinSet::new();
    for spec in state.config.services.iter().cloned() {
        let state = Arc::clone(state);
        probes.spawn(async move {
            let pattern = spec.process_pattern().to_string();
            let (mut result, usage) =
                tokio::join!(state.probe.check(&spec), state.sampler.sample(&pattern));
            result.cpu_percent = usage.cpu_percent;
            result.memory_percent = usage.memory_percent;
            (spec, result)
        });
    }

    while let Some(joined) = probes.join_next().await {
        match joined {
            Ok((spec, result)) => {
                debug!(
                    service = %spec.name,
                    healthy = result.healthy,
                    response_time_ms = result.response_time_ms,
                    error = result.error.as_deref().unwrap_or(""),
                    "probe completed"
                );
                state.telemetry.observe_check(&result);
                let streaks = state.metrics.record(result);
                state.remediation.evaluate(&spec, streaks);
            }
            Err(e) => warn!("probe task failed: {}", e),
        }
    }
}
