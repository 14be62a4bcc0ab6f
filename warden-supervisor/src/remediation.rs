//! Remediation decisions: the per-service episode state machine.
//!
//! Driven by the streak counters the metrics store returns for each new
//! result. A service crossing its failure threshold enters `Down` and,
//! when auto-repair is on, gets its restart action invoked — at most
//! once per cooldown window and never with two restarts in flight.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use warden_common::{
    unix_now, AlertKind, AlertSeverity, Result, ServiceAlert, ServiceSpec, ServiceState,
    SupervisorConfig, WardenError,
};

use crate::metrics::Streaks;
use crate::restart::RestartAction;

#[derive(Debug, Clone)]
pub struct RemediationConfig {
    pub auto_repair: bool,
    pub cooldown: Duration,
    /// Cooldown multiplier per consecutive restart within one unresolved
    /// episode chain; 1.0 keeps the cooldown flat.
    pub backoff: f64,
    pub max_cooldown: Duration,
}

impl From<&SupervisorConfig> for RemediationConfig {
    fn from(config: &SupervisorConfig) -> Self {
        Self {
            auto_repair: config.auto_repair,
            cooldown: config.cooldown(),
            backoff: config.cooldown_backoff,
            max_cooldown: config.max_cooldown(),
        }
    }
}

struct ServiceRemediation {
    state: ServiceState,
    /// Cooldown clock; starts at each restart dispatch.
    last_attempt: Option<Instant>,
    last_attempt_unix: Option<u64>,
    /// Consecutive restarts without a full recovery in between.
    attempts: u32,
    in_flight: Arc<AtomicBool>,
    last_outcome_ok: Option<bool>,
}

impl Default for ServiceRemediation {
    fn default() -> Self {
        Self {
            state: ServiceState::Healthy,
            last_attempt: None,
            last_attempt_unix: None,
            attempts: 0,
            in_flight: Arc::new(AtomicBool::new(false)),
            last_outcome_ok: None,
        }
    }
}

struct Inner {
    services: DashMap<String, ServiceRemediation>,
    restarter: Arc<dyn RestartAction>,
    config: RemediationConfig,
    alert_tx: broadcast::Sender<ServiceAlert>,
}

impl Inner {
    fn alert(&self, service: &str, severity: AlertSeverity, kind: AlertKind, message: String) {
        let alert = ServiceAlert {
            service: service.to_string(),
            severity,
            kind,
            message,
            timestamp: unix_now(),
        };
        // No subscribers is fine.
        let _ = self.alert_tx.send(alert);
    }

    /// Run the restart action and record the outcome. The caller owns
    /// the in-flight flag.
    async fn execute_restart(&self, service: &str) -> Result<()> {
        self.alert(
            service,
            AlertSeverity::Warning,
            AlertKind::RemediationStarted,
            "restart dispatched".to_string(),
        );
        info!(service, "invoking restart action");

        let result = self.restarter.restart(service).await;

        if let Some(mut entry) = self.services.get_mut(service) {
            entry.last_outcome_ok = Some(result.is_ok());
        }
        match &result {
            Ok(()) => {
                info!(service, "restart command succeeded");
                self.alert(
                    service,
                    AlertSeverity::Info,
                    AlertKind::RemediationSucceeded,
                    "restart command succeeded".to_string(),
                );
            }
            Err(e) => {
                warn!(service, error = %e, "restart command failed");
                self.alert(
                    service,
                    AlertSeverity::Critical,
                    AlertKind::RemediationFailed,
                    format!("restart failed: {}", e),
                );
            }
        }
        result
    }

    /// Time left before another restart may be dispatched, or `None`
    /// when one is allowed now.
    fn cooldown_remaining(&self, entry: &ServiceRemediation) -> Option<Duration> {
        let last = entry.last_attempt?;
        let factor = self.config.backoff.powi(entry.attempts.saturating_sub(1) as i32);
        let effective = self
            .config
            .cooldown
            .mul_f64(factor)
            .min(self.config.max_cooldown);
        let elapsed = last.elapsed();
        if elapsed >= effective {
            None
        } else {
            Some(effective - elapsed)
        }
    }
}

pub struct RemediationController {
    inner: Arc<Inner>,
}

impl RemediationController {
    pub fn new(config: RemediationConfig, restarter: Arc<dyn RestartAction>) -> Self {
        let (alert_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(Inner {
                services: DashMap::new(),
                restarter,
                config,
                alert_tx,
            }),
        }
    }

    pub fn subscribe_alerts(&self) -> broadcast::Receiver<ServiceAlert> {
        self.inner.alert_tx.subscribe()
    }

    /// Feed one probe outcome (as post-update streaks) into the state
    /// machine. Restart invocations are launched as detached tasks so
    /// the probe cycle is never blocked by a slow restart.
    pub fn evaluate(&self, spec: &ServiceSpec, streaks: Streaks) {
        let mut entry = self
            .inner
            .services
            .entry(spec.name.clone())
            .or_default();
        let previous = entry.state;

        if streaks.failures > 0 {
            if streaks.failures >= spec.failure_threshold {
                if previous != ServiceState::Down {
                    entry.state = ServiceState::Down;
                    let severity = if spec.critical {
                        AlertSeverity::Critical
                    } else {
                        AlertSeverity::Warning
                    };
                    self.inner.alert(
                        &spec.name,
                        severity,
                        AlertKind::StateChange,
                        format!("down after {} consecutive failures", streaks.failures),
                    );
                }
                self.maybe_launch_restart(&mut entry, spec);
            } else {
                match previous {
                    // An unresolved episode: a brief success reset the
                    // failure streak but the service never met its
                    // recovery threshold.
                    ServiceState::Down | ServiceState::Recovering => {
                        entry.state = ServiceState::Down;
                    }
                    ServiceState::Healthy => {
                        entry.state = ServiceState::Degraded;
                        self.inner.alert(
                            &spec.name,
                            AlertSeverity::Warning,
                            AlertKind::StateChange,
                            format!("degraded ({} consecutive failures)", streaks.failures),
                        );
                    }
                    ServiceState::Degraded => {}
                }
            }
        } else if streaks.successes > 0 {
            match previous {
                ServiceState::Down | ServiceState::Recovering => {
                    if streaks.successes >= spec.recovery_threshold {
                        entry.state = ServiceState::Healthy;
                        entry.attempts = 0;
                        self.inner.alert(
                            &spec.name,
                            AlertSeverity::Info,
                            AlertKind::StateChange,
                            format!("recovered after {} consecutive successes", streaks.successes),
                        );
                    } else {
                        entry.state = ServiceState::Recovering;
                        debug!(service = %spec.name, "passing checks, awaiting recovery threshold");
                    }
                }
                ServiceState::Degraded => {
                    entry.state = ServiceState::Healthy;
                    debug!(service = %spec.name, "degradation cleared");
                }
                ServiceState::Healthy => {}
            }
        }
    }

    fn maybe_launch_restart(
        &self,
        entry: &mut ServiceRemediation,
        spec: &ServiceSpec,
    ) {
        if !self.inner.config.auto_repair {
            return;
        }
        if entry.in_flight.load(Ordering::SeqCst) {
            debug!(service = %spec.name, "restart already in flight");
            return;
        }
        if let Some(remaining) = self.inner.cooldown_remaining(entry) {
            debug!(
                service = %spec.name,
                remaining_secs = remaining.as_secs(),
                "still failing, within remediation cooldown"
            );
            return;
        }

        entry.in_flight.store(true, Ordering::SeqCst);
        entry.attempts += 1;
        entry.last_attempt = Some(Instant::now());
        entry.last_attempt_unix = Some(unix_now());

        let inner = Arc::clone(&self.inner);
        let in_flight = Arc::clone(&entry.in_flight);
        let service = spec.name.clone();
        tokio::spawn(async move {
            let _ = inner.execute_restart(&service).await;
            // Release on every exit path; the flag is what guarantees
            // at most one restart in flight per service.
            in_flight.store(false, Ordering::SeqCst);
        });
    }

    /// Operator-initiated restart: bypasses the cooldown but still takes
    /// the per-service in-flight flag. Runs the restart to completion.
    pub async fn force_remediate(&self, service: &str) -> Result<()> {
        let in_flight = {
            let mut entry = self
                .inner
                .services
                .entry(service.to_string())
                .or_default();
            if entry.in_flight.swap(true, Ordering::SeqCst) {
                return Err(WardenError::RemediationInFlight(service.to_string()));
            }
            entry.attempts += 1;
            entry.last_attempt = Some(Instant::now());
            entry.last_attempt_unix = Some(unix_now());
            Arc::clone(&entry.in_flight)
        };

        let result = self.inner.execute_restart(service).await;
        in_flight.store(false, Ordering::SeqCst);
        result
    }

    pub fn service_state(&self, service: &str) -> ServiceState {
        self.inner
            .services
            .get(service)
            .map(|entry| entry.state)
            .unwrap_or(ServiceState::Healthy)
    }

    pub fn remediation_in_flight(&self, service: &str) -> bool {
        self.inner
            .services
            .get(service)
            .map(|entry| entry.in_flight.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Last attempt timestamp and whether its command succeeded.
    pub fn last_remediation(&self, service: &str) -> (Option<u64>, Option<bool>) {
        self.inner
            .services
            .get(service)
            .map(|entry| (entry.last_attempt_unix, entry.last_outcome_ok))
            .unwrap_or((None, None))
    }
}

/// Bounded buffer of recent alerts, served by the status API.
pub struct AlertLog {
    buf: Mutex<VecDeque<ServiceAlert>>,
    capacity: usize,
}

impl AlertLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn push(&self, alert: ServiceAlert) {
        if let Ok(mut buf) = self.buf.lock() {
            if buf.len() == self.capacity {
                buf.pop_front();
            }
            buf.push_back(alert);
        }
    }

    /// Most recent `count` alerts, newest first.
    pub fn recent(&self, count: usize) -> Vec<ServiceAlert> {
        match self.buf.lock() {
            Ok(buf) => buf.iter().rev().take(count).cloned().collect(),
            Err(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct MockRestarter {
        calls: AtomicUsize,
        fail: bool,
        delay: Option<Duration>,
    }

    impl MockRestarter {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: false,
                delay: None,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: true,
                delay: None,
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: false,
                delay: Some(delay),
            })
        }

        fn count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RestartAction for MockRestarter {
        async fn restart(&self, service: &str) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                Err(WardenError::RestartFailed(format!(
                    "simulated failure restarting {}",
                    service
                )))
            } else {
                Ok(())
            }
        }
    }

    fn controller_with(
        restarter: Arc<dyn RestartAction>,
        cooldown: Duration,
    ) -> RemediationController {
        RemediationController::new(
            RemediationConfig {
                auto_repair: true,
                cooldown,
                backoff: 1.0,
                max_cooldown: Duration::from_secs(3600),
            },
            restarter,
        )
    }

    fn spec() -> ServiceSpec {
        let mut spec = ServiceSpec::new("gateway", "http://127.0.0.1:1");
        spec.failure_threshold = 3;
        spec.recovery_threshold = 2;
        spec
    }

    fn fail(n: u32) -> Streaks {
        Streaks {
            failures: n,
            successes: 0,
        }
    }

    fn ok(n: u32) -> Streaks {
        Streaks {
            failures: 0,
            successes: n,
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached within 2s");
    }

    #[tokio::test]
    async fn down_exactly_at_threshold() {
        let restarter = MockRestarter::new();
        let controller = controller_with(restarter.clone(), Duration::from_secs(300));
        let spec = spec();

        controller.evaluate(&spec, fail(1));
        assert_eq!(controller.service_state("gateway"), ServiceState::Degraded);
        controller.evaluate(&spec, fail(2));
        assert_eq!(controller.service_state("gateway"), ServiceState::Degraded);
        assert_eq!(restarter.count(), 0);

        controller.evaluate(&spec, fail(3));
        assert_eq!(controller.service_state("gateway"), ServiceState::Down);
        wait_until(|| restarter.count() == 1).await;
    }

    #[tokio::test]
    async fn streak_reset_defers_down() {
        let restarter = MockRestarter::new();
        let controller = controller_with(restarter.clone(), Duration::from_secs(300));
        let spec = spec();

        // fail, fail, ok, fail, fail, fail — down only after the 6th.
        controller.evaluate(&spec, fail(1));
        controller.evaluate(&spec, fail(2));
        controller.evaluate(&spec, ok(1));
        assert_eq!(controller.service_state("gateway"), ServiceState::Healthy);
        controller.evaluate(&spec, fail(1));
        controller.evaluate(&spec, fail(2));
        assert_eq!(restarter.count(), 0);
        assert_ne!(controller.service_state("gateway"), ServiceState::Down);

        controller.evaluate(&spec, fail(3));
        assert_eq!(controller.service_state("gateway"), ServiceState::Down);
        wait_until(|| restarter.count() == 1).await;
    }

    #[tokio::test]
    async fn cooldown_suppresses_repeat_restarts() {
        let restarter = MockRestarter::new();
        let controller = controller_with(restarter.clone(), Duration::from_secs(300));
        let spec = spec();

        for n in 1..=8 {
            controller.evaluate(&spec, fail(n));
        }
        wait_until(|| restarter.count() == 1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(restarter.count(), 1, "cooldown must dedupe restarts");
        assert_eq!(controller.service_state("gateway"), ServiceState::Down);
    }

    #[tokio::test]
    async fn elapsed_cooldown_allows_retry_while_still_failing() {
        let restarter = MockRestarter::new();
        let controller = controller_with(restarter.clone(), Duration::ZERO);
        let spec = spec();

        controller.evaluate(&spec, fail(3));
        wait_until(|| restarter.count() == 1).await;
        wait_until(|| !controller.remediation_in_flight("gateway")).await;

        controller.evaluate(&spec, fail(4));
        wait_until(|| restarter.count() == 2).await;
    }

    #[tokio::test]
    async fn in_flight_restart_blocks_duplicates() {
        let restarter = MockRestarter::slow(Duration::from_millis(300));
        let controller = controller_with(restarter.clone(), Duration::ZERO);
        let spec = spec();

        controller.evaluate(&spec, fail(3));
        wait_until(|| restarter.count() == 1).await;
        controller.evaluate(&spec, fail(4));
        controller.evaluate(&spec, fail(5));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(restarter.count(), 1, "no second restart while one is in flight");
    }

    #[tokio::test]
    async fn failed_restart_releases_in_flight_flag() {
        let restarter = MockRestarter::failing();
        let controller = controller_with(restarter.clone(), Duration::ZERO);
        let spec = spec();

        controller.evaluate(&spec, fail(3));
        wait_until(|| restarter.count() == 1).await;
        wait_until(|| !controller.remediation_in_flight("gateway")).await;

        let (at, ok) = controller.last_remediation("gateway");
        assert!(at.is_some());
        assert_eq!(ok, Some(false));

        // A later attempt is possible: the flag was released on the
        // error path too.
        let err = controller.force_remediate("gateway").await.unwrap_err();
        assert!(matches!(err, WardenError::RestartFailed(_)));
        assert_eq!(restarter.count(), 2);
    }

    #[tokio::test]
    async fn recovery_requires_threshold_successes() {
        let restarter = MockRestarter::new();
        let controller = controller_with(restarter.clone(), Duration::from_secs(300));
        let spec = spec();

        controller.evaluate(&spec, fail(3));
        assert_eq!(controller.service_state("gateway"), ServiceState::Down);

        controller.evaluate(&spec, ok(1));
        assert_eq!(controller.service_state("gateway"), ServiceState::Recovering);
        controller.evaluate(&spec, ok(2));
        assert_eq!(controller.service_state("gateway"), ServiceState::Healthy);
    }

    #[tokio::test]
    async fn relapse_during_recovery_stays_down_without_new_restart() {
        let restarter = MockRestarter::new();
        let controller = controller_with(restarter.clone(), Duration::from_secs(300));
        let spec = spec();

        controller.evaluate(&spec, fail(3));
        wait_until(|| restarter.count() == 1).await;
        controller.evaluate(&spec, ok(1));
        assert_eq!(controller.service_state("gateway"), ServiceState::Recovering);

        controller.evaluate(&spec, fail(1));
        assert_eq!(controller.service_state("gateway"), ServiceState::Down);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(restarter.count(), 1, "relapse below threshold must not restart");
    }

    #[tokio::test]
    async fn auto_repair_off_still_tracks_state() {
        let restarter = MockRestarter::new();
        let controller = RemediationController::new(
            RemediationConfig {
                auto_repair: false,
                cooldown: Duration::ZERO,
                backoff: 1.0,
                max_cooldown: Duration::from_secs(3600),
            },
            restarter.clone(),
        );
        let spec = spec();

        controller.evaluate(&spec, fail(3));
        assert_eq!(controller.service_state("gateway"), ServiceState::Down);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(restarter.count(), 0);
    }

    #[tokio::test]
    async fn force_remediate_rejects_concurrent_attempts() {
        let restarter = MockRestarter::slow(Duration::from_millis(300));
        let controller = Arc::new(controller_with(restarter.clone(), Duration::ZERO));

        let first = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.force_remediate("gateway").await })
        };
        wait_until(|| restarter.count() == 1).await;

        let err = controller.force_remediate("gateway").await.unwrap_err();
        assert!(matches!(err, WardenError::RemediationInFlight(_)));
        assert!(first.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn alerts_cover_transitions_and_outcomes() {
        let restarter = MockRestarter::new();
        let controller = controller_with(restarter.clone(), Duration::from_secs(300));
        let mut alerts = controller.subscribe_alerts();
        let mut spec = spec();
        spec.critical = true;

        controller.evaluate(&spec, fail(1));
        controller.evaluate(&spec, fail(2));
        controller.evaluate(&spec, fail(3));
        wait_until(|| restarter.count() == 1).await;

        let degraded = alerts.recv().await.unwrap();
        assert_eq!(degraded.kind, AlertKind::StateChange);
        assert_eq!(degraded.severity, AlertSeverity::Warning);

        let down = alerts.recv().await.unwrap();
        assert_eq!(down.kind, AlertKind::StateChange);
        assert_eq!(down.severity, AlertSeverity::Critical);
        assert!(down.message.contains("down"));

        let started = alerts.recv().await.unwrap();
        assert_eq!(started.kind, AlertKind::RemediationStarted);
        let outcome = alerts.recv().await.unwrap();
        assert_eq!(outcome.kind, AlertKind::RemediationSucceeded);
    }

    #[test]
    fn alert_log_is_bounded_newest_first() {
        let log = AlertLog::new(3);
        for i in 0..5u64 {
            log.push(ServiceAlert {
                service: format!("svc-{}", i),
                severity: AlertSeverity::Info,
                kind: AlertKind::StateChange,
                message: String::new(),
                timestamp: i,
            });
        }
        let recent = log.recent(10);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].timestamp, 4);
        assert_eq!(recent[2].timestamp, 2);
    }

    #[tokio::test]
    async fn backoff_extends_cooldown() {
        let restarter = MockRestarter::new();
        let controller = RemediationController::new(
            RemediationConfig {
                auto_repair: true,
                cooldown: Duration::from_millis(50),
                backoff: 100.0,
                max_cooldown: Duration::from_secs(3600),
            },
            restarter.clone(),
        );
        let spec = spec();

        controller.evaluate(&spec, fail(3));
        wait_until(|| restarter.count() == 1).await;
        wait_until(|| !controller.remediation_in_flight("gateway")).await;

        // First retry gate is the flat cooldown (50ms).
        tokio::time::sleep(Duration::from_millis(80)).await;
        controller.evaluate(&spec, fail(4));
        wait_until(|| restarter.count() == 2).await;
        wait_until(|| !controller.remediation_in_flight("gateway")).await;

        // Second retry gate is 50ms * 100 = 5s; 80ms is not enough.
        tokio::time::sleep(Duration::from_millis(80)).await;
        controller.evaluate(&spec, fail(5));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(restarter.count(), 2, "backoff must extend the cooldown");
    }
}
