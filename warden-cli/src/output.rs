//! Terminal rendering for status, alerts, and repair results.

use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use warden_common::{
    AlertSeverity, RepairResponse, ServiceAlert, ServiceReport, ServiceState, StatusReport,
};

#[derive(Tabled)]
struct ServiceRow {
    #[tabled(rename = "SERVICE")]
    name: String,
    #[tabled(rename = "STATE")]
    state: String,
    #[tabled(rename = "LATENCY")]
    latency: String,
    #[tabled(rename = "CODE")]
    code: String,
    #[tabled(rename = "UPTIME%")]
    uptime: String,
    #[tabled(rename = "CPU%")]
    cpu: String,
    #[tabled(rename = "MEM%")]
    mem: String,
    #[tabled(rename = "LAST CHECK")]
    last_check: String,
    #[tabled(rename = "ERROR")]
    error: String,
}

fn state_glyph(state: ServiceState, healthy: bool) -> &'static str {
    match state {
        ServiceState::Healthy => {
            if healthy {
                "✓ healthy"
            } else {
                "? healthy"
            }
        }
        ServiceState::Degraded => "⚠ degraded",
        ServiceState::Down => "✗ down",
        ServiceState::Recovering => "~ recovering",
    }
}

fn format_timestamp(unix: Option<u64>) -> String {
    match unix {
        Some(secs) => chrono::DateTime::from_timestamp(secs as i64, 0)
            .map(|dt| dt.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string()),
        None => "-".to_string(),
    }
}

fn service_row(name: &str, service: &ServiceReport, critical_marker: bool) -> ServiceRow {
    let name = if critical_marker && service.critical {
        format!("{} *", name)
    } else {
        name.to_string()
    };
    ServiceRow {
        name,
        state: state_glyph(service.state, service.healthy).to_string(),
        latency: service
            .response_time_ms
            .map(|ms| format!("{}ms", ms))
            .unwrap_or_else(|| "-".to_string()),
        code: service
            .status_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string()),
        uptime: format!("{:.1}", service.metrics.uptime_percent),
        cpu: format!("{:.1}", service.cpu),
        mem: format!("{:.1}", service.memory),
        last_check: format_timestamp(service.last_check),
        error: service.error.clone().unwrap_or_default(),
    }
}

pub fn print_status(report: &StatusReport, detailed: bool) {
    let summary = &report.summary;
    let score = format!("{:.1}%", summary.health_score);
    let score = if summary.unhealthy == 0 {
        score.green()
    } else if summary.healthy == 0 {
        score.red()
    } else {
        score.yellow()
    };
    println!(
        "Fleet health: {} ({}/{} services healthy)",
        score, summary.healthy, summary.total
    );
    println!("As of: {}", format_timestamp(Some(report.timestamp)));
    println!();

    let rows: Vec<ServiceRow> = report
        .services
        .iter()
        .map(|(name, service)| service_row(name, service, true))
        .collect();
    println!("{}", Table::new(rows).with(Style::sharp()));
    if report.services.values().any(|s| s.critical) {
        println!("  * critical service");
    }

    if detailed {
        println!();
        for (name, service) in &report.services {
            let m = &service.metrics;
            println!(
                "{}: {} checks, {} failures, success rate {:.1}%, avg latency {:.1}ms, \
                 failure streak {}, success streak {}",
                name,
                m.total_requests,
                m.total_failures,
                m.success_rate,
                m.avg_response_time_ms,
                m.failure_streak,
                m.success_streak,
            );
            if let Some(at) = service.last_remediation {
                let outcome = match service.last_remediation_ok {
                    Some(true) => "succeeded",
                    Some(false) => "failed",
                    None => "pending",
                };
                println!(
                    "  last restart attempt {} at {}",
                    outcome,
                    format_timestamp(Some(at))
                );
            }
        }
    }
}

pub fn print_service(name: &str, service: &ServiceReport) {
    println!("{}", Table::new(vec![service_row(name, service, false)]).with(Style::sharp()));
    let m = &service.metrics;
    println!(
        "{} checks total, {} failures, last failure: {}",
        m.total_requests,
        m.total_failures,
        format_timestamp(m.last_failure)
    );
    if service.critical {
        println!("{}", "critical service".red());
    }
}

pub fn print_alerts(alerts: &[ServiceAlert]) {
    if alerts.is_empty() {
        println!("No recent alerts");
        return;
    }
    for alert in alerts {
        let severity = match alert.severity {
            AlertSeverity::Critical => "CRIT".red(),
            AlertSeverity::Warning => "WARN".yellow(),
            AlertSeverity::Info => "INFO".green(),
        };
        println!(
            "{} {} [{}] {}",
            format_timestamp(Some(alert.timestamp)),
            severity,
            alert.service,
            alert.message
        );
    }
}

pub fn print_repair(response: &RepairResponse) {
    if response.attempted == 0 {
        println!("{}", "All services healthy, nothing to repair".green());
        return;
    }
    println!(
        "Repairs attempted: {}, succeeded: {}",
        response.attempted, response.succeeded
    );
    for failure in &response.failures {
        println!("  {} {}: {}", "✗".red(), failure.service, failure.error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glyphs_cover_all_states() {
        assert!(state_glyph(ServiceState::Down, false).contains("down"));
        assert!(state_glyph(ServiceState::Healthy, true).starts_with('✓'));
        assert!(state_glyph(ServiceState::Recovering, true).contains("recovering"));
        assert!(state_glyph(ServiceState::Degraded, false).contains("degraded"));
    }

    #[test]
    fn timestamps_render_or_dash() {
        assert_eq!(format_timestamp(None), "-");
        assert!(!format_timestamp(Some(1_700_000_000)).is_empty());
    }
}
