//! Supervisor configuration: loaded once at startup, immutable afterwards.

use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, WardenError};

/// One monitored service. The set is fixed for the process lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Unique key for the service across every subsystem.
    pub name: String,
    /// Base URL, e.g. "http://127.0.0.1:8080".
    pub endpoint: String,
    #[serde(default = "default_health_path")]
    pub health_path: String,
    /// Severity hint for operators; does not change remediation mechanics.
    #[serde(default)]
    pub critical: bool,
    /// Probe timeout in milliseconds; 0 means the global default.
    #[serde(default)]
    pub max_response_time_ms: u64,
    /// Consecutive failures before the service is declared down.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Consecutive successes before a down service is declared recovered.
    #[serde(default = "default_recovery_threshold")]
    pub recovery_threshold: u32,
    /// Command-line substring used to locate the backing OS process for
    /// resource sampling. Defaults to the service name.
    #[serde(default)]
    pub process_name: Option<String>,
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_recovery_threshold() -> u32 {
    2
}

impl ServiceSpec {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            health_path: default_health_path(),
            critical: false,
            max_response_time_ms: 0,
            failure_threshold: default_failure_threshold(),
            recovery_threshold: default_recovery_threshold(),
            process_name: None,
        }
    }

    /// Full URL of the health endpoint.
    pub fn health_url(&self) -> String {
        format!(
            "{}{}",
            self.endpoint.trim_end_matches('/'),
            self.health_path
        )
    }

    /// Per-service probe timeout, falling back to the supervisor default.
    pub fn timeout(&self, default: Duration) -> Duration {
        if self.max_response_time_ms == 0 {
            default
        } else {
            Duration::from_millis(self.max_response_time_ms)
        }
    }

    /// Pattern used to match the backing process command line.
    pub fn process_pattern(&self) -> &str {
        self.process_name.as_deref().unwrap_or(&self.name)
    }
}

/// Supervisor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub bind_address: IpAddr,
    pub http_port: u16,

    // Probe cycle
    pub probe_interval_secs: u64,
    pub default_timeout_ms: u64,
    pub history_size: usize,

    // Remediation
    pub auto_repair: bool,
    pub alert_cooldown_secs: u64,
    /// Cooldown multiplier applied per consecutive restart of the same
    /// unresolved episode chain. 1.0 keeps the cooldown flat.
    pub cooldown_backoff: f64,
    pub max_cooldown_secs: u64,
    /// Restart argv; the service name is appended unless some argument
    /// contains a "{service}" placeholder.
    pub restart_command: Vec<String>,

    pub services: Vec<ServiceSpec>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            http_port: 9600,
            probe_interval_secs: 10,
            default_timeout_ms: 5000,
            history_size: 100,
            auto_repair: true,
            alert_cooldown_secs: 300,
            cooldown_backoff: 1.0,
            max_cooldown_secs: 3600,
            restart_command: vec!["systemctl".to_string(), "restart".to_string()],
            services: Vec::new(),
        }
    }
}

impl SupervisorConfig {
    /// Load from a TOML file, falling back to defaults when the file is
    /// missing. Parse errors are fatal.
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let settings = ::config::Config::builder()
                .add_source(::config::File::from(path).format(::config::FileFormat::Toml))
                .build()
                .map_err(|e| WardenError::Config(e.to_string()))?;

            settings
                .try_deserialize()
                .map_err(|e| WardenError::Config(e.to_string()))
        } else {
            info!("Configuration file not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Startup validation. Failures here are the only fatal error class.
    pub fn validate(&self) -> Result<()> {
        if self.probe_interval_secs == 0 {
            return Err(WardenError::Config(
                "probe_interval_secs must be nonzero".to_string(),
            ));
        }
        if self.default_timeout_ms == 0 {
            return Err(WardenError::Config(
                "default_timeout_ms must be nonzero".to_string(),
            ));
        }
        if self.history_size == 0 {
            return Err(WardenError::Config(
                "history_size must be nonzero".to_string(),
            ));
        }
        if self.cooldown_backoff < 1.0 {
            return Err(WardenError::Config(
                "cooldown_backoff must be >= 1.0".to_string(),
            ));
        }
        if self.restart_command.is_empty() {
            return Err(WardenError::Config(
                "restart_command must not be empty".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for spec in &self.services {
            if spec.name.is_empty() {
                return Err(WardenError::Config(
                    "service name must not be empty".to_string(),
                ));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(WardenError::Config(format!(
                    "duplicate service name: {}",
                    spec.name
                )));
            }
            if spec.endpoint.is_empty() {
                return Err(WardenError::Config(format!(
                    "service {} has an empty endpoint",
                    spec.name
                )));
            }
            if spec.failure_threshold == 0 {
                return Err(WardenError::Config(format!(
                    "service {} failure_threshold must be >= 1",
                    spec.name
                )));
            }
            if spec.recovery_threshold == 0 {
                return Err(WardenError::Config(format!(
                    "service {} recovery_threshold must be >= 1",
                    spec.name
                )));
            }
        }

        Ok(())
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.alert_cooldown_secs)
    }

    pub fn max_cooldown(&self) -> Duration {
        Duration::from_secs(self.max_cooldown_secs)
    }

    pub fn service(&self, name: &str) -> Option<&ServiceSpec> {
        self.services.iter().find(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = SupervisorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.http_port, 9600);
        assert_eq!(config.alert_cooldown_secs, 300);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = SupervisorConfig::load(Path::new("/nonexistent/warden.toml")).unwrap();
        assert_eq!(config.probe_interval_secs, 10);
        assert!(config.services.is_empty());
    }

    #[test]
    fn loads_services_from_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
probe_interval_secs = 5

[[services]]
name = "arbitrage-engine"
endpoint = "http://127.0.0.1:8001"
critical = true
failure_threshold = 2

[[services]]
name = "market-data"
endpoint = "http://127.0.0.1:8002"
health_path = "/healthz"
"#
        )
        .unwrap();

        let config = SupervisorConfig::load(file.path()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.probe_interval_secs, 5);
        assert_eq!(config.services.len(), 2);

        let engine = config.service("arbitrage-engine").unwrap();
        assert!(engine.critical);
        assert_eq!(engine.failure_threshold, 2);
        assert_eq!(engine.recovery_threshold, 2);
        assert_eq!(engine.health_url(), "http://127.0.0.1:8001/health");

        let md = config.service("market-data").unwrap();
        assert_eq!(md.health_url(), "http://127.0.0.1:8002/healthz");
    }

    #[test]
    fn duplicate_service_names_rejected() {
        let mut config = SupervisorConfig::default();
        config.services = vec![
            ServiceSpec::new("gateway", "http://127.0.0.1:1"),
            ServiceSpec::new("gateway", "http://127.0.0.1:2"),
        ];
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_thresholds_rejected() {
        let mut config = SupervisorConfig::default();
        let mut spec = ServiceSpec::new("gateway", "http://127.0.0.1:1");
        spec.failure_threshold = 0;
        config.services = vec![spec];
        assert!(config.validate().is_err());
    }

    #[test]
    fn per_service_timeout_falls_back() {
        let default = Duration::from_millis(5000);
        let mut spec = ServiceSpec::new("gateway", "http://127.0.0.1:1");
        assert_eq!(spec.timeout(default), default);
        spec.max_response_time_ms = 250;
        assert_eq!(spec.timeout(default), Duration::from_millis(250));
    }
}
