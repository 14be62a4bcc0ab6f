//! The restart contract: an opaque, potentially slow external action.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use warden_common::{Result, WardenError};

#[async_trait]
pub trait RestartAction: Send + Sync {
    /// Ask the external service manager to restart `service`. Success
    /// means the command executed cleanly, not that the service came
    /// back — that is observed by the next probe cycle.
    async fn restart(&self, service: &str) -> Result<()>;
}

/// Runs a configurable argv, e.g. `["systemctl", "restart"]`. The
/// service name replaces a `{service}` placeholder when one is present,
/// otherwise it is appended as the final argument.
pub struct CommandRestarter {
    argv: Vec<String>,
}

impl CommandRestarter {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }

    fn build_argv(&self, service: &str) -> Vec<String> {
        let mut argv: Vec<String> = self
            .argv
            .iter()
            .map(|arg| arg.replace("{service}", service))
            .collect();
        if !self.argv.iter().any(|arg| arg.contains("{service}")) {
            argv.push(service.to_string());
        }
        argv
    }
}

#[async_trait]
impl RestartAction for CommandRestarter {
    async fn restart(&self, service: &str) -> Result<()> {
        let argv = self.build_argv(service);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| WardenError::Config("restart command is empty".to_string()))?;

        debug!(service, command = ?argv, "running restart command");
        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| WardenError::RestartFailed(format!("failed to run {}: {}", program, e)))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(WardenError::RestartFailed(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                stderr.trim()
            )))
        }
    }
}
