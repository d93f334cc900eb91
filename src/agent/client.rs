//! CLI estimator using subprocess communication
//!
//! Pipes the expert prompt to a local CLI (`claude --print` by default) and
//! returns its stdout. The child is killed when the call is dropped, so the
//! executor's per-call timeout and the overall deadline both reach it.

use crate::agent::prompt::{build_expert_prompt, DEFAULT_SYSTEM_PROMPT};
use crate::agent::Estimator;
use crate::config::EstimatorConfig;
use crate::domain::{EventContext, Side};
use crate::error::{ForecastError, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

/// Estimator backed by a local CLI process
pub struct CliEstimator {
    config: EstimatorConfig,
}

impl CliEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self { config }
    }

    /// Check if the CLI is available
    pub async fn check_availability(&self) -> Result<bool> {
        let output = Command::new(&self.config.cli_path)
            .arg("--version")
            .output()
            .await;

        match output {
            Ok(out) => {
                if out.status.success() {
                    let version = String::from_utf8_lossy(&out.stdout);
                    info!("Estimator CLI available: {}", version.trim());
                    Ok(true)
                } else {
                    warn!("Estimator CLI returned error status");
                    Ok(false)
                }
            }
            Err(e) => {
                error!("Estimator CLI not found at '{}': {}", self.config.cli_path, e);
                Ok(false)
            }
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.config.cli_path);
        cmd.arg("--print")
            .arg("--output-format")
            .arg("text")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(ref model) = self.config.model {
            cmd.arg("--model").arg(model);
        }

        let system_prompt = self
            .config
            .system_prompt
            .as_deref()
            .unwrap_or(DEFAULT_SYSTEM_PROMPT);
        cmd.arg("--system-prompt").arg(system_prompt);

        cmd
    }

    /// Run one prompt through the CLI and return raw stdout
    pub async fn run_prompt(&self, prompt: &str) -> Result<String> {
        debug!("Spawning estimator process");
        let mut child = self.command().spawn().map_err(|e| {
            ForecastError::Estimator(format!("Failed to spawn estimator process: {}", e))
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(prompt.as_bytes()).await.map_err(|e| {
                ForecastError::Estimator(format!("Failed to write to estimator stdin: {}", e))
            })?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ForecastError::Estimator(format!("Failed to get estimator output: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ForecastError::Estimator(format!(
                "Estimator process failed: {}",
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).to_string();
        debug!("Raw estimator response: {} chars", text.len());
        Ok(text)
    }
}

#[async_trait]
impl Estimator for CliEstimator {
    fn name(&self) -> &str {
        "cli"
    }

    async fn estimate(&self, event: &EventContext, target: Side, seed: u64) -> Result<String> {
        let prompt = build_expert_prompt(event, target, seed);
        self.run_prompt(&prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let estimator = CliEstimator::new(EstimatorConfig::default());
        assert_eq!(estimator.config.cli_path, "claude");
        assert_eq!(estimator.name(), "cli");
    }

    #[tokio::test]
    async fn test_missing_binary_is_estimator_error() {
        let config = EstimatorConfig {
            cli_path: "/nonexistent/panelcast-estimator".to_string(),
            ..EstimatorConfig::default()
        };
        let estimator = CliEstimator::new(config);

        assert!(!estimator.check_availability().await.unwrap());
        let err = estimator.run_prompt("hello").await.unwrap_err();
        assert!(matches!(err, ForecastError::Estimator(_)));
    }
}
