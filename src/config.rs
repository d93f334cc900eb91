use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub forecast: ForecastConfig,
    #[serde(default)]
    pub estimator: EstimatorConfig,
    #[serde(default)]
    pub odds_api: OddsApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Forecast engine knobs
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ForecastConfig {
    /// Experts queried when the caller does not pass a count
    #[serde(default = "default_expert_count")]
    pub expert_count_default: usize,
    /// Hard ceiling on experts per request
    #[serde(default = "default_max_expert_count")]
    pub max_expert_count: usize,
    /// Budget for a single expert call in milliseconds
    #[serde(default = "default_per_call_timeout")]
    pub per_call_timeout_ms: u64,
    /// Budget for the whole panel in milliseconds; outstanding calls are
    /// cancelled and recorded as timed out
    #[serde(default = "default_overall_deadline")]
    pub overall_deadline_ms: u64,
    /// Minimum |edge| before a bet is recommended (e.g., 0.02 = 2 points)
    #[serde(default = "default_edge_epsilon")]
    pub edge_epsilon: f64,
    /// Variance floor for the Beta fit (single opinion or identical opinions)
    #[serde(default = "default_min_variance_floor")]
    pub min_variance_floor: f64,
    /// Seconds a finished request stays retrievable
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    /// Poll cadence used by the CLI in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_expert_count() -> usize {
    5
}

fn default_max_expert_count() -> usize {
    30
}

fn default_per_call_timeout() -> u64 {
    45_000
}

fn default_overall_deadline() -> u64 {
    120_000
}

fn default_edge_epsilon() -> f64 {
    0.02
}

fn default_min_variance_floor() -> f64 {
    0.001
}

fn default_retention_secs() -> u64 {
    600
}

fn default_poll_interval() -> u64 {
    500
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            expert_count_default: default_expert_count(),
            max_expert_count: default_max_expert_count(),
            per_call_timeout_ms: default_per_call_timeout(),
            overall_deadline_ms: default_overall_deadline(),
            edge_epsilon: default_edge_epsilon(),
            min_variance_floor: default_min_variance_floor(),
            retention_secs: default_retention_secs(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl ForecastConfig {
    pub fn per_call_timeout(&self) -> Duration {
        Duration::from_millis(self.per_call_timeout_ms)
    }

    pub fn overall_deadline(&self) -> Duration {
        Duration::from_millis(self.overall_deadline_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.max_expert_count == 0 {
            errors.push("max_expert_count must be positive".to_string());
        }
        if self.expert_count_default == 0 || self.expert_count_default > self.max_expert_count {
            errors.push(format!(
                "expert_count_default must be between 1 and max_expert_count ({})",
                self.max_expert_count
            ));
        }
        if self.per_call_timeout_ms == 0 {
            errors.push("per_call_timeout_ms must be positive".to_string());
        }
        if self.overall_deadline_ms == 0 {
            errors.push("overall_deadline_ms must be positive".to_string());
        }
        if !(0.0..1.0).contains(&self.edge_epsilon) {
            errors.push("edge_epsilon must be in [0, 1)".to_string());
        }
        if !(self.min_variance_floor > 0.0 && self.min_variance_floor < 0.25) {
            errors.push("min_variance_floor must be in (0, 0.25)".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Which estimator backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimatorBackend {
    /// Local CLI subprocess (prompt on stdin, answer on stdout)
    Cli,
    /// OpenAI-compatible chat-completions endpoint
    Http,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EstimatorConfig {
    #[serde(default = "default_backend")]
    pub backend: EstimatorBackend,
    /// Path to the CLI executable
    #[serde(default = "default_cli_path")]
    pub cli_path: String,
    /// Model to use (backend specific)
    #[serde(default)]
    pub model: Option<String>,
    /// API base URL for the HTTP backend
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// API key for the HTTP backend
    #[serde(default)]
    pub api_key: String,
    /// Base sampling temperature; each expert jitters around it
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Overrides the built-in panel system prompt
    #[serde(default)]
    pub system_prompt: Option<String>,
}

fn default_backend() -> EstimatorBackend {
    EstimatorBackend::Cli
}

fn default_cli_path() -> String {
    "claude".to_string()
}

fn default_base_url() -> String {
    "https://api.x.ai/v1".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1000
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            cli_path: default_cli_path(),
            model: None,
            base_url: default_base_url(),
            api_key: String::new(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            system_prompt: None,
        }
    }
}

impl EstimatorConfig {
    pub fn is_configured(&self) -> bool {
        match self.backend {
            EstimatorBackend::Cli => !self.cli_path.is_empty(),
            EstimatorBackend::Http => !self.api_key.is_empty() && !self.base_url.is_empty(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OddsApiConfig {
    #[serde(default)]
    pub api_key: String,
    /// Bookmaker whose moneyline is used as the market baseline
    #[serde(default = "default_bookmaker")]
    pub bookmaker: String,
    #[serde(default = "default_region")]
    pub region: String,
}

fn default_bookmaker() -> String {
    "draftkings".to_string()
}

fn default_region() -> String {
    "us".to_string()
}

impl Default for OddsApiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            bookmaker: default_bookmaker(),
            region: default_region(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for daily rotated log files (disabled when unset)
    #[serde(default)]
    pub dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("PANELCAST_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (PANELCAST__FORECAST__EDGE_EPSILON, etc.)
            .add_source(
                Environment::with_prefix("PANELCAST")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = match self.forecast.validate() {
            Ok(()) => Vec::new(),
            Err(errors) => errors,
        };

        if !(0.0..=2.0).contains(&self.estimator.temperature) {
            errors.push("estimator.temperature must be in [0, 2]".to_string());
        }
        if self.estimator.max_tokens == 0 {
            errors.push("estimator.max_tokens must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            forecast: ForecastConfig::default(),
            estimator: EstimatorConfig::default(),
            odds_api: OddsApiConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_forecast_config_is_valid() {
        let config = ForecastConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.per_call_timeout(), Duration::from_secs(45));
        assert_eq!(config.edge_epsilon, 0.02);
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let config = ForecastConfig {
            expert_count_default: 0,
            overall_deadline_ms: 0,
            edge_epsilon: 1.5,
            min_variance_floor: 0.0,
            ..ForecastConfig::default()
        };
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn test_load_from_missing_dir_uses_defaults() {
        let config = AppConfig::load_from("/nonexistent/panelcast-config").unwrap();
        assert_eq!(config.forecast, ForecastConfig::default());
        assert_eq!(config.estimator.backend, EstimatorBackend::Cli);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_estimator_configured() {
        let mut config = EstimatorConfig::default();
        assert!(config.is_configured());
        config.backend = EstimatorBackend::Http;
        assert!(!config.is_configured());
        config.api_key = "key".to_string();
        assert!(config.is_configured());
    }
}
