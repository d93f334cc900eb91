use thiserror::Error;
use uuid::Uuid;

/// Main error type for the forecasting engine
#[derive(Error, Debug)]
pub enum ForecastError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Input errors (rejected synchronously at submit)
    #[error("Invalid odds format: {0}")]
    InvalidOddsFormat(String),

    #[error("Invalid expert count: {requested} (allowed 1..={max})")]
    InvalidExpertCount { requested: usize, max: usize },

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    // Aggregation errors
    #[error("No usable opinions out of {received} received")]
    NoUsableOpinions { received: usize },

    // Request registry errors
    #[error("Forecast request not found: {0}")]
    RequestNotFound(Uuid),

    #[error("Forecast request not finished yet (state {state})")]
    NotReady { state: String },

    #[error("Forecast request already finished (state {state})")]
    AlreadyTerminal { state: String },

    // State machine errors
    #[error("Invalid state transition: from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // Estimator errors
    #[error("Estimator error: {0}")]
    Estimator(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    // CLI output helpers
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for ForecastError
pub type Result<T> = std::result::Result<T, ForecastError>;

impl ForecastError {
    /// Input errors never enter the request state machine.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            ForecastError::InvalidOddsFormat(_)
                | ForecastError::InvalidExpertCount { .. }
                | ForecastError::InvalidEvent(_)
        )
    }
}
