//! Expert estimator integrations
//!
//! - `Estimator`: the collaborator contract every backend implements
//! - `client`: CLI subprocess backend (prompt on stdin, text on stdout)
//! - `chat`: OpenAI-compatible chat-completions backend over HTTP
//! - `parser`: probability extraction from free-form answers
//! - `odds_provider`: sportsbook odds source

pub mod chat;
pub mod client;
pub mod odds_provider;
pub mod parser;
pub mod prompt;

use crate::config::{EstimatorBackend, EstimatorConfig};
use crate::domain::{EventContext, Side};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub use chat::ChatEstimator;
pub use client::CliEstimator;
pub use odds_provider::{GameEvent, MatchupOdds, OddsProvider, OddsProviderConfig, Sport};
pub use parser::{ParseFailure, ParsedResponse, ResponseParser};

/// An independent, stochastic text-generating forecaster.
///
/// Output is untrusted: any text, any latency, any failure.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Estimator: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &str;

    /// Ask for the win probability of `target`. `seed` varies the phrasing.
    async fn estimate(&self, event: &EventContext, target: Side, seed: u64) -> Result<String>;
}

/// Build the configured estimator backend
pub fn build_estimator(config: &EstimatorConfig) -> Result<Arc<dyn Estimator>> {
    match config.backend {
        EstimatorBackend::Cli => Ok(Arc::new(CliEstimator::new(config.clone()))),
        EstimatorBackend::Http => Ok(Arc::new(ChatEstimator::new(config.clone())?)),
    }
}
