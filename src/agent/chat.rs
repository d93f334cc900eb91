//! Chat-completions estimator
//!
//! Works against any OpenAI-compatible `/chat/completions` endpoint (xAI,
//! OpenAI, local gateways). Each expert samples at a temperature jittered
//! by its seed.

use crate::agent::prompt::{build_expert_prompt, DEFAULT_SYSTEM_PROMPT};
use crate::agent::Estimator;
use crate::config::EstimatorConfig;
use crate::domain::{EventContext, Side};
use crate::error::{ForecastError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const DEFAULT_MODEL: &str = "grok-4-1-fast-reasoning";

/// Chat API message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Chat API request
#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
}

/// Chat API response
#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Estimator backed by an HTTP chat-completions API
pub struct ChatEstimator {
    config: EstimatorConfig,
    http: Client,
}

impl ChatEstimator {
    /// Create a new chat estimator. The client has no request timeout of its
    /// own; the panel executor owns the per-call budget.
    pub fn new(config: EstimatorConfig) -> Result<Self> {
        let http = Client::builder()
            .build()
            .map_err(|e| ForecastError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, http })
    }

    /// Check if client is properly configured
    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    fn model(&self) -> String {
        self.config
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string())
    }

    /// Spread experts over +/-0.2 around the configured temperature
    fn temperature_for(&self, seed: u64) -> f32 {
        let jitter = ((seed % 41) as f32 - 20.0) / 100.0;
        (self.config.temperature + jitter).clamp(0.0, 2.0)
    }

    /// Send a chat message and return the first choice's content
    pub async fn chat(&self, prompt: &str, seed: u64) -> Result<String> {
        if !self.is_configured() {
            return Err(ForecastError::Estimator(
                "Chat estimator API key not configured".to_string(),
            ));
        }

        debug!("Sending request to chat API");

        let system_prompt = self
            .config
            .system_prompt
            .as_deref()
            .unwrap_or(DEFAULT_SYSTEM_PROMPT);

        let request = ChatRequest {
            model: self.model(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_prompt.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature: Some(self.temperature_for(seed)),
            max_tokens: Some(self.config.max_tokens),
            seed: Some(seed),
        };

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Chat API error: {} - {}", status, body);
            return Err(ForecastError::Estimator(format!(
                "Chat API error: {} - {}",
                status, body
            )));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| ForecastError::Estimator(format!("Failed to parse chat response: {}", e)))?;

        let content = chat_response
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .unwrap_or_default();

        debug!("Chat response received: {} chars", content.len());
        Ok(content)
    }
}

#[async_trait]
impl Estimator for ChatEstimator {
    fn name(&self) -> &str {
        "http"
    }

    async fn estimate(&self, event: &EventContext, target: Side, seed: u64) -> Result<String> {
        let prompt = build_expert_prompt(event, target, seed);
        self.chat(&prompt, seed).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EstimatorBackend;

    fn config() -> EstimatorConfig {
        EstimatorConfig {
            backend: EstimatorBackend::Http,
            ..EstimatorConfig::default()
        }
    }

    #[test]
    fn test_temperature_jitter_bounded() {
        let estimator = ChatEstimator::new(config()).unwrap();
        for seed in 0..200 {
            let t = estimator.temperature_for(seed);
            assert!((0.5..=0.9).contains(&t), "temperature {} out of band", t);
        }
        assert_ne!(estimator.temperature_for(1), estimator.temperature_for(2));
    }

    #[test]
    fn test_default_model() {
        let estimator = ChatEstimator::new(config()).unwrap();
        assert_eq!(estimator.model(), DEFAULT_MODEL);
    }

    #[tokio::test]
    async fn test_unconfigured_key_is_rejected() {
        let estimator = ChatEstimator::new(config()).unwrap();
        let err = estimator.chat("hello", 1).await.unwrap_err();
        assert!(matches!(err, ForecastError::Estimator(_)));
    }

    #[test]
    fn test_request_serialization() {
        let request = ChatRequest {
            model: "m".to_string(),
            messages: vec![],
            temperature: None,
            max_tokens: Some(10),
            seed: Some(42),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("temperature").is_none());
        assert_eq!(json["seed"], 42);
    }
}
