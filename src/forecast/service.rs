//! Forecast service
//!
//! Keyed registry of in-flight and finished requests. Each submitted
//! request gets its own driver task; the registry only holds the request
//! handle and the driver's abort handle.

use crate::agent::Estimator;
use crate::config::ForecastConfig;
use crate::domain::{EventContext, FailureReason, Side};
use crate::error::{ForecastError, Result};
use crate::forecast::executor::ExpertPanelExecutor;
use crate::forecast::lifecycle::{ForecastOutcome, ForecastRequest, RequestSnapshot, RequestStatus};
use config::ConfigError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, info, Instrument};
use uuid::Uuid;

struct Entry {
    request: Arc<ForecastRequest>,
    driver: AbortHandle,
}

/// Entry point for submitting and tracking forecasts
#[derive(Clone)]
pub struct ForecastService {
    estimator: Arc<dyn Estimator>,
    config: ForecastConfig,
    requests: Arc<RwLock<HashMap<Uuid, Entry>>>,
}

impl ForecastService {
    pub fn new(estimator: Arc<dyn Estimator>, config: ForecastConfig) -> Self {
        Self {
            estimator,
            config,
            requests: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Submit a forecast for side A of `event`
    pub async fn submit(
        &self,
        event: EventContext,
        expert_count: Option<usize>,
        config: Option<ForecastConfig>,
    ) -> Result<Uuid> {
        self.submit_for_side(event, Side::A, expert_count, config)
            .await
    }

    /// Submit a forecast for `target`. Input errors are returned here and
    /// never create a request.
    pub async fn submit_for_side(
        &self,
        event: EventContext,
        target: Side,
        expert_count: Option<usize>,
        config: Option<ForecastConfig>,
    ) -> Result<Uuid> {
        let config = config.unwrap_or_else(|| self.config.clone());
        config
            .validate()
            .map_err(|errors| ForecastError::Config(ConfigError::Message(errors.join("; "))))?;

        let requested = expert_count.unwrap_or(config.expert_count_default);
        let executor = ExpertPanelExecutor::from_config(Arc::clone(&self.estimator), &config);
        let request = Arc::new(ForecastRequest::new(event, target, requested, config)?);
        let id = request.id();

        info!(
            request_id = %id,
            matchup = %request.event().matchup(),
            target = %target,
            experts = requested,
            "forecast submitted"
        );

        // Register before the driver runs so a fast driver can never race the insert
        let mut requests = self.requests.write().await;
        let span = tracing::info_span!("forecast", request_id = %id);
        let driver = tokio::spawn(Arc::clone(&request).drive(executor).instrument(span));
        requests.insert(
            id,
            Entry {
                request,
                driver: driver.abort_handle(),
            },
        );

        Ok(id)
    }

    async fn get(&self, id: Uuid) -> Result<Arc<ForecastRequest>> {
        self.requests
            .read()
            .await
            .get(&id)
            .map(|e| Arc::clone(&e.request))
            .ok_or(ForecastError::RequestNotFound(id))
    }

    /// Non-blocking status
    pub async fn poll(&self, id: Uuid) -> Result<RequestStatus> {
        Ok(self.get(id).await?.status().await)
    }

    /// Partial opinions and transition history
    pub async fn snapshot(&self, id: Uuid) -> Result<RequestSnapshot> {
        Ok(self.get(id).await?.snapshot().await)
    }

    /// Terminal outcome. Repeated calls return the same value.
    pub async fn result(&self, id: Uuid) -> Result<Arc<ForecastOutcome>> {
        let request = self.get(id).await?;
        match request.outcome() {
            Some(outcome) => Ok(outcome),
            None => Err(ForecastError::NotReady {
                state: request.state().await.to_string(),
            }),
        }
    }

    /// Fail the request with reason `cancelled` and abort its expert calls.
    /// Returns without waiting for in-flight calls.
    pub async fn cancel(&self, id: Uuid) -> Result<()> {
        let (request, driver) = {
            let requests = self.requests.read().await;
            let entry = requests.get(&id).ok_or(ForecastError::RequestNotFound(id))?;
            (Arc::clone(&entry.request), entry.driver.clone())
        };

        request
            .fail(FailureReason::Cancelled, "cancelled by caller")
            .await?;
        driver.abort();

        info!(request_id = %id, "forecast cancelled");
        Ok(())
    }

    /// Cancel unless the request already finished. Returns whether the
    /// request was cancelled.
    pub async fn cancel_if_running(&self, id: Uuid) -> Result<bool> {
        match self.cancel(id).await {
            Ok(()) => Ok(true),
            Err(ForecastError::AlreadyTerminal { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Drop a finished request from the registry
    pub async fn release(&self, id: Uuid) -> Result<()> {
        let request = self.get(id).await?;
        let state = request.state().await;
        if !state.is_terminal() {
            return Err(ForecastError::NotReady {
                state: state.to_string(),
            });
        }

        self.requests.write().await.remove(&id);
        debug!(request_id = %id, "forecast released");
        Ok(())
    }

    /// Poll until the request is terminal, then return its outcome
    pub async fn wait(&self, id: Uuid) -> Result<Arc<ForecastOutcome>> {
        let interval = self.config.poll_interval();
        loop {
            let status = self.poll(id).await?;
            if status.state.is_terminal() {
                return self.result(id).await;
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// Number of requests currently held
    pub async fn len(&self) -> usize {
        self.requests.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Evict terminal requests finished longer than the retention period ago
    pub async fn evict_expired(&self) -> usize {
        let retention = self.config.retention();
        let now = Instant::now();

        let candidates: Vec<_> = self
            .requests
            .read()
            .await
            .iter()
            .map(|(id, e)| (*id, Arc::clone(&e.request)))
            .collect();

        let mut expired = Vec::new();
        for (id, request) in candidates {
            if let Some(finished_at) = request.finished_at().await {
                if now.duration_since(finished_at) >= retention {
                    expired.push(id);
                }
            }
        }

        if expired.is_empty() {
            return 0;
        }

        let mut requests = self.requests.write().await;
        for id in &expired {
            requests.remove(id);
        }
        debug!(evicted = expired.len(), "evicted expired forecasts");
        expired.len()
    }

    /// Background task that evicts expired requests
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let service = self.clone();
        let period = (self.config.retention() / 2).max(Duration::from_secs(1));

        tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                service.evict_expired().await;
            }
        })
    }
}
