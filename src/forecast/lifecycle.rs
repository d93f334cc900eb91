//! Forecast request lifecycle
//!
//! A `ForecastRequest` is owned by exactly one driver task. The driver walks
//! the request through `Created → Dispatched → Collecting → Aggregating →
//! Completed`, or into `Failed` from any non-terminal state. Opinions are
//! appended only by the driver; readers take short read locks for
//! snapshots. The terminal outcome is written once into a `OnceLock`, so
//! finished requests are read without locking.

use crate::config::ForecastConfig;
use crate::domain::{
    EventContext, ExpertOpinion, FailureReason, RequestState, Side, StateTransition,
};
use crate::error::{ForecastError, Result};
use crate::forecast::consensus::{Consensus, ConsensusAggregator};
use crate::forecast::executor::ExpertPanelExecutor;
use crate::forecast::recommendation::{Recommendation, RecommendationEngine};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use tokio::sync::{mpsc, RwLock};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Terminal result of a request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ForecastOutcome {
    Completed {
        consensus: Consensus,
        recommendation: Recommendation,
        opinions: Vec<ExpertOpinion>,
    },
    Failed {
        reason: FailureReason,
        detail: String,
        /// Partial opinions, for diagnostics only
        opinions: Vec<ExpertOpinion>,
    },
}

impl ForecastOutcome {
    pub fn state(&self) -> RequestState {
        match self {
            ForecastOutcome::Completed { .. } => RequestState::Completed,
            ForecastOutcome::Failed { .. } => RequestState::Failed,
        }
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            ForecastOutcome::Completed { .. } => None,
            ForecastOutcome::Failed { reason, .. } => Some(*reason),
        }
    }

    pub fn consensus(&self) -> Option<&Consensus> {
        match self {
            ForecastOutcome::Completed { consensus, .. } => Some(consensus),
            ForecastOutcome::Failed { .. } => None,
        }
    }

    pub fn recommendation(&self) -> Option<&Recommendation> {
        match self {
            ForecastOutcome::Completed { recommendation, .. } => Some(recommendation),
            ForecastOutcome::Failed { .. } => None,
        }
    }

    pub fn opinions(&self) -> &[ExpertOpinion] {
        match self {
            ForecastOutcome::Completed { opinions, .. } | ForecastOutcome::Failed { opinions, .. } => {
                opinions
            }
        }
    }
}

/// Mutable part of a request, guarded by the request's lock
#[derive(Debug)]
struct Progress {
    state: RequestState,
    opinions: Vec<ExpertOpinion>,
    transitions: Vec<StateTransition>,
    finished_at: Option<Instant>,
}

/// Cheap status view for pollers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestStatus {
    pub id: Uuid,
    pub state: RequestState,
    pub received_count: usize,
    pub requested_count: usize,
    pub failure: Option<FailureReason>,
}

/// Full view including partial opinions and transition history
#[derive(Debug, Clone, Serialize)]
pub struct RequestSnapshot {
    pub id: Uuid,
    pub state: RequestState,
    pub target: Side,
    pub requested_count: usize,
    pub opinions: Vec<ExpertOpinion>,
    pub transitions: Vec<StateTransition>,
    pub created_at: DateTime<Utc>,
}

/// The unit of work
#[derive(Debug)]
pub struct ForecastRequest {
    id: Uuid,
    event: Arc<EventContext>,
    target: Side,
    requested: usize,
    config: ForecastConfig,
    created_at: DateTime<Utc>,
    progress: RwLock<Progress>,
    outcome: OnceLock<Arc<ForecastOutcome>>,
}

impl ForecastRequest {
    /// Validate inputs and create a request in `Created`
    pub fn new(
        event: EventContext,
        target: Side,
        requested: usize,
        config: ForecastConfig,
    ) -> Result<Self> {
        event.validate()?;
        if requested == 0 || requested > config.max_expert_count {
            return Err(ForecastError::InvalidExpertCount {
                requested,
                max: config.max_expert_count,
            });
        }

        Ok(Self {
            id: Uuid::new_v4(),
            event: Arc::new(event),
            target,
            requested,
            config,
            created_at: Utc::now(),
            progress: RwLock::new(Progress {
                state: RequestState::Created,
                opinions: Vec::with_capacity(requested),
                transitions: Vec::new(),
                finished_at: None,
            }),
            outcome: OnceLock::new(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn event(&self) -> &EventContext {
        &self.event
    }

    pub fn target(&self) -> Side {
        self.target
    }

    pub fn requested_count(&self) -> usize {
        self.requested
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Terminal outcome; lock-free once set
    pub fn outcome(&self) -> Option<Arc<ForecastOutcome>> {
        self.outcome.get().cloned()
    }

    pub async fn state(&self) -> RequestState {
        self.progress.read().await.state
    }

    pub async fn status(&self) -> RequestStatus {
        let progress = self.progress.read().await;
        RequestStatus {
            id: self.id,
            state: progress.state,
            received_count: progress.opinions.len(),
            requested_count: self.requested,
            failure: self.outcome.get().and_then(|o| o.failure_reason()),
        }
    }

    pub async fn snapshot(&self) -> RequestSnapshot {
        let progress = self.progress.read().await;
        RequestSnapshot {
            id: self.id,
            state: progress.state,
            target: self.target,
            requested_count: self.requested,
            opinions: progress.opinions.clone(),
            transitions: progress.transitions.clone(),
            created_at: self.created_at,
        }
    }

    /// When the request reached a terminal state
    pub async fn finished_at(&self) -> Option<Instant> {
        self.progress.read().await.finished_at
    }

    async fn transition(&self, to: RequestState, reason: &str) -> Result<()> {
        let mut progress = self.progress.write().await;
        let from = progress.state;

        if !from.can_transition_to(to) {
            return Err(ForecastError::InvalidStateTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        debug!(request_id = %self.id, %from, %to, reason, "state transition");
        progress.transitions.push(StateTransition::new(from, to, reason));
        progress.state = to;
        Ok(())
    }

    /// Append one opinion; never beyond the requested count, never after
    /// the request is frozen
    async fn record(&self, opinion: ExpertOpinion) {
        let mut progress = self.progress.write().await;
        if progress.state.is_terminal() || progress.opinions.len() >= self.requested {
            return;
        }
        progress.opinions.push(opinion);
    }

    /// Freeze the request with a terminal outcome. `build` sees the opinions
    /// recorded so far under the same write lock that freezes the request.
    async fn finish<F>(&self, to: RequestState, reason: &str, build: F) -> Result<()>
    where
        F: FnOnce(&[ExpertOpinion]) -> ForecastOutcome,
    {
        let mut progress = self.progress.write().await;
        let from = progress.state;

        if from.is_terminal() {
            return Err(ForecastError::AlreadyTerminal {
                state: from.to_string(),
            });
        }
        if !from.can_transition_to(to) {
            return Err(ForecastError::InvalidStateTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let outcome = build(&progress.opinions);
        debug_assert_eq!(outcome.state(), to);
        self.outcome
            .set(Arc::new(outcome))
            .map_err(|_| ForecastError::Internal("outcome already recorded".to_string()))?;
        progress.transitions.push(StateTransition::new(from, to, reason));
        progress.state = to;
        progress.finished_at = Some(Instant::now());
        Ok(())
    }

    /// Move to `Failed`, keeping whatever opinions arrived so far
    pub async fn fail(&self, reason: FailureReason, detail: impl Into<String>) -> Result<()> {
        let detail = detail.into();
        self.finish(RequestState::Failed, &detail, |recorded| ForecastOutcome::Failed {
            reason,
            detail: detail.clone(),
            opinions: recorded.to_vec(),
        })
        .await
    }

    /// Drive the request to a terminal state. Runs on its own task.
    pub async fn drive(self: Arc<Self>, executor: ExpertPanelExecutor) {
        if let Err(e) = self.run(executor).await {
            if self.state().await.is_terminal() {
                debug!(request_id = %self.id, error = %e, "driver stopped after request was frozen");
                return;
            }
            error!(request_id = %self.id, error = %e, "forecast driver failed");
            if let Err(e) = self.fail(FailureReason::InternalError, e.to_string()).await {
                warn!(request_id = %self.id, error = %e, "could not mark request failed");
            }
        }
    }

    async fn run(&self, executor: ExpertPanelExecutor) -> Result<()> {
        self.transition(RequestState::Dispatched, "expert panel dispatched")
            .await?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let panel = executor.run(Arc::clone(&self.event), self.target, self.requested, Some(tx));

        self.transition(RequestState::Collecting, "collecting opinions")
            .await?;

        let collect = async {
            while let Some(opinion) = rx.recv().await {
                self.record(opinion).await;
            }
        };
        let (opinions, ()) = tokio::join!(panel, collect);

        self.transition(RequestState::Aggregating, "panel settled").await?;

        let consensus = match ConsensusAggregator::from_config(&self.config).aggregate(&opinions) {
            Ok(consensus) => consensus,
            Err(e @ ForecastError::NoUsableOpinions { .. }) => {
                warn!(request_id = %self.id, "no usable opinions");
                return self.fail(FailureReason::NoUsableOpinions, e.to_string()).await;
            }
            Err(e) => {
                return self.fail(FailureReason::InternalError, e.to_string()).await;
            }
        };

        let recommendation = match RecommendationEngine::from_config(&self.config).recommend(
            &consensus,
            &self.event,
            self.target,
        ) {
            Ok(recommendation) => recommendation,
            Err(e) => {
                return self.fail(FailureReason::InvalidInput, e.to_string()).await;
            }
        };

        info!(
            request_id = %self.id,
            used = consensus.used_count,
            mean = consensus.mean,
            edge = recommendation.edge,
            verdict = %recommendation.verdict,
            "forecast completed"
        );

        self.finish(
            RequestState::Completed,
            "consensus and recommendation attached",
            |_| ForecastOutcome::Completed {
                consensus,
                recommendation,
                opinions,
            },
        )
        .await
    }
}
