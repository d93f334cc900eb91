pub mod agent;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod forecast;
pub mod odds;

pub use agent::{build_estimator, ChatEstimator, CliEstimator, Estimator, OddsProvider, ResponseParser};
pub use config::AppConfig;
pub use domain::{
    EventContext, ExpertOpinion, FailureReason, Odds, OpinionStatus, RequestState, Side,
    StateTransition,
};
pub use error::{ForecastError, Result};
pub use forecast::{
    Consensus, ConsensusAggregator, ExpertPanelExecutor, ForecastOutcome, ForecastService,
    Recommendation, RecommendationEngine, RequestStatus, Verdict,
};
