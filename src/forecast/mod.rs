//! Forecasting pipeline
//!
//! - `executor`: concurrent expert panel with per-call and overall deadlines
//! - `consensus`: Beta fit over usable opinions
//! - `recommendation`: edge, expected value and verdict against the market
//! - `lifecycle`: request state machine and its driver
//! - `service`: submit / poll / result / cancel registry

pub mod consensus;
pub mod executor;
pub mod lifecycle;
pub mod recommendation;
pub mod service;

pub use consensus::{Consensus, ConsensusAggregator};
pub use executor::ExpertPanelExecutor;
pub use lifecycle::{ForecastOutcome, ForecastRequest, RequestSnapshot, RequestStatus};
pub use recommendation::{Recommendation, RecommendationEngine, SidePricing, Verdict};
pub use service::ForecastService;
