//! Consensus aggregation
//!
//! Fits a Beta distribution to the usable expert probabilities by the method
//! of moments. The fit is a pure function of the *set* of probabilities:
//! values are sorted before summing so arrival order never changes a bit of
//! the result.

use crate::config::ForecastConfig;
use crate::domain::ExpertOpinion;
use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};

/// Smallest shape parameter a fitted Beta may have
pub const MIN_SHAPE: f64 = 1e-3;

/// Means are kept this far away from 0 and 1 so both shapes stay positive
const MEAN_MARGIN: f64 = 1e-9;

/// Variance must stay strictly below m(1 - m) for the fit to exist
const VARIANCE_HEADROOM: f64 = 1.0 - 1e-6;

/// Beta summary of all usable opinions for one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consensus {
    pub alpha: f64,
    pub beta: f64,
    /// `alpha / (alpha + beta)`
    pub mean: f64,
    /// Variance of the fitted Beta
    pub variance: f64,
    /// Plain mean of the usable probabilities
    pub sample_mean: f64,
    /// Sample variance of the usable probabilities (0 for a single opinion)
    pub sample_variance: f64,
    /// Number of opinions that went into the fit
    pub used_count: usize,
    /// Consensus probability; equal to `mean`
    pub probability: f64,
}

impl Consensus {
    /// Standard deviation of the fitted Beta
    pub fn std_dev(&self) -> f64 {
        self.variance.sqrt()
    }
}

/// Combines expert opinions into a Beta consensus
#[derive(Debug, Clone, Copy)]
pub struct ConsensusAggregator {
    min_variance_floor: f64,
}

impl ConsensusAggregator {
    pub fn new(min_variance_floor: f64) -> Self {
        Self { min_variance_floor }
    }

    pub fn from_config(config: &ForecastConfig) -> Self {
        Self::new(config.min_variance_floor)
    }

    /// Fit a consensus from a request's opinions. Only opinions with status
    /// `ok` and a probability inside [0, 1] are used.
    pub fn aggregate(&self, opinions: &[ExpertOpinion]) -> Result<Consensus> {
        let probabilities: Vec<f64> = opinions
            .iter()
            .filter_map(ExpertOpinion::usable_probability)
            .collect();

        if probabilities.is_empty() {
            return Err(ForecastError::NoUsableOpinions {
                received: opinions.len(),
            });
        }

        self.fit(&probabilities)
    }

    /// Method-of-moments Beta fit over probabilities in [0, 1]
    pub fn fit(&self, probabilities: &[f64]) -> Result<Consensus> {
        if probabilities.is_empty() {
            return Err(ForecastError::NoUsableOpinions { received: 0 });
        }
        if let Some(bad) = probabilities.iter().find(|p| !(0.0..=1.0).contains(*p)) {
            return Err(ForecastError::Internal(format!(
                "probability {} outside [0, 1] reached the aggregator",
                bad
            )));
        }

        let mut sorted = probabilities.to_vec();
        sorted.sort_by(f64::total_cmp);

        let k = sorted.len();
        let sample_mean = sorted.iter().sum::<f64>() / k as f64;
        let sample_variance = if k > 1 {
            sorted
                .iter()
                .map(|p| (p - sample_mean).powi(2))
                .sum::<f64>()
                / (k - 1) as f64
        } else {
            0.0
        };

        let m = sample_mean.clamp(MEAN_MARGIN, 1.0 - MEAN_MARGIN);
        let max_variance = m * (1.0 - m) * VARIANCE_HEADROOM;
        let v = sample_variance.max(self.min_variance_floor).min(max_variance);

        let common = m * (1.0 - m) / v - 1.0;
        let mut alpha = m * common;
        let mut beta = (1.0 - m) * common;

        // Scale both shapes together so the mean is untouched
        let smallest = alpha.min(beta);
        if smallest < MIN_SHAPE {
            let scale = MIN_SHAPE / smallest;
            alpha *= scale;
            beta *= scale;
        }

        let total = alpha + beta;
        let mean = alpha / total;
        let variance = alpha * beta / (total * total * (total + 1.0));

        Ok(Consensus {
            alpha,
            beta,
            mean,
            variance,
            sample_mean,
            sample_variance,
            used_count: k,
            probability: mean,
        })
    }
}

impl Default for ConsensusAggregator {
    fn default() -> Self {
        Self::from_config(&ForecastConfig::default())
    }
}
