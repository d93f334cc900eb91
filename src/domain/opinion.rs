use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::event::Side;

/// Outcome of a single expert call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpinionStatus {
    Ok,
    ParseFailed,
    TimedOut,
    Errored,
}

impl OpinionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpinionStatus::Ok => "ok",
            OpinionStatus::ParseFailed => "parse_failed",
            OpinionStatus::TimedOut => "timed_out",
            OpinionStatus::Errored => "errored",
        }
    }
}

impl fmt::Display for OpinionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of one estimator call. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertOpinion {
    /// Position of the expert in the panel (0-based)
    pub expert_index: usize,
    /// Seed used to vary the prompt for this expert
    pub seed: u64,
    /// Side the probability refers to
    pub side: Side,
    /// Win probability for `side`; only set when `status == Ok`
    pub probability: Option<f64>,
    /// Self-reported confidence, when the expert gave one
    pub confidence: Option<f64>,
    /// Opaque rationale (or the failure description)
    pub rationale: String,
    #[serde(with = "duration_ms")]
    pub latency: Duration,
    pub status: OpinionStatus,
}

impl ExpertOpinion {
    pub fn ok(
        expert_index: usize,
        seed: u64,
        side: Side,
        probability: f64,
        confidence: Option<f64>,
        rationale: String,
        latency: Duration,
    ) -> Self {
        Self {
            expert_index,
            seed,
            side,
            probability: Some(probability),
            confidence,
            rationale,
            latency,
            status: OpinionStatus::Ok,
        }
    }

    pub fn failed(
        expert_index: usize,
        seed: u64,
        side: Side,
        status: OpinionStatus,
        reason: impl Into<String>,
        latency: Duration,
    ) -> Self {
        debug_assert!(status != OpinionStatus::Ok);
        Self {
            expert_index,
            seed,
            side,
            probability: None,
            confidence: None,
            rationale: reason.into(),
            latency,
            status,
        }
    }

    /// Probability usable for consensus: status ok and inside [0, 1]
    pub fn usable_probability(&self) -> Option<f64> {
        match (self.status, self.probability) {
            (OpinionStatus::Ok, Some(p)) if (0.0..=1.0).contains(&p) => Some(p),
            _ => None,
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
