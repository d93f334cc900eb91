//! Bet / no-bet decision against the market
//!
//! Edge is the consensus probability minus the market-implied probability
//! for the forecast side. The other side is priced from its own odds, so a
//! negative edge only turns into a bet on the other side when that side
//! clears the threshold too (bookmaker margin makes the two differ).

use crate::config::ForecastConfig;
use crate::domain::{EventContext, Side};
use crate::error::Result;
use crate::forecast::consensus::Consensus;
use crate::odds;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Three-way verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "bet_side_A")]
    BetSideA,
    #[serde(rename = "bet_side_B")]
    BetSideB,
    #[serde(rename = "no_bet")]
    NoBet,
}

impl Verdict {
    pub fn bet_on(side: Side) -> Self {
        match side {
            Side::A => Verdict::BetSideA,
            Side::B => Verdict::BetSideB,
        }
    }

    /// Side to back, if any
    pub fn side(&self) -> Option<Side> {
        match self {
            Verdict::BetSideA => Some(Side::A),
            Verdict::BetSideB => Some(Side::B),
            Verdict::NoBet => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::BetSideA => "bet_side_A",
            Verdict::BetSideB => "bet_side_B",
            Verdict::NoBet => "no_bet",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Market comparison for one side
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SidePricing {
    pub side: Side,
    /// Our probability for this side
    pub probability: f64,
    pub implied: f64,
    pub decimal_odds: f64,
    /// `probability - implied`
    pub edge: f64,
    pub expected_value: f64,
}

impl SidePricing {
    fn price(event: &EventContext, side: Side, probability: f64) -> Result<Self> {
        let market = event.odds(side);
        let implied = market.implied_probability()?;
        let decimal_odds = market.decimal_odds()?;

        Ok(Self {
            side,
            probability,
            implied,
            decimal_odds,
            edge: probability - implied,
            expected_value: odds::expected_value(probability, decimal_odds),
        })
    }
}

/// Decision plus every number it was derived from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Side the consensus probability refers to
    pub side: Side,
    pub implied: f64,
    pub edge: f64,
    pub expected_value: f64,
    pub verdict: Verdict,
    /// Pricing for the opposite side
    pub counter: SidePricing,
    /// Full-Kelly stake fraction for the recommended side (0 for no_bet)
    pub kelly_fraction: f64,
    /// Threshold the verdict was taken at
    pub edge_epsilon: f64,
}

impl Recommendation {
    pub fn is_bet(&self) -> bool {
        self.verdict != Verdict::NoBet
    }
}

/// Turns a consensus into a verdict against the event's odds
#[derive(Debug, Clone, Copy)]
pub struct RecommendationEngine {
    edge_epsilon: f64,
}

impl RecommendationEngine {
    pub fn new(edge_epsilon: f64) -> Self {
        Self { edge_epsilon }
    }

    pub fn from_config(config: &ForecastConfig) -> Self {
        Self::new(config.edge_epsilon)
    }

    pub fn edge_epsilon(&self) -> f64 {
        self.edge_epsilon
    }

    /// Price `consensus` (a probability for `side`) against the market
    pub fn recommend(
        &self,
        consensus: &Consensus,
        event: &EventContext,
        side: Side,
    ) -> Result<Recommendation> {
        let primary = SidePricing::price(event, side, consensus.mean)?;
        let counter = SidePricing::price(event, side.other(), 1.0 - consensus.mean)?;

        let (verdict, kelly_fraction) = if primary.edge > self.edge_epsilon {
            (
                Verdict::bet_on(side),
                odds::kelly_fraction(primary.probability, primary.decimal_odds),
            )
        } else if primary.edge < -self.edge_epsilon && counter.edge > self.edge_epsilon {
            (
                Verdict::bet_on(side.other()),
                odds::kelly_fraction(counter.probability, counter.decimal_odds),
            )
        } else {
            (Verdict::NoBet, 0.0)
        };

        Ok(Recommendation {
            side,
            implied: primary.implied,
            edge: primary.edge,
            expected_value: primary.expected_value,
            verdict,
            counter,
            kelly_fraction,
            edge_epsilon: self.edge_epsilon,
        })
    }
}

impl Default for RecommendationEngine {
    fn default() -> Self {
        Self::from_config(&ForecastConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Odds;
    use crate::forecast::consensus::ConsensusAggregator;

    fn event(odds_a: Odds, odds_b: Odds) -> EventContext {
        EventContext::new("Lakers", "Celtics", odds_a, odds_b).unwrap()
    }

    fn consensus(ps: &[f64]) -> Consensus {
        ConsensusAggregator::new(0.001).fit(ps).unwrap()
    }

    #[test]
    fn test_small_negative_edge_is_no_bet() {
        let e = event(Odds::American(-150), Odds::American(130));
        let rec = RecommendationEngine::new(0.02)
            .recommend(&consensus(&[0.55, 0.60, 0.58]), &e, Side::A)
            .unwrap();

        assert!((rec.implied - 0.6).abs() < 1e-9);
        assert!((rec.edge + 0.023_333).abs() < 1e-4);
        assert_eq!(rec.verdict, Verdict::NoBet);
        assert_eq!(rec.kelly_fraction, 0.0);
        assert!(rec.counter.edge < 0.02);
    }

    #[test]
    fn test_clear_edge_bets_forecast_side() {
        let e = event(Odds::American(-150), Odds::American(130));
        let rec = RecommendationEngine::new(0.02)
            .recommend(&consensus(&[0.70, 0.72, 0.69]), &e, Side::A)
            .unwrap();

        assert!((rec.edge - 0.103_333).abs() < 1e-4);
        assert_eq!(rec.verdict, Verdict::BetSideA);
        // 0.7033 * (1 + 100/150) - 1
        assert!((rec.expected_value - 0.172_222).abs() < 1e-4);
        assert!(rec.kelly_fraction > 0.0 && rec.kelly_fraction < 1.0);
    }

    #[test]
    fn test_negative_edge_bets_other_side_without_vig() {
        let e = event(Odds::American(-150), Odds::American(150));
        let rec = RecommendationEngine::new(0.02)
            .recommend(&consensus(&[0.50, 0.52]), &e, Side::A)
            .unwrap();

        assert!(rec.edge < -0.02);
        assert!((rec.counter.edge + rec.edge).abs() < 1e-9);
        assert_eq!(rec.verdict, Verdict::BetSideB);
        assert_eq!(rec.verdict.side(), Some(Side::B));
        assert!(rec.kelly_fraction > 0.0);
    }

    #[test]
    fn test_forecast_for_side_b() {
        let e = event(Odds::Decimal(1.5), Odds::Decimal(3.0));
        let rec = RecommendationEngine::new(0.02)
            .recommend(&consensus(&[0.45]), &e, Side::B)
            .unwrap();

        assert!((rec.implied - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(rec.verdict, Verdict::BetSideB);
        assert!((rec.expected_value - 0.35).abs() < 1e-9);
    }

    #[test]
    fn test_verdict_serialization() {
        assert_eq!(serde_json::to_string(&Verdict::BetSideA).unwrap(), "\"bet_side_A\"");
        assert_eq!(serde_json::to_string(&Verdict::NoBet).unwrap(), "\"no_bet\"");
        assert_eq!(Verdict::BetSideB.to_string(), "bet_side_B");
    }
}
