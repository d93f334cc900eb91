//! Odds conversions and expected value
//!
//! American odds: `+150` pays 150 on a 100 stake (underdog), `-150` needs a
//! 150 stake to win 100 (favorite). Odds strictly inside (-100, +100) do not
//! exist in American format and are rejected.

use crate::error::{ForecastError, Result};

/// Smallest decimal price accepted from an odds source
pub const MIN_DECIMAL_ODDS: f64 = 1.01;

fn check_american(odds: i32) -> Result<()> {
    if odds > -100 && odds < 100 {
        return Err(ForecastError::InvalidOddsFormat(format!(
            "American odds must be <= -100 or >= +100, got {}",
            odds
        )));
    }
    Ok(())
}

/// Market-implied probability of American odds
///
/// Underdog (`>= +100`): `100 / (odds + 100)`.
/// Favorite (`<= -100`): `|odds| / (|odds| + 100)`.
pub fn implied_probability(american_odds: i32) -> Result<f64> {
    check_american(american_odds)?;

    let odds = f64::from(american_odds);
    if american_odds >= 100 {
        Ok(100.0 / (odds + 100.0))
    } else {
        let abs = odds.abs();
        Ok(abs / (abs + 100.0))
    }
}

/// Convert American odds to decimal odds (stake included)
pub fn decimal_from_american(american_odds: i32) -> Result<f64> {
    check_american(american_odds)?;

    let odds = f64::from(american_odds);
    if american_odds >= 100 {
        Ok(1.0 + odds / 100.0)
    } else {
        Ok(1.0 + 100.0 / odds.abs())
    }
}

/// Market-implied probability of decimal odds
pub fn implied_from_decimal(decimal_odds: f64) -> Result<f64> {
    check_decimal(decimal_odds)?;
    Ok(1.0 / decimal_odds)
}

/// Validate a decimal price
pub fn check_decimal(decimal_odds: f64) -> Result<()> {
    if !decimal_odds.is_finite() || decimal_odds < MIN_DECIMAL_ODDS {
        return Err(ForecastError::InvalidOddsFormat(format!(
            "decimal odds must be finite and >= {}, got {}",
            MIN_DECIMAL_ODDS, decimal_odds
        )));
    }
    Ok(())
}

/// Expected value per unit staked: `probability * decimal_odds - 1`
pub fn expected_value(probability: f64, decimal_odds: f64) -> f64 {
    probability * decimal_odds - 1.0
}

/// Full-Kelly stake fraction for a bet with the given win probability.
///
/// Returns 0 when the bet has no positive expectation.
pub fn kelly_fraction(probability: f64, decimal_odds: f64) -> f64 {
    let net = decimal_odds - 1.0;
    if net <= 0.0 {
        return 0.0;
    }
    let ev = expected_value(probability, decimal_odds);
    if ev <= 0.0 {
        0.0
    } else {
        (ev / net).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_implied_probability_favorite() {
        let prob = implied_probability(-150).unwrap();
        assert!((prob - 0.6).abs() < 1e-12);

        let prob = implied_probability(-200).unwrap();
        assert!((prob - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_implied_probability_underdog() {
        let prob = implied_probability(150).unwrap();
        assert!((prob - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_even_money_boundaries() {
        assert_eq!(implied_probability(100).unwrap(), 0.5);
        assert_eq!(implied_probability(-100).unwrap(), 0.5);
        assert_eq!(decimal_from_american(100).unwrap(), 2.0);
        assert_eq!(decimal_from_american(-100).unwrap(), 2.0);
    }

    #[test]
    fn test_invalid_american_odds() {
        for odds in [-99, -1, 0, 1, 50, 99] {
            let err = implied_probability(odds).unwrap_err();
            assert!(matches!(err, ForecastError::InvalidOddsFormat(_)));
            assert!(decimal_from_american(odds).is_err());
        }
    }

    #[test]
    fn test_american_to_decimal() {
        assert!((decimal_from_american(150).unwrap() - 2.5).abs() < 1e-12);
        assert!((decimal_from_american(-150).unwrap() - (1.0 + 100.0 / 150.0)).abs() < 1e-12);
    }

    #[test]
    fn test_decimal_odds() {
        assert!((implied_from_decimal(2.5).unwrap() - 0.4).abs() < 1e-12);
        assert!(implied_from_decimal(1.0).is_err());
        assert!(implied_from_decimal(f64::NAN).is_err());
        assert!(implied_from_decimal(f64::INFINITY).is_err());
    }

    #[test]
    fn test_expected_value() {
        // Fair coin at even money has zero expectation
        assert_eq!(expected_value(0.5, 2.0), 0.0);
        assert!((expected_value(0.6, 2.0) - 0.2).abs() < 1e-12);
        assert!(expected_value(0.4, 2.0) < 0.0);
    }

    #[test]
    fn test_kelly_fraction() {
        // p=0.6 at even money: f = (0.6*2 - 1) / 1 = 0.2
        assert!((kelly_fraction(0.6, 2.0) - 0.2).abs() < 1e-12);
        assert_eq!(kelly_fraction(0.4, 2.0), 0.0);
        assert_eq!(kelly_fraction(0.9, 1.0), 0.0);
    }
}
