use crate::error::{ForecastError, Result};
use crate::odds;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the two sides of a binary event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// Side A (home)
    A,
    /// Side B (away)
    B,
}

impl Side {
    pub fn other(&self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::A => "A",
            Side::B => "B",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Side {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "a" | "home" => Ok(Side::A),
            "b" | "away" => Ok(Side::B),
            other => Err(ForecastError::InvalidEvent(format!("Unknown side: {}", other))),
        }
    }
}

/// Market odds for one side, American or decimal format
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", content = "value", rename_all = "snake_case")]
pub enum Odds {
    American(i32),
    Decimal(f64),
}

impl Odds {
    /// Validated American odds
    pub fn american(odds: i32) -> Result<Self> {
        odds::implied_probability(odds)?;
        Ok(Odds::American(odds))
    }

    /// Validated decimal odds
    pub fn decimal(odds: f64) -> Result<Self> {
        odds::check_decimal(odds)?;
        Ok(Odds::Decimal(odds))
    }

    pub fn validate(&self) -> Result<()> {
        match *self {
            Odds::American(o) => odds::implied_probability(o).map(|_| ()),
            Odds::Decimal(d) => odds::check_decimal(d),
        }
    }

    pub fn implied_probability(&self) -> Result<f64> {
        match *self {
            Odds::American(o) => odds::implied_probability(o),
            Odds::Decimal(d) => odds::implied_from_decimal(d),
        }
    }

    pub fn decimal_odds(&self) -> Result<f64> {
        match *self {
            Odds::American(o) => odds::decimal_from_american(o),
            Odds::Decimal(d) => odds::check_decimal(d).map(|_| d),
        }
    }
}

impl fmt::Display for Odds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Odds::American(o) if *o > 0 => write!(f, "+{}", o),
            Odds::American(o) => write!(f, "{}", o),
            Odds::Decimal(d) => write!(f, "{:.2}", d),
        }
    }
}

impl FromStr for Odds {
    type Err = ForecastError;

    /// `"-150"` / `"+130"` parse as American, anything with a decimal point
    /// (`"1.85"`) as decimal.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.contains('.') {
            let value: f64 = s
                .parse()
                .map_err(|_| ForecastError::InvalidOddsFormat(format!("Cannot parse odds: {}", s)))?;
            return Odds::decimal(value);
        }

        let value: i32 = s
            .trim_start_matches('+')
            .parse()
            .map_err(|_| ForecastError::InvalidOddsFormat(format!("Cannot parse odds: {}", s)))?;
        Odds::american(value)
    }
}

/// Immutable description of the event being forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventContext {
    side_a: String,
    side_b: String,
    odds_a: Odds,
    odds_b: Odds,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    league: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    venue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    notes: Option<String>,
}

impl EventContext {
    /// Create a validated event. Side names must be non-empty and distinct,
    /// odds must be well-formed.
    pub fn new(
        side_a: impl Into<String>,
        side_b: impl Into<String>,
        odds_a: Odds,
        odds_b: Odds,
    ) -> Result<Self> {
        let side_a = side_a.into().trim().to_string();
        let side_b = side_b.into().trim().to_string();

        if side_a.is_empty() || side_b.is_empty() {
            return Err(ForecastError::InvalidEvent("side names must not be empty".into()));
        }
        if side_a.eq_ignore_ascii_case(&side_b) {
            return Err(ForecastError::InvalidEvent(format!(
                "sides must be distinct, got '{}' twice",
                side_a
            )));
        }
        odds_a.validate()?;
        odds_b.validate()?;

        Ok(Self {
            side_a,
            side_b,
            odds_a,
            odds_b,
            league: None,
            venue: None,
            start_time: None,
            notes: None,
        })
    }

    pub fn with_league(mut self, league: impl Into<String>) -> Self {
        self.league = Some(league.into());
        self
    }

    pub fn with_venue(mut self, venue: impl Into<String>) -> Self {
        self.venue = Some(venue.into());
        self
    }

    pub fn with_start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = Some(start_time);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Re-check invariants, e.g. after deserializing from an untrusted payload
    pub fn validate(&self) -> Result<()> {
        Self::new(
            self.side_a.clone(),
            self.side_b.clone(),
            self.odds_a,
            self.odds_b,
        )
        .map(|_| ())
    }

    pub fn name(&self, side: Side) -> &str {
        match side {
            Side::A => &self.side_a,
            Side::B => &self.side_b,
        }
    }

    pub fn odds(&self, side: Side) -> Odds {
        match side {
            Side::A => self.odds_a,
            Side::B => self.odds_b,
        }
    }

    pub fn league(&self) -> Option<&str> {
        self.league.as_deref()
    }

    pub fn venue(&self) -> Option<&str> {
        self.venue.as_deref()
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    /// "Side A vs Side B"
    pub fn matchup(&self) -> String {
        format!("{} vs {}", self.side_a, self.side_b)
    }
}
