// The Odds API integration
// Fetches sportsbook moneylines so a forecast can be priced against the market

use crate::config::OddsApiConfig;
use crate::domain::{EventContext, Odds};
use crate::error::{ForecastError, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

const THE_ODDS_API_BASE: &str = "https://api.the-odds-api.com/v4";

/// Supported sports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sport {
    #[serde(rename = "basketball_nba")]
    NBA,
    #[serde(rename = "americanfootball_nfl")]
    NFL,
    #[serde(rename = "icehockey_nhl")]
    NHL,
    #[serde(rename = "baseball_mlb")]
    MLB,
    #[serde(rename = "basketball_ncaab")]
    NCAAB,
    #[serde(rename = "americanfootball_ncaaf")]
    NCAAF,
}

impl Sport {
    pub fn api_key(&self) -> &'static str {
        match self {
            Sport::NBA => "basketball_nba",
            Sport::NFL => "americanfootball_nfl",
            Sport::NHL => "icehockey_nhl",
            Sport::MLB => "baseball_mlb",
            Sport::NCAAB => "basketball_ncaab",
            Sport::NCAAF => "americanfootball_ncaaf",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Sport::NBA => "NBA",
            Sport::NFL => "NFL",
            Sport::NHL => "NHL",
            Sport::MLB => "MLB",
            Sport::NCAAB => "College Basketball",
            Sport::NCAAF => "College Football",
        }
    }
}

impl fmt::Display for Sport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for Sport {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "nba" | "basketball_nba" => Ok(Sport::NBA),
            "nfl" | "americanfootball_nfl" => Ok(Sport::NFL),
            "nhl" | "icehockey_nhl" => Ok(Sport::NHL),
            "mlb" | "baseball_mlb" => Ok(Sport::MLB),
            "ncaab" | "basketball_ncaab" => Ok(Sport::NCAAB),
            "ncaaf" | "americanfootball_ncaaf" => Ok(Sport::NCAAF),
            other => Err(ForecastError::InvalidEvent(format!("Unknown sport: {}", other))),
        }
    }
}

/// Odds from a single outcome (American format)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub name: String,
    pub price: f64,
}

impl Outcome {
    /// Price as whole American odds
    pub fn american(&self) -> Result<Odds> {
        Odds::american(self.price.round() as i32)
    }
}

/// Bookmaker odds for a game
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookmakerOdds {
    pub key: String,
    pub title: String,
    pub markets: Vec<MarketOdds>,
}

/// Market odds (h2h only is requested)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketOdds {
    pub key: String,
    pub outcomes: Vec<Outcome>,
}

/// Game event with odds from one or more bookmakers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameEvent {
    pub id: String,
    pub sport_key: String,
    pub sport_title: String,
    pub commence_time: String,
    pub home_team: String,
    pub away_team: String,
    #[serde(default)]
    pub bookmakers: Vec<BookmakerOdds>,
}

impl GameEvent {
    /// Get moneyline (home, away) odds from a specific bookmaker
    pub fn get_moneyline(&self, bookmaker: &str) -> Option<(Odds, Odds)> {
        let bookie = self.bookmakers.iter().find(|b| b.key == bookmaker)?;
        let market = bookie.markets.iter().find(|m| m.key == "h2h")?;

        let home = market.outcomes.iter().find(|o| o.name == self.home_team)?;
        let away = market.outcomes.iter().find(|o| o.name == self.away_team)?;

        Some((home.american().ok()?, away.american().ok()?))
    }

    pub fn commence_time(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.commence_time)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    /// Loose team-name match in either direction ("Lakers" vs "Los Angeles Lakers")
    fn involves(&self, team: &str) -> Option<bool> {
        let team = team.to_lowercase();
        let home = self.home_team.to_lowercase();
        let away = self.away_team.to_lowercase();

        if home.contains(&team) || team.contains(&home) {
            Some(true)
        } else if away.contains(&team) || team.contains(&away) {
            Some(false)
        } else {
            None
        }
    }
}

/// Moneyline for a requested matchup, oriented so `side_a` is the first team asked for
#[derive(Debug, Clone, Serialize)]
pub struct MatchupOdds {
    pub event_id: String,
    pub sport: Sport,
    pub bookmaker: String,
    pub side_a: String,
    pub side_b: String,
    pub odds_a: Odds,
    pub odds_b: Odds,
    /// True when side A is the home team
    pub side_a_home: bool,
    pub commence_time: Option<DateTime<Utc>>,
}

impl MatchupOdds {
    /// Build a validated event context for a forecast
    pub fn to_event_context(&self) -> Result<EventContext> {
        let venue = if self.side_a_home {
            format!("{} home", self.side_a)
        } else {
            format!("{} home", self.side_b)
        };

        let mut event = EventContext::new(
            self.side_a.clone(),
            self.side_b.clone(),
            self.odds_a,
            self.odds_b,
        )?
        .with_league(self.sport.display_name())
        .with_venue(venue);

        if let Some(start) = self.commence_time {
            event = event.with_start_time(start);
        }
        Ok(event)
    }
}

/// Find a matchup among fetched events and orient its moneyline
pub fn match_event(
    events: &[GameEvent],
    sport: Sport,
    bookmaker: &str,
    team_a: &str,
    team_b: &str,
) -> Result<MatchupOdds> {
    let found = events.iter().find_map(|e| match (e.involves(team_a), e.involves(team_b)) {
        (Some(a_home), Some(b_home)) if a_home != b_home => Some((e, a_home)),
        _ => None,
    });

    let (event, a_home) = match found {
        Some(found) => found,
        None => {
            warn!("No matching game found for {} vs {}", team_a, team_b);
            return Err(ForecastError::InvalidEvent(format!(
                "No {} game found for {} vs {}",
                sport.display_name(),
                team_a,
                team_b
            )));
        }
    };

    let (home_odds, away_odds) = event.get_moneyline(bookmaker).ok_or_else(|| {
        ForecastError::InvalidEvent(format!(
            "{} moneyline not available for {} vs {}",
            bookmaker, event.home_team, event.away_team
        ))
    })?;

    let (side_a, side_b, odds_a, odds_b) = if a_home {
        (&event.home_team, &event.away_team, home_odds, away_odds)
    } else {
        (&event.away_team, &event.home_team, away_odds, home_odds)
    };

    Ok(MatchupOdds {
        event_id: event.id.clone(),
        sport,
        bookmaker: bookmaker.to_string(),
        side_a: side_a.clone(),
        side_b: side_b.clone(),
        odds_a,
        odds_b,
        side_a_home: a_home,
        commence_time: event.commence_time(),
    })
}

/// Odds provider configuration
#[derive(Debug, Clone)]
pub struct OddsProviderConfig {
    pub api_key: String,
    pub bookmaker: String,
    pub region: String,
}

impl From<&OddsApiConfig> for OddsProviderConfig {
    fn from(config: &OddsApiConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            bookmaker: config.bookmaker.clone(),
            region: config.region.clone(),
        }
    }
}

/// The Odds API client for fetching moneylines
pub struct OddsProvider {
    client: Client,
    config: OddsProviderConfig,
}

impl OddsProvider {
    /// Create new odds provider
    pub fn new(config: OddsProviderConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(ForecastError::Internal(
                "odds_api.api_key not configured".into(),
            ));
        }

        Ok(Self {
            client: Client::new(),
            config,
        })
    }

    pub fn from_config(config: &OddsApiConfig) -> Result<Self> {
        Self::new(config.into())
    }

    pub fn bookmaker(&self) -> &str {
        &self.config.bookmaker
    }

    /// Fetch moneyline odds for a sport
    pub async fn get_odds(&self, sport: Sport) -> Result<Vec<GameEvent>> {
        let url = format!("{}/sports/{}/odds", THE_ODDS_API_BASE, sport.api_key());

        debug!("Fetching odds from: {}", url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("apiKey", self.config.api_key.as_str()),
                ("regions", self.config.region.as_str()),
                ("markets", "h2h"),
                ("bookmakers", self.config.bookmaker.as_str()),
                ("oddsFormat", "american"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ForecastError::Internal(format!(
                "Odds API error {}: {}",
                status, text
            )));
        }

        let events: Vec<GameEvent> = response.json().await?;

        info!(
            "Fetched {} {} games with odds",
            events.len(),
            sport.display_name()
        );
        Ok(events)
    }

    /// Fetch and orient the moneyline for one matchup
    pub async fn find_matchup_odds(
        &self,
        sport: Sport,
        team_a: &str,
        team_b: &str,
    ) -> Result<MatchupOdds> {
        let events = self.get_odds(sport).await?;
        match_event(&events, sport, &self.config.bookmaker, team_a, team_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Side;

    fn sample_events() -> Vec<GameEvent> {
        let json = r#"[
            {
                "id": "evt1",
                "sport_key": "basketball_nba",
                "sport_title": "NBA",
                "commence_time": "2025-01-15T00:30:00Z",
                "home_team": "Los Angeles Lakers",
                "away_team": "Boston Celtics",
                "bookmakers": [
                    {
                        "key": "draftkings",
                        "title": "DraftKings",
                        "markets": [
                            {
                                "key": "h2h",
                                "outcomes": [
                                    {"name": "Boston Celtics", "price": 130},
                                    {"name": "Los Angeles Lakers", "price": -150}
                                ]
                            }
                        ]
                    }
                ]
            }
        ]"#;
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_sport_from_str() {
        assert_eq!("nba".parse::<Sport>().unwrap(), Sport::NBA);
        assert_eq!("AMERICANFOOTBALL_NFL".parse::<Sport>().unwrap(), Sport::NFL);
        assert!("cricket".parse::<Sport>().is_err());
    }

    #[test]
    fn test_get_moneyline() {
        let events = sample_events();
        let (home, away) = events[0].get_moneyline("draftkings").unwrap();
        assert_eq!(home, Odds::American(-150));
        assert_eq!(away, Odds::American(130));
        assert!(events[0].get_moneyline("fanduel").is_none());
    }

    #[test]
    fn test_match_event_orients_to_request() {
        let events = sample_events();
        let matchup = match_event(&events, Sport::NBA, "draftkings", "Celtics", "Lakers").unwrap();

        assert_eq!(matchup.side_a, "Boston Celtics");
        assert_eq!(matchup.odds_a, Odds::American(130));
        assert_eq!(matchup.odds_b, Odds::American(-150));
        assert!(!matchup.side_a_home);

        let event = matchup.to_event_context().unwrap();
        assert_eq!(event.name(Side::B), "Los Angeles Lakers");
        assert_eq!(event.league(), Some("NBA"));
        assert!(event.start_time().is_some());
    }

    #[test]
    fn test_match_event_missing_game() {
        let events = sample_events();
        let err = match_event(&events, Sport::NBA, "draftkings", "Knicks", "Nets").unwrap_err();
        assert!(matches!(err, ForecastError::InvalidEvent(_)));
    }

    #[test]
    fn test_provider_requires_key() {
        assert!(OddsProvider::from_config(&OddsApiConfig::default()).is_err());
    }
}
