use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::agent::GameEvent;
use crate::domain::{EventContext, Odds, OpinionStatus, Side};
use crate::error::Result;
use crate::forecast::{ForecastOutcome, RequestStatus, Verdict};

#[derive(Parser)]
#[command(name = "panelcast")]
#[command(version)]
#[command(about = "Multi-expert probabilistic forecasts priced against the betting market", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config directory (default.toml, then $PANELCAST_ENV.toml)
    #[arg(short, long, default_value = "config", env = "PANELCAST_CONFIG_DIR")]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run an expert panel on a matchup
    Forecast {
        /// Side A (forecast target by default)
        side_a: String,
        /// Side B
        side_b: String,
        /// Side A odds (e.g. -150, +130, 1.85)
        #[arg(long, allow_hyphen_values = true, required_unless_present = "sport")]
        odds_a: Option<String>,
        /// Side B odds
        #[arg(long, allow_hyphen_values = true, required_unless_present = "sport")]
        odds_b: Option<String>,
        /// Fetch odds from The Odds API instead (nba, nfl, nhl, mlb, ncaab, ncaaf)
        #[arg(long, conflicts_with_all = ["odds_a", "odds_b"])]
        sport: Option<String>,
        /// Number of experts (defaults to forecast.expert_count_default)
        #[arg(short, long)]
        experts: Option<usize>,
        /// Side to forecast (a or b)
        #[arg(long, default_value = "a")]
        side: String,
        #[arg(long)]
        league: Option<String>,
        #[arg(long)]
        venue: Option<String>,
        /// Free-text situational notes passed to every expert
        #[arg(long)]
        notes: Option<String>,
        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// List moneylines for a sport
    Odds {
        /// nba, nfl, nhl, mlb, ncaab, ncaaf
        sport: String,
    },
    /// Convert odds to implied probability
    Implied {
        /// American (-150, +130) or decimal (1.85) odds
        #[arg(allow_hyphen_values = true)]
        odds: String,
    },
}

/// Pretty-print a serializable value for `--json` output
pub fn print_json<T: Serialize>(item: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(item).context("serializing output")?;
    println!("{json}");
    Ok(())
}

pub fn show_implied(odds: Odds) -> Result<()> {
    let implied = odds.implied_probability()?;
    let decimal = odds.decimal_odds()?;

    println!("\x1b[36m═══ Odds {} ═══\x1b[0m", odds);
    println!("   Implied probability: {:.2}%", implied * 100.0);
    println!("   Decimal odds:        {:.3}", decimal);
    println!("   Break-even win rate: {:.2}%", 100.0 / decimal);
    Ok(())
}

pub fn show_odds(events: &[GameEvent], bookmaker: &str) {
    if events.is_empty() {
        println!("\x1b[33mNo games with odds right now\x1b[0m");
        return;
    }

    println!("\x1b[36m═══ Moneylines ({}) ═══\x1b[0m", bookmaker);
    for event in events {
        match event.get_moneyline(bookmaker) {
            Some((home, away)) => println!(
                "   {:<28} {:>6}   @ {:<28} {:>6}   {}",
                event.away_team, away, event.home_team, home, event.commence_time
            ),
            None => println!(
                "   {:<28} {:>6}   @ {:<28} {:>6}   {}",
                event.away_team, "-", event.home_team, "-", event.commence_time
            ),
        }
    }
}

pub fn show_progress(status: &RequestStatus) {
    eprint!(
        "\r\x1b[90m   {} {}/{} opinions\x1b[0m",
        status.state, status.received_count, status.requested_count
    );
}

pub fn show_outcome(event: &EventContext, target: Side, outcome: &ForecastOutcome) {
    eprintln!();
    println!("\x1b[36m═══ {} ═══\x1b[0m", event.matchup());

    for opinion in outcome.opinions() {
        let color = if opinion.status == OpinionStatus::Ok { "32" } else { "31" };
        let value = opinion
            .probability
            .map(|p| format!("{:.1}%", p * 100.0))
            .unwrap_or_else(|| "-".to_string());
        let rationale: String = opinion.rationale.chars().take(90).collect();
        println!(
            "   \x1b[{}m#{:<2} {:<12}\x1b[0m {:>6}  {:>6}ms  {}",
            color,
            opinion.expert_index,
            opinion.status,
            value,
            opinion.latency.as_millis(),
            rationale.replace('\n', " ")
        );
    }

    match outcome {
        ForecastOutcome::Completed {
            consensus,
            recommendation,
            ..
        } => {
            println!("\n\x1b[33mConsensus ({}):\x1b[0m", event.name(target));
            println!(
                "   Probability: {:.1}% ± {:.1}",
                consensus.probability * 100.0,
                consensus.std_dev() * 100.0
            );
            println!(
                "   Beta({:.2}, {:.2}) from {} opinions",
                consensus.alpha, consensus.beta, consensus.used_count
            );

            println!("\n\x1b[33mMarket:\x1b[0m");
            println!("   Implied:  {:.1}%", recommendation.implied * 100.0);
            println!("   Edge:     {:+.1} pts", recommendation.edge * 100.0);
            println!("   EV:       {:+.3} per unit", recommendation.expected_value);

            match recommendation.verdict.side() {
                Some(side) => println!(
                    "\n   \x1b[32m✓ {} → back {} (Kelly {:.1}%)\x1b[0m",
                    recommendation.verdict,
                    event.name(side),
                    recommendation.kelly_fraction * 100.0
                ),
                None => println!(
                    "\n   \x1b[33m○ {} (|edge| within {:.1} pts)\x1b[0m",
                    Verdict::NoBet,
                    recommendation.edge_epsilon * 100.0
                ),
            }
        }
        ForecastOutcome::Failed { reason, detail, .. } => {
            println!("\n   \x1b[31m✗ Forecast failed: {} ({})\x1b[0m", reason, detail);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ForecastError;

    struct Unprintable;

    impl Serialize for Unprintable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> std::result::Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("no representation"))
        }
    }

    #[test]
    fn test_print_json() {
        assert!(print_json(&Verdict::NoBet).is_ok());
    }

    #[test]
    fn test_print_json_failure_converts() {
        let err: ForecastError = print_json(&Unprintable).unwrap_err().into();
        assert!(matches!(err, ForecastError::Other(_)));
        assert_eq!(err.to_string(), "serializing output");
    }

    #[test]
    fn test_forecast_args() {
        let cli = Cli::try_parse_from([
            "panelcast", "forecast", "Lakers", "Celtics", "--odds-a", "-150", "--odds-b", "+130",
        ])
        .unwrap();
        match cli.command {
            Commands::Forecast { odds_a, odds_b, side, .. } => {
                assert_eq!(odds_a.as_deref(), Some("-150"));
                assert_eq!(odds_b.as_deref(), Some("+130"));
                assert_eq!(side, "a");
            }
            _ => panic!("expected forecast command"),
        }

        assert!(Cli::try_parse_from(["panelcast", "forecast", "Lakers", "Celtics"]).is_err());
    }
}
