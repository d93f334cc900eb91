use clap::Parser;
use panelcast::agent::{build_estimator, OddsProvider, Sport};
use panelcast::cli::{self, Cli, Commands};
use panelcast::config::AppConfig;
use panelcast::domain::{EventContext, Odds, Side};
use panelcast::error::{ForecastError, Result};
use panelcast::forecast::ForecastService;
use tokio::signal;
use tracing::{info, warn};

mod main_runtime;

use main_runtime::{init_logging, init_logging_simple};

struct ForecastArgs {
    side_a: String,
    side_b: String,
    odds_a: Option<String>,
    odds_b: Option<String>,
    sport: Option<String>,
    experts: Option<usize>,
    side: String,
    league: Option<String>,
    venue: Option<String>,
    notes: Option<String>,
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Implied { odds } => {
            init_logging_simple();
            let odds: Odds = odds.parse()?;
            cli::show_implied(odds)?;
        }
        Commands::Odds { sport } => {
            init_logging_simple();
            let config = load_config(&cli.config)?;
            let sport: Sport = sport.parse()?;
            let provider = OddsProvider::from_config(&config.odds_api)?;
            let events = provider.get_odds(sport).await?;
            cli::show_odds(&events, provider.bookmaker());
        }
        Commands::Forecast {
            side_a,
            side_b,
            odds_a,
            odds_b,
            sport,
            experts,
            side,
            league,
            venue,
            notes,
            json,
        } => {
            let config = load_config(&cli.config)?;
            init_logging(&config.logging);
            let args = ForecastArgs {
                side_a,
                side_b,
                odds_a,
                odds_b,
                sport,
                experts,
                side,
                league,
                venue,
                notes,
                json,
            };
            run_forecast(config, args).await?;
        }
    }

    Ok(())
}

fn load_config(dir: &str) -> Result<AppConfig> {
    let config = AppConfig::load_from(dir)?;
    if let Err(errors) = config.validate() {
        for e in &errors {
            eprintln!("\x1b[31m✗ config: {}\x1b[0m", e);
        }
        return Err(ForecastError::Internal(format!(
            "{} invalid configuration value(s)",
            errors.len()
        )));
    }
    Ok(config)
}

async fn resolve_event(config: &AppConfig, args: &ForecastArgs) -> Result<EventContext> {
    let mut event = match (&args.sport, &args.odds_a, &args.odds_b) {
        (Some(sport), _, _) => {
            let sport: Sport = sport.parse()?;
            let provider = OddsProvider::from_config(&config.odds_api)?;
            let matchup = provider
                .find_matchup_odds(sport, &args.side_a, &args.side_b)
                .await?;
            info!(
                event_id = %matchup.event_id,
                odds_a = %matchup.odds_a,
                odds_b = %matchup.odds_b,
                "using market odds from {}",
                matchup.bookmaker
            );
            matchup.to_event_context()?
        }
        (None, Some(odds_a), Some(odds_b)) => EventContext::new(
            args.side_a.clone(),
            args.side_b.clone(),
            odds_a.parse()?,
            odds_b.parse()?,
        )?,
        _ => {
            return Err(ForecastError::InvalidOddsFormat(
                "both --odds-a and --odds-b are required without --sport".to_string(),
            ))
        }
    };

    if let Some(league) = &args.league {
        event = event.with_league(league.clone());
    }
    if let Some(venue) = &args.venue {
        event = event.with_venue(venue.clone());
    }
    if let Some(notes) = &args.notes {
        event = event.with_notes(notes.clone());
    }
    Ok(event)
}

async fn run_forecast(config: AppConfig, args: ForecastArgs) -> Result<()> {
    let event = resolve_event(&config, &args).await?;
    let target: Side = args.side.parse()?;

    let estimator = build_estimator(&config.estimator)?;
    info!(backend = estimator.name(), "estimator ready");

    let service = ForecastService::new(estimator, config.forecast.clone());
    let sweeper = service.spawn_sweeper();
    let id = service
        .submit_for_side(event.clone(), target, args.experts, None)
        .await?;

    let mut tick = tokio::time::interval(config.forecast.poll_interval());
    loop {
        tokio::select! {
            _ = tick.tick() => {
                let status = service.poll(id).await?;
                if !args.json {
                    cli::show_progress(&status);
                }
                if status.state.is_terminal() {
                    break;
                }
            }
            _ = signal::ctrl_c() => {
                warn!("interrupted, cancelling forecast");
                if !service.cancel_if_running(id).await? {
                    info!("forecast finished before the interrupt");
                }
                break;
            }
        }
    }

    let outcome = service.result(id).await?;
    if args.json {
        cli::print_json(outcome.as_ref())?;
    } else {
        cli::show_outcome(&event, target, &outcome);
    }
    service.release(id).await?;
    sweeper.abort();

    Ok(())
}
