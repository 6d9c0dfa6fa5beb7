//! tripmate - conversational itinerary assistant
//!
//! CLI entry point for chatting about a plan and running the proposal,
//! parking and weather adapters directly.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{CommandFactory, FromArgMatches};
use eyre::{Context, Result};
use tracing::{debug, info, warn};

use tripmate::chat::{ChatOrchestrator, ProposalRequest, propose_once, render};
use tripmate::cli::{Cli, Command, OutputFormat, generate_after_help, load_plan};
use tripmate::config::Config;
use tripmate::domain::Plan;
use tripmate::places::{GooglePlacesClient, ParkingFinder, PlaceLookup};
use tripmate::proposal::{ProposalEngine, ProposalOutcome};
use tripmate::repl::ReplSession;
use tripmate::weather::{ForecastFunctionClient, GridPoint, WeatherSource};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tripmate")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > INFO
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(log_dir.join("tripmate.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cmd = Cli::command().after_help(generate_after_help());
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!(provider = %config.llm.provider, model = %config.llm.model, "tripmate loaded config");

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Some(Command::Chat {
            plan,
            session,
            message,
            format,
        }) => cmd_chat(&config, plan.as_deref(), &session, message, format).await,
        Some(Command::Propose {
            plan,
            rainy_dates,
            protect,
            top_n,
            format,
        }) => {
            let request = ProposalRequest {
                plan: load_plan(&plan)?,
                rainy_dates,
                protect_titles: protect,
                top_n,
            };
            cmd_propose(&config, request, format).await
        }
        Some(Command::Parking { plan, format }) => cmd_parking(&config, &plan, format).await,
        Some(Command::Weather { format }) => cmd_weather(&config, format).await,
        None => cmd_chat(&config, None, "local", None, OutputFormat::Text).await,
    }
}

async fn cmd_chat(
    config: &Config,
    plan_path: Option<&Path>,
    session: &str,
    message: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    debug!(?plan_path, %session, has_message = message.is_some(), "cmd_chat: called");
    let plan = plan_path.map(load_plan).transpose()?;
    let chat = ChatOrchestrator::from_config(config)?;

    match message {
        Some(message) => {
            let response = chat.chat(session, &message, plan).await;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&response)?),
                OutputFormat::Text => println!("{}", response.response),
            }
            Ok(())
        }
        None => ReplSession::new(chat, session, plan).run().await,
    }
}

async fn cmd_propose(config: &Config, request: ProposalRequest, format: OutputFormat) -> Result<()> {
    debug!(stops = request.plan.len(), has_dates = request.rainy_dates.is_some(), "cmd_propose: called");
    let timeout = Duration::from_millis(config.chat.adapter_timeout_ms);
    let lookup: Arc<dyn PlaceLookup> =
        Arc::new(GooglePlacesClient::from_config(&config.places).context("Failed to create places client")?);
    let engine = ProposalEngine::new(lookup, config.proposal.clone()).with_lookup_timeout(timeout);

    // only needed when no rainy dates were given
    let weather = match request.rainy_dates {
        Some(_) => None,
        None => match ForecastFunctionClient::from_config(&config.weather) {
            Ok(client) => Some(client),
            Err(e) => {
                warn!(error = %e, "cmd_propose: no forecast source, running degraded");
                None
            }
        },
    };
    let grid = GridPoint::new(config.weather.nx, config.weather.ny);

    let plan = request.plan.clone();
    let outcome = propose_once(
        &engine,
        weather.as_ref().map(|w| w as &dyn WeatherSource),
        grid,
        timeout,
        request,
    )
    .await
    .context("Failed to propose alternatives")?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
        OutputFormat::Text => print_outcome(&plan, &outcome),
    }
    Ok(())
}

fn print_outcome(plan: &Plan, outcome: &ProposalOutcome) {
    if outcome.degraded {
        println!("(forecast unavailable: every eligible stop treated as exposed)");
    }
    for (index, candidates) in &outcome.proposals {
        let title = plan.stop(*index).map(|s| s.title.as_str()).unwrap_or("?");
        println!("[{}] {}", index, title);
        for (i, c) in candidates.iter().enumerate() {
            let rating = c.rating.map(|r| format!("{:.1}", r)).unwrap_or_else(|| "-".to_string());
            println!("  {}. {} ({}, {:.2} km) {}", i + 1, c.title, rating, c.distance_km, c.address);
        }
    }
    for kept in &outcome.kept {
        println!("kept [{}] {}: {}", kept.index, kept.title, kept.reason);
    }
}

async fn cmd_parking(config: &Config, plan_path: &Path, format: OutputFormat) -> Result<()> {
    debug!(?plan_path, "cmd_parking: called");
    let plan = load_plan(plan_path)?;
    let lookup: Arc<dyn PlaceLookup> =
        Arc::new(GooglePlacesClient::from_config(&config.places).context("Failed to create places client")?);
    let finder = ParkingFinder::new(lookup, config.parking.clone());
    let plan = finder.attach(&plan).await;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
        OutputFormat::Text => println!("{}", render::plan(&plan)),
    }
    Ok(())
}

async fn cmd_weather(config: &Config, format: OutputFormat) -> Result<()> {
    debug!("cmd_weather: called");
    let client = ForecastFunctionClient::from_config(&config.weather).context("Failed to create weather client")?;
    let grid = GridPoint::new(config.weather.nx, config.weather.ny);
    let timeout = Duration::from_millis(config.weather.timeout_ms);

    let forecast = tokio::time::timeout(timeout, client.forecast(grid))
        .await
        .map_err(|_| eyre::eyre!("Forecast timed out after {:?}", timeout))?
        .context("Failed to fetch forecast")?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&forecast)?),
        OutputFormat::Text => {
            println!("Forecast for grid {}", grid);
            for (date, rain) in &forecast.days {
                println!("  {} {}", date, if *rain { "rain" } else { "dry" });
            }
        }
    }
    Ok(())
}
