mod predict;
mod store;
mod sync;
mod util;
mod web;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use crate::predict::{
    calculate_orbit_path, calculate_orbital_parameters, predict_passes_from, ElementSet,
    ElementSetResolver, HttpFetcher, Sgp4Propagator,
};
use crate::store::backfill::Backfiller;
use crate::store::retention::run_retention;
use crate::store::validator::validate_store;
use crate::store::Store;
use crate::web::Config;

#[derive(Parser)]
#[command(name = "orbit-watch")]
#[command(about = "Satellite pass prediction and position history")]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sync loops and the HTTP API
    Serve,
    /// Print upcoming passes over the configured observer
    Passes {
        #[arg(long)]
        count: Option<usize>,
        #[arg(long)]
        days: Option<i64>,
        #[arg(long)]
        min_elevation: Option<f64>,
        /// Search start (RFC3339), defaults to now
        #[arg(long)]
        from: Option<DateTime<Utc>>,
    },
    /// Print orbital parameters and the ground track around now
    Orbit {
        #[arg(long, default_value_t = -45.0, allow_negative_numbers = true)]
        start: f64,
        #[arg(long, default_value_t = 45.0, allow_negative_numbers = true)]
        end: f64,
        #[arg(long, default_value_t = 5.0)]
        step: f64,
    },
    /// Validate the store, apply retention and optionally backfill a range
    Maintain {
        /// Backfill range start, Unix seconds
        #[arg(long, requires = "backfill_to")]
        backfill_from: Option<i64>,
        /// Backfill range end, Unix seconds
        #[arg(long, requires = "backfill_from")]
        backfill_to: Option<i64>,
    },
    /// Parse the configuration file and exit
    CheckConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = match Config::from_file(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading {}: {}", cli.config.display(), e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Serve => serve(config).await,
        Commands::Passes {
            count,
            days,
            min_elevation,
            from,
        } => passes(config, count, days, min_elevation, from).await,
        Commands::Orbit { start, end, step } => orbit(config, start, end, step).await,
        Commands::Maintain {
            backfill_from,
            backfill_to,
        } => maintain(config, backfill_from.zip(backfill_to)).await,
        Commands::CheckConfig => check_config(&config),
    }
}

async fn serve(config: Config) -> ExitCode {
    match web::run_server(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Server error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Newest stored element set, or a fresh one from the configured sources.
async fn load_element_set(config: &Config, store: &Store) -> Option<ElementSet> {
    match store.latest_element_set().await {
        Ok(Some(set)) => return Some(set),
        Ok(None) => {}
        Err(e) => log::warn!("Cannot read stored element sets: {}", e),
    }
    let fetcher = match HttpFetcher::new(config.sources.timeout) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Cannot build HTTP client: {}", e);
            return None;
        }
    };
    let resolver = ElementSetResolver::new(Arc::new(fetcher), config.sources.tle.clone());
    Some(resolver.fetch_element_set().await)
}

fn open_store(config: &Config) -> Option<Store> {
    match Store::open(&config.store.data_dir) {
        Ok(store) => Some(store),
        Err(e) => {
            eprintln!("Cannot open store: {}", e);
            None
        }
    }
}

async fn passes(
    config: Config,
    count: Option<usize>,
    days: Option<i64>,
    min_elevation: Option<f64>,
    from: Option<DateTime<Utc>>,
) -> ExitCode {
    let Some(store) = open_store(&config) else {
        return ExitCode::FAILURE;
    };
    let Some(elements) = load_element_set(&config, &store).await else {
        return ExitCode::FAILURE;
    };
    let observer = match config.observer() {
        Ok(o) => o,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut search = config.prediction;
    search.max_passes = count.unwrap_or(search.max_passes);
    search.max_days_horizon = days.unwrap_or(search.max_days_horizon);
    search.min_elevation_deg = min_elevation.unwrap_or(search.min_elevation_deg);

    let now = from.unwrap_or_else(Utc::now);
    let found = predict_passes_from(&Sgp4Propagator, &elements, &observer, &search, now);

    println!(
        "{} passes above {}° within {} days (element set {}, epoch {})",
        found.len(),
        search.min_elevation_deg,
        search.max_days_horizon,
        elements.source,
        elements.epoch
    );
    for pass in &found {
        println!(
            "  {} -> {}  max {:>5.1}°  {:>4.1} min",
            pass.start_time.format("%Y-%m-%d %H:%M:%S"),
            pass.end_time.format("%H:%M:%S"),
            pass.max_elevation_deg,
            pass.duration_minutes
        );
    }
    ExitCode::SUCCESS
}

async fn orbit(config: Config, start: f64, end: f64, step: f64) -> ExitCode {
    let Some(store) = open_store(&config) else {
        return ExitCode::FAILURE;
    };
    let Some(elements) = load_element_set(&config, &store).await else {
        return ExitCode::FAILURE;
    };

    match calculate_orbital_parameters(&Sgp4Propagator, &elements) {
        Some(p) => println!(
            "Inclination {:.4}°  e {:.7}  {:.8} rev/day  period {:.2} min  apogee {:.1} km  perigee {:.1} km",
            p.inclination_deg,
            p.eccentricity,
            p.mean_motion_rev_per_day,
            p.period_minutes,
            p.apogee_km,
            p.perigee_km
        ),
        None => println!("Orbital parameters unavailable"),
    }

    for point in calculate_orbit_path(&Sgp4Propagator, &elements, start, end, step) {
        println!(
            "  {}  {:>8.3} {:>9.3}  {:>6.1} km  {:>7.0} km/h",
            point.timestamp.format("%Y-%m-%d %H:%M:%S"),
            point.latitude,
            point.longitude,
            point.altitude_km,
            point.velocity_kmh
        );
    }
    ExitCode::SUCCESS
}

async fn maintain(config: Config, backfill: Option<(i64, i64)>) -> ExitCode {
    let Some(store) = open_store(&config) else {
        return ExitCode::FAILURE;
    };

    match validate_store(&store).await {
        Ok(report) => println!(
            "Validation: removed {} positions, {} element sets, {} crew (refetch needed: {})",
            report.positions.removed,
            report.element_sets.removed,
            report.crew.removed,
            report.needs_refetch
        ),
        Err(e) => {
            eprintln!("Validation failed: {}", e);
            return ExitCode::FAILURE;
        }
    }

    match run_retention(&store, &config.retention, Utc::now()).await {
        Ok(report) => println!(
            "Retention: removed {} positions, {} element sets",
            report.positions_removed, report.element_sets_removed
        ),
        Err(e) => {
            eprintln!("Retention failed: {}", e);
            return ExitCode::FAILURE;
        }
    }

    if let Some((from, to)) = backfill {
        let Some(elements) = load_element_set(&config, &store).await else {
            return ExitCode::FAILURE;
        };
        let backfiller = Backfiller::new(Arc::new(Sgp4Propagator), config.backfill.clone());
        match backfiller
            .fill_gaps_in_range(&store, from, to, &elements)
            .await
        {
            Ok(added) => println!("Backfill: added {} synthetic positions", added),
            Err(e) => {
                eprintln!("Backfill failed: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}

fn check_config(config: &Config) -> ExitCode {
    println!("Configuration is valid");
    if let Some(name) = &config.observer.name {
        println!("  observer: {} ({})", name, config.observer.coordinates);
    } else {
        println!("  observer: {}", config.observer.coordinates);
    }
    println!("  bind: {}", config.web.bind);
    println!("  data dir: {}", config.store.data_dir.display());
    println!(
        "  sync: positions every {:?}, element sets every {:?}, crew every {:?}",
        config.sync.position_interval, config.sync.element_set_interval, config.sync.crew_interval
    );
    ExitCode::SUCCESS
}
