//! CLI entry point for transit offset ingestion.
//!
//! Each `ingest` run seeds the line tables, fetches one system's arrivals
//! and stores at most one capped batch of new records.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::ffi::OsStr;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use transit_offsets::{
    System,
    config::Config,
    fetch::{BasicClient, auth::UrlParam},
    lines::LineIdResolver,
    pairing::DescendingId,
    persist::IncrementalPersister,
    pipeline::{RunSummary, run_boston, run_chicago},
    ridership,
    stops::{cta as cta_stops, mbta as mbta_stops},
    store::Store,
    vendors::{
        cta::{self, CtaClient},
        mbta::{self, MbtaClient},
    },
};

#[derive(Parser)]
#[command(name = "transit_offsets")]
#[command(about = "Collects MBTA and CTA arrival offsets into SQLite", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the line id tables for every system
    Seed,
    /// Fetch arrivals for one system and store the next batch
    Ingest {
        #[arg(value_enum)]
        system: System,
    },
    /// Store average weekday ridership from a `line,ridership` CSV export
    Ridership {
        #[arg(value_enum)]
        system: System,

        /// CSV file with one row per line
        #[arg(value_name = "FILE")]
        file: String,
    },
    /// Show stored row counts and ingestion watermarks
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/transit_offsets.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("transit_offsets.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let tables = config.line_tables()?;

    let store = Store::connect(&config.database_url)
        .await
        .with_context(|| format!("failed to open database '{}'", config.database_url))?;
    let resolver = LineIdResolver::new(store.clone(), tables);

    match cli.command {
        Commands::Seed => {
            for system in System::ALL {
                resolver.seed(system).await?;
            }
        }
        Commands::Ingest { system } => {
            for each in System::ALL {
                resolver.seed(each).await?;
            }
            let summary = ingest(&config, &store, &resolver, system).await?;
            report(&summary);
        }
        Commands::Ridership { system, file } => {
            resolver.seed(system).await?;
            let reader = File::open(&file).with_context(|| format!("failed to open '{file}'"))?;
            let counts = ridership::read_counts(reader)?;
            ridership::import(&resolver, &store, system, &counts).await?;
        }
        Commands::Status => {
            for system in System::ALL {
                let rows = store.arrival_count(system).await?;
                let lines = store.line_count(&resolver.lines(system)?.prefix).await?;
                match store.watermark(system).await? {
                    Some(mark) => info!(
                        %system,
                        rows,
                        lines,
                        last_key = %mark.last_key,
                        total_inserted = mark.total_inserted,
                        updated_at = %mark.updated_at,
                        "Status"
                    ),
                    None => info!(%system, rows, lines, "Status (never ingested)"),
                }
            }
        }
    }

    store.close().await;
    Ok(())
}

/// Runs one system's pipeline against the live vendor API.
#[tracing::instrument(skip(config, store, resolver))]
async fn ingest(
    config: &Config,
    store: &Store,
    resolver: &LineIdResolver,
    system: System,
) -> Result<RunSummary> {
    let key = config.api_key(system)?;
    let persister = IncrementalPersister::with_cap(store.clone(), config.batch_cap);

    match system {
        System::Boston => {
            let path = &config.mbta_stops_path;
            let file = File::open(path).with_context(|| format!("failed to open '{path}'"))?;
            let catalog = mbta_stops::parse_stop_feed(BufReader::new(file))?;
            info!(stations = catalog.station_count(), "Stop feed loaded");

            let client = MbtaClient::new(UrlParam::new(BasicClient::new(), mbta::API_KEY_PARAM, key));
            run_boston(&client, &catalog, &DescendingId, resolver, &persister, Utc::now()).await
        }
        System::Chicago => {
            let path = &config.cta_stops_path;
            let file = File::open(path).with_context(|| format!("failed to open '{path}'"))?;
            let stations = cta_stops::parse_station_list(file)?;
            info!(stations = stations.len(), "Stop feed loaded");

            let client = CtaClient::new(UrlParam::new(BasicClient::new(), cta::API_KEY_PARAM, key));
            run_chicago(&client, &stations, resolver, store, &persister).await
        }
    }
}

fn report(summary: &RunSummary) {
    let outcome = &summary.persisted;
    if outcome.caught_up() {
        info!(
            system = %summary.system,
            queries = summary.queries,
            inserted = outcome.inserted,
            "All data written to database"
        );
    } else {
        info!(
            system = %summary.system,
            queries = summary.queries,
            inserted = outcome.inserted,
            remaining = outcome.remaining,
            "Batch written, run again for the rest"
        );
    }
}
