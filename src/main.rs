//! reqstats - HTTP request capture and date-range traffic statistics
//!
//! - `reqstats analyze` prints the statistics for a date range as JSON
//! - `reqstats serve` serves a static directory and captures every request

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use reqstats::capture::write_buffer::start_write_buffer;
use reqstats::{web, Config, LogAnalyzer, RequestLogger};

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Config file (defaults to ./reqstats.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Aggregate a date range of request logs
    Analyze(AnalyzeArgs),
    /// Serve static files and capture every request
    Serve,
}

#[derive(Args)]
struct AnalyzeArgs {
    /// First day to include (YYYY-MM-DD); defaults to the rolling window start
    #[arg(long)]
    start: Option<NaiveDate>,
    /// Last day to include (YYYY-MM-DD); defaults to today
    #[arg(long)]
    end: Option<NaiveDate>,
    /// Override the configured log root
    #[arg(long)]
    log_root: Option<PathBuf>,
    /// Read partitions one at a time
    #[arg(long)]
    sequential: bool,
    /// Pretty-print the JSON report
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before any other initialization)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    init_logging(&config);

    match cli.command {
        Command::Analyze(args) => analyze(config, args).await,
        Command::Serve => serve(config).await,
    }
}

/// Logs go to stderr so the report on stdout stays machine-readable.
/// Use LOG_FORMAT=gcp (or logging.format = "gcp") for structured GCP Cloud Logging
fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.to_lowercase()));

    if config.gcp_logging() {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_stackdriver::layer().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

async fn analyze(mut config: Config, args: AnalyzeArgs) -> Result<()> {
    if let Some(log_root) = args.log_root {
        config.storage.log_root = log_root;
    }
    if args.sequential {
        config.analyzer.parallel = false;
    }

    let analyzer = LogAnalyzer::from_config(&config);
    let (start, end) = (args.start, args.end);
    let report = tokio::task::spawn_blocking(move || analyzer.analyze(start, end))
        .await
        .context("analyzer task failed")??;

    let json = if args.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", json)?;
    Ok(())
}

async fn serve(config: Config) -> Result<()> {
    info!("Starting reqstats server...");

    let logger = Arc::new(RequestLogger::from_config(&config.storage, &config.capture));
    info!("Capturing requests under {}", logger.log_root().display());

    let write_tx = start_write_buffer(logger.clone());

    web::start_server(&config, logger, write_tx).await
}
