//! Aire Bot CLI
//!
//! Meant to be run from cron or a systemd timer: each `run` is one complete
//! fetch, compare, post cycle.

use aire_bot::{
    config::Config,
    report::{chunk_report, Composer, ReportOrder},
    screenshot::{ChromeScreenshot, ScreenshotCollector},
    snapshot::SnapshotStore,
    stats::RunLog,
    AqiClient, Bot, VERSION,
};
use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "aire-bot")]
#[command(version = VERSION)]
#[command(about = "Air-quality report bot for social media", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch readings, alert on changes and publish the report
    Run,

    /// Fetch readings and print the report without posting or alerting
    Preview {
        /// Line order of the report
        #[arg(long, value_enum, default_value = "index-descending")]
        order: ReportOrder,

        /// Character budget per post
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Capture the dashboard screenshot only
    Screenshot,

    /// Show run statistics and the last sensor snapshot
    Status,

    /// Show configuration (secrets redacted)
    Config,

    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    if let Commands::Init { force } = cli.command {
        if let Err(e) = cmd_init(cli.config.as_ref(), force) {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
        return;
    }

    let config = match load_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => cmd_run(config).await,
        Commands::Preview { order, limit } => cmd_preview(config, order, limit).await,
        Commands::Screenshot => cmd_screenshot(config).await,
        Commands::Status => cmd_status(config),
        Commands::Config => cmd_config(config, cli.config.as_ref()),
        Commands::Init { .. } => Ok(()),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("loading configuration")?;

    if let Err(e) = config.ensure_directories() {
        tracing::warn!("Could not create directories: {e}");
    }
    Ok(config)
}

async fn cmd_run(config: Config) -> anyhow::Result<()> {
    let mut bot = Bot::from_config(config)?;
    let publishers = bot.publisher_names().join(", ");
    tracing::info!(version = VERSION, publishers = %publishers, "starting run");

    let report = bot.run().await?;

    println!("{}", report.report.text);
    let failed: Vec<&str> = report
        .outcomes
        .iter()
        .filter(|o| !o.is_success())
        .map(|o| o.platform.as_str())
        .collect();
    if !failed.is_empty() {
        tracing::warn!(platforms = ?failed, "some platforms failed");
    }
    Ok(())
}

async fn cmd_preview(
    config: Config,
    order: ReportOrder,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    let fetcher = AqiClient::new(config.source.clone())?;
    let readings = fetcher.fetch().await?;

    let composer = Composer::new(config.report.clone());
    let text = composer.compose(&readings, order, Utc::now());
    let chunks = chunk_report(&text, limit.unwrap_or(config.report.chunk_limit));

    for (i, chunk) in chunks.iter().enumerate() {
        println!(
            "--- post {}/{} ({} chars) ---",
            i + 1,
            chunks.len(),
            chunk.chars().count()
        );
        println!("{chunk}");
    }
    Ok(())
}

async fn cmd_screenshot(config: Config) -> anyhow::Result<()> {
    let collector = ChromeScreenshot::new(config.screenshot.clone());
    match collector.capture().await {
        Some(path) => {
            println!("Saved {}", path.display());
            Ok(())
        }
        None => anyhow::bail!("screenshot failed, see log for details"),
    }
}

fn cmd_status(config: Config) -> anyhow::Result<()> {
    println!("Aire Bot Status");
    println!("===============");
    println!();

    let log = RunLog::with_persistence(config.stats_path());
    println!("{}", log.summary());
    println!();

    let store = SnapshotStore::new(config.snapshot_path());
    match store.load() {
        Ok(snapshot) => {
            println!(
                "Last snapshot ({}), {} sensors:",
                snapshot.captured_at.to_rfc3339(),
                snapshot.sensors.len()
            );
            for name in &snapshot.sensors {
                println!("  - {name}");
            }
        }
        Err(e) => println!("No usable sensor snapshot: {e}"),
    }
    Ok(())
}

fn cmd_config(config: Config, path: Option<&PathBuf>) -> anyhow::Result<()> {
    println!("Configuration");
    println!("=============");
    println!();
    println!(
        "Config file: {:?}",
        path.cloned().unwrap_or_else(Config::config_path)
    );
    println!();
    println!("{}", serde_json::to_string_pretty(&config.redacted())?);
    Ok(())
}

fn cmd_init(path: Option<&PathBuf>, force: bool) -> anyhow::Result<()> {
    let path = path.cloned().unwrap_or_else(Config::config_path);
    if path.exists() && !force {
        anyhow::bail!("{path:?} already exists (use --force to overwrite)");
    }

    Config::default().save_to(&path)?;
    println!("Wrote default configuration to {path:?}");
    println!("Credentials can also be supplied through AIRE_* environment variables.");
    Ok(())
}
