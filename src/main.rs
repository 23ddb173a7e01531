//! # News Monitor
//!
//! Collects Korean health and labor news from RSS feeds and government
//! press-release boards, drops exact duplicates, flags near-duplicates by
//! title SimHash, and keeps the survivors in a Google Sheet (or a local
//! directory). Downstream stages copy the rows to BigQuery, fill in article
//! text and run a model analysis over each new story.
//!
//! ## Usage
//!
//! ```sh
//! news_monitor scrape
//! news_monitor enrich --project my-project
//! news_monitor analyze --project my-project
//! news_monitor digest --days 3 --tag 의료
//! ```
//!
//! ## Architecture
//!
//! 1. **Scrape**: feeds and boards → tagged candidates → dedup → NEWS rows
//! 2. **Enrich**: NEWS rows → warehouse → article text
//! 3. **Analyze**: article text → model → analysis rows
//! 4. **Digest**: NEWS rows → filtered Markdown/JSON report

use awful_aj::{config_dir, template};
use chrono::Utc;
use clap::Parser;
use std::error::Error;
use std::path::Path;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod config;
mod dedup;
mod error;
mod models;
mod outputs;
mod pipeline;
mod scrapers;
mod storage;
mod tagging;
mod utils;
mod warehouse;

use cli::{Cli, Command, StoreKind, WarehouseArgs};
use config::NewsConfig;
use error::NewsError;
use outputs::digest::{DigestFilter, KST};
use pipeline::scrape::ScrapeOutcome;
use scrapers::HttpFetcher;
use storage::NewsStore;
use storage::local::LocalStore;
use storage::sheets::SheetsStore;
use warehouse::BigQueryWarehouse;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("news_monitor starting up");

    let args = Cli::parse();
    debug!(command = ?args.command, store = ?args.store, "Parsed CLI arguments");

    let result = match &args.command {
        Command::Scrape => {
            let config = NewsConfig::load(args.config.as_deref()).await?;
            match args.store {
                StoreKind::Sheets => scrape(&sheets_store(&args)?, &config).await,
                StoreKind::Local => scrape(&local_store(&args).await?, &config).await,
            }
        }
        Command::Enrich { limit, warehouse } => enrich(&args, warehouse, *limit).await,
        Command::Analyze {
            limit,
            template,
            llm_config,
            warehouse,
        } => analyze(&args, warehouse, template, llm_config.as_deref(), *limit).await,
        Command::Digest { .. } => match args.store {
            StoreKind::Sheets => digest(&sheets_store(&args)?, &args.command).await,
            StoreKind::Local => digest(&local_store(&args).await?, &args.command).await,
        },
    };

    let elapsed = start_time.elapsed();
    match &result {
        Ok(()) => info!(elapsed_ms = elapsed.as_millis() as u64, "news_monitor finished"),
        Err(e) => error!(elapsed_ms = elapsed.as_millis() as u64, error = %e, "news_monitor failed"),
    }
    result
}

fn sheets_store(args: &Cli) -> Result<SheetsStore, NewsError> {
    SheetsStore::new(
        args.sheet_id.as_deref().unwrap_or_default(),
        args.access_token.as_deref().unwrap_or_default(),
    )
}

async fn local_store(args: &Cli) -> Result<LocalStore, NewsError> {
    utils::ensure_writable_dir(Path::new(&args.store_dir)).await?;
    Ok(LocalStore::new(&args.store_dir))
}

fn bigquery(args: &Cli, wh: &WarehouseArgs) -> Result<BigQueryWarehouse, NewsError> {
    BigQueryWarehouse::new(
        wh.project.as_deref().unwrap_or_default(),
        &wh.dataset,
        &wh.location,
        args.access_token.as_deref().unwrap_or_default(),
    )
}

async fn scrape<S: NewsStore>(store: &S, config: &NewsConfig) -> Result<(), Box<dyn Error>> {
    match pipeline::scrape::run_scrape(store, config).await? {
        ScrapeOutcome::Disabled => info!("Scrape disabled by META rss_enabled"),
        ScrapeOutcome::Completed(report) => {
            for failure in report.failures() {
                debug!(error = %failure, "Rejected candidate");
            }
            info!(
                inserted = report.accepted(),
                near_duplicates = report.near_duplicates(),
                exact_duplicates = report.exact_duplicates(),
                "Scrape complete"
            );
        }
    }
    Ok(())
}

async fn enrich(args: &Cli, wh: &WarehouseArgs, limit: usize) -> Result<(), Box<dyn Error>> {
    let warehouse = bigquery(args, wh)?;
    let config = NewsConfig::load(args.config.as_deref()).await?;
    let fetcher = HttpFetcher::new(&config.http, pipeline::enrich::FETCH_TIMEOUT_SEC)?;
    let report = pipeline::enrich::run_enrich(&warehouse, &fetcher, limit).await?;
    info!(?report, "Enrich complete");
    Ok(())
}

async fn analyze(
    args: &Cli,
    wh: &WarehouseArgs,
    template_name: &str,
    llm_config: Option<&str>,
    limit: usize,
) -> Result<(), Box<dyn Error>> {
    let warehouse = bigquery(args, wh)?;

    // ---- Load template & config ----
    let template = template::load_template(template_name).await?;
    info!(template = template_name, "Loaded template");
    let config_path = match llm_config {
        Some(path) => path.to_string(),
        None => config_dir()?
            .join("config.yaml")
            .to_str()
            .ok_or("config path is not valid UTF-8")?
            .to_string(),
    };
    let config = awful_aj::config::load_config(&config_path)?;
    info!(%config_path, "Loaded model configuration");

    let analyst = api::analyst(&config, &template);
    let report = pipeline::analyze::run_analyze(&warehouse, &analyst, limit).await?;
    info!(
        inserted = report.inserted(),
        failed = report.failed(),
        "Analyze complete"
    );
    Ok(())
}

async fn digest<S: NewsStore>(store: &S, command: &Command) -> Result<(), Box<dyn Error>> {
    let Command::Digest {
        from,
        to,
        days,
        tag,
        keyword,
        hide_duplicates,
        format,
        output,
    } = command
    else {
        return Err("digest called with another command".into());
    };

    let to = to.unwrap_or_else(|| Utc::now().with_timezone(&*KST).date_naive());
    let mut filter = DigestFilter::last_days(to, *days);
    if let Some(from) = from {
        filter.from = *from;
    }
    filter.tag = tag.clone();
    filter.keyword = keyword.clone();
    filter.hide_near_duplicates = *hide_duplicates;

    let (doc, count) = outputs::build_digest(store, &filter, *format).await?;
    outputs::write_output(&doc, output.as_deref().map(Path::new)).await?;
    info!(count, "Digest complete");
    Ok(())
}
