//! Command-line interface definitions for the news monitor.
//!
//! Secrets and resource IDs can be passed as flags or read from the
//! environment.

use crate::outputs::DigestFormat;
use crate::outputs::digest::DEFAULT_DIGEST_DAYS;
use crate::pipeline::analyze::DEFAULT_ANALYZE_LIMIT;
use crate::pipeline::enrich::DEFAULT_ENRICH_LIMIT;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};

/// Health and labor news monitor: scrape, enrich, analyze, digest.
///
/// # Examples
///
/// ```sh
/// # Collect into the Google Sheet named by GSHEET_ID
/// news_monitor scrape
///
/// # Collect into a local directory instead
/// news_monitor --store local --store-dir ./news_store scrape
///
/// # Last week's labor news as Markdown
/// news_monitor digest --tag 노동 -o digest.md
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Optional path to a news.yaml file (keywords, sources, HTTP settings)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Where NEWS and META rows live
    #[arg(long, value_enum, global = true, default_value = "sheets")]
    pub store: StoreKind,

    /// Directory for the local store
    #[arg(long, global = true, default_value = "./news_store")]
    pub store_dir: String,

    /// Google Sheet ID for the sheets store
    #[arg(long, env = "GSHEET_ID", global = true)]
    pub sheet_id: Option<String>,

    /// OAuth access token for Google Sheets and BigQuery
    #[arg(long, env = "GOOGLE_ACCESS_TOKEN", global = true, hide_env_values = true)]
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    Sheets,
    Local,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Collect feeds and boards into the NEWS store
    Scrape,

    /// Fill article text in the warehouse
    Enrich {
        /// Maximum URLs per run
        #[arg(long, default_value_t = DEFAULT_ENRICH_LIMIT)]
        limit: usize,

        #[command(flatten)]
        warehouse: WarehouseArgs,
    },

    /// Analyze enriched articles with the model
    Analyze {
        /// Maximum articles per run
        #[arg(long, default_value_t = DEFAULT_ANALYZE_LIMIT)]
        limit: usize,

        /// Chat template holding the analyst prompt
        #[arg(long, default_value = "news_analyst")]
        template: String,

        /// Path to the model client's config.yaml (defaults to its config dir)
        #[arg(long)]
        llm_config: Option<String>,

        #[command(flatten)]
        warehouse: WarehouseArgs,
    },

    /// Print or write a digest of stored news
    Digest {
        /// First KST date (YYYY-MM-DD); defaults to `--days` before `--to`
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Last KST date (YYYY-MM-DD); defaults to today
        #[arg(long)]
        to: Option<NaiveDate>,

        /// Range length when `--from` is omitted
        #[arg(long, default_value_t = DEFAULT_DIGEST_DAYS)]
        days: i64,

        /// Only rows whose tags contain this text
        #[arg(long)]
        tag: Option<String>,

        /// Only rows whose title, source or tags contain this text (any case)
        #[arg(short, long)]
        keyword: Option<String>,

        /// Leave out near-duplicates
        #[arg(long)]
        hide_duplicates: bool,

        #[arg(long, value_enum, default_value = "markdown")]
        format: DigestFormat,

        /// Output file; stdout when omitted
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct WarehouseArgs {
    /// BigQuery project
    #[arg(long, env = "BQ_PROJECT_ID")]
    pub project: Option<String>,

    /// BigQuery dataset
    #[arg(long, env = "BQ_DATASET", default_value = "kinetic_field")]
    pub dataset: String,

    /// BigQuery job location
    #[arg(long, env = "BQ_LOCATION", default_value = "")]
    pub location: String,
}
