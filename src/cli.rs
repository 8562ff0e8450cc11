use std::{num::NonZeroUsize, path::PathBuf, time::Duration};

use clap::Parser;

use crate::{browser::BrowserKind, csv_job::JobOptions, scraping_context::Engine};

/// Search a business directory for a keyword in every configured area and export the results to CSV.
#[derive(Debug, Parser)]
#[command(name = "listing-scraper", version)]
pub struct Args {
    /// Keyword (single word)
    #[arg(long)]
    pub keyword: String,

    /// Fetch pages with plain HTTP or a headless browser
    #[arg(long, value_enum, default_value_t = Engine::Http)]
    pub engine: Engine,

    /// Browser used by the browser engine
    #[arg(long, value_enum, default_value_t = BrowserKind::Chrome)]
    pub browser: BrowserKind,

    /// Maximum number of records
    #[arg(long)]
    pub records: Option<NonZeroUsize>,

    /// Timeout for loading a page (seconds)
    #[arg(long, default_value_t = 90)]
    pub timeout: u64,

    /// Number of retries
    #[arg(long, default_value_t = 3)]
    pub retry: u32,

    /// Directory holding default.toml and per-environment settings files
    #[arg(long, default_value = "config")]
    pub config_dir: PathBuf,

    /// Settings environment (defaults to $APP_ENV, then "default")
    #[arg(long)]
    pub env: Option<String>,

    /// Output file, overriding the configured filename
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn job_options(&self) -> JobOptions {
        JobOptions {
            keyword: self.keyword.clone(),
            engine: self.engine,
            browser: self.browser,
            records: self.records,
            timeout: Duration::from_secs(self.timeout),
            retry: self.retry,
        }
    }
}
