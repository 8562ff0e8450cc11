use std::{
    fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use chrono::{DateTime, FixedOffset, Utc};
use log::{debug, info, warn};

use crate::{
    browser::BrowserKind,
    config::{RuntimeEnv, Settings},
    csv_export::CsvSink,
    directory_scraper::parse_listing_page,
    scraping_context::{Engine, ScrapingContext},
    search,
};

const JST_OFFSET_SECS: i32 = 9 * 3600;
const SCRAPED_AT_FORMAT: &str = "%Y年%m月%d日 %H:%M:%S";

#[derive(Debug, Clone)]
pub struct JobOptions {
    pub keyword: String,
    pub engine: Engine,
    pub browser: BrowserKind,
    /// Stop after this many rows in total.
    pub records: Option<NonZeroUsize>,
    pub timeout: Duration,
    pub retry: u32,
}

impl JobOptions {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            engine: Engine::default(),
            browser: BrowserKind::default(),
            records: None,
            timeout: Duration::from_secs(90),
            retry: 3,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobReport {
    pub rows_written: usize,
    pub areas: Vec<AreaReport>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AreaReport {
    pub area: String,
    pub rows: usize,
}

/// Searches every configured area for the keyword and exports the listings to CSV.
pub struct CsvJob {
    settings: Settings,
    options: JobOptions,
    runtime: RuntimeEnv,
}

impl CsvJob {
    pub fn new(settings: Settings, options: JobOptions, runtime: RuntimeEnv) -> Self {
        Self {
            settings,
            options,
            runtime,
        }
    }

    pub fn output_path(&self) -> PathBuf {
        PathBuf::from(&self.settings.filename)
    }

    /// Runs the job. On failure the partially written file is removed.
    pub async fn create(&self) -> anyhow::Result<JobReport> {
        let output = self.output_path();
        self.set_up(&output)?;

        let context = ScrapingContext::new(
            &self.settings,
            &self.runtime,
            self.options.engine,
            self.options.browser,
            self.options.timeout,
            self.options.retry,
        )
        .await
        .context("failed to start the page fetcher")?;

        let result = self.write_csv(&context, &output).await;
        context.close().await;

        if result.is_err() {
            self.on_error(&output);
        }
        result
    }

    fn set_up(&self, output: &Path) -> anyhow::Result<()> {
        if output.is_file() {
            debug!("removing stale {}", output.display());
            fs::remove_file(output)
                .with_context(|| format!("failed to remove {}", output.display()))?;
        }
        Ok(())
    }

    fn on_error(&self, output: &Path) {
        if output.is_file() {
            if let Err(err) = fs::remove_file(output) {
                warn!("failed to remove partial {}: {err}", output.display());
            }
        }
    }

    async fn write_csv(&self, context: &ScrapingContext, output: &Path) -> anyhow::Result<JobReport> {
        let keyword = self.options.keyword.as_str();
        let per_page = self.settings.per_page;
        info!("exporting listings for {keyword:?} to {}", output.display());

        let mut sink = CsvSink::create(output, self.settings.output_encoding()?)
            .with_context(|| format!("failed to create {}", output.display()))?;
        let mut report = JobReport::default();

        'areas: for area in self.settings.area_list() {
            let mut page = 1;
            let mut rows = 0;
            loop {
                let from = search::page_offset(page, per_page);
                let url = search::search_url(&self.settings.uri, &area, keyword, from)?;
                debug!("fetching {url}");
                let body = context
                    .fetch(&url)
                    .await
                    .with_context(|| format!("failed to fetch {url}"))?;
                let Some(listing) =
                    parse_listing_page(&body).with_context(|| format!("failed to parse {url}"))?
                else {
                    break;
                };

                let scraped_at = format_scraped_at(Utc::now());
                for business in &listing.businesses {
                    sink.write_row(&business.to_row(keyword, &area, &scraped_at))?;
                    rows += 1;
                    report.rows_written += 1;
                    if self.record_limit_reached(report.rows_written) {
                        sink.flush()?;
                        info!("{keyword} ({area}): wrote {rows} rows");
                        info!("record limit of {} reached", report.rows_written);
                        report.areas.push(AreaReport { area, rows });
                        break 'areas;
                    }
                }
                sink.flush()?;

                if search::is_last_page(listing.len(), per_page) {
                    break;
                }
                page += 1;
            }
            info!("{keyword} ({area}): wrote {rows} rows");
            report.areas.push(AreaReport { area, rows });
        }

        sink.finish()?;
        info!(
            "exported {} rows for {keyword:?} to {}",
            report.rows_written,
            output.display()
        );
        Ok(report)
    }

    fn record_limit_reached(&self, written: usize) -> bool {
        self.options
            .records
            .is_some_and(|limit| written >= limit.get())
    }
}

/// Scrape timestamp as written to the CSV, in Japan Standard Time.
pub fn format_scraped_at(now: DateTime<Utc>) -> String {
    now.with_timezone(&jst()).format(SCRAPED_AT_FORMAT).to_string()
}

fn jst() -> FixedOffset {
    FixedOffset::east_opt(JST_OFFSET_SECS).expect("+09:00 is a valid offset")
}
