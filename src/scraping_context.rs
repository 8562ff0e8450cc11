use std::time::Duration;

use clap::ValueEnum;
use log::warn;

use crate::{
    browser::{BrowserKind, BrowserSession, LaunchOptions},
    config::{RuntimeEnv, Settings},
    error::Result,
    requests::RequestClient,
};

/// How result pages are fetched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Engine {
    /// Plain HTTP requests.
    #[default]
    Http,
    /// A headless browser, for pages rendered by script.
    Browser,
}

pub enum PageFetcher {
    Http(RequestClient),
    Browser(BrowserSession),
}

impl PageFetcher {
    pub async fn fetch(&self, url: &str) -> Result<String> {
        match self {
            PageFetcher::Http(client) => client.fetch_url_body(url).await,
            PageFetcher::Browser(session) => session.fetch_page_source(url).await,
        }
    }
}

/// Everything one scraping run needs to fetch pages.
pub struct ScrapingContext {
    pub fetcher: PageFetcher,
}

impl ScrapingContext {
    pub async fn new(
        settings: &Settings,
        runtime: &RuntimeEnv,
        engine: Engine,
        browser: BrowserKind,
        timeout: Duration,
        retry: u32,
    ) -> Result<Self> {
        let interval = Duration::from_secs(settings.interval_secs);
        let fetcher = match engine {
            Engine::Http => PageFetcher::Http(RequestClient::new(timeout, retry, interval)?),
            Engine::Browser => {
                let options = LaunchOptions {
                    timeout,
                    retry,
                    interval,
                    remote_debugging_url: runtime.chromium_remote_debugging_url.clone(),
                };
                PageFetcher::Browser(BrowserSession::launch(browser, &settings.browser, options).await?)
            }
        };
        Ok(ScrapingContext { fetcher })
    }

    pub async fn fetch(&self, url: &str) -> Result<String> {
        self.fetcher.fetch(url).await
    }

    /// Shuts the browser down, if one was started.
    pub async fn close(self) {
        if let PageFetcher::Browser(session) = self.fetcher {
            if let Err(err) = session.close().await {
                warn!("failed to close browser cleanly: {err}");
            }
        }
    }
}
