use std::time::Duration;

use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use log::info;
use tokio::task::JoinHandle;

use crate::{
    config::BrowserSettings,
    error::{Result, ScrapeError},
    user_agent::UserAgent,
};

/// Chrome driven over the DevTools protocol.
///
/// Every fetch navigates the same tab, so a failed or abandoned navigation
/// never leaves a page behind.
pub struct ChromeDriver {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    // false when attached to a remote instance we must not shut down
    owned: bool,
}

impl ChromeDriver {
    pub async fn launch(
        settings: &BrowserSettings,
        remote_url: Option<&str>,
        display: Option<&str>,
        timeout: Duration,
    ) -> Result<Self> {
        let (browser, mut handler) = if let Some(url) = remote_url {
            info!("connecting to remote Chrome at {url}");
            Browser::connect(url).await.map_err(ScrapeError::browser)?
        } else {
            let mut builder = BrowserConfig::builder()
                .no_sandbox()
                .request_timeout(timeout)
                .arg("--disable-gpu")
                .arg("--disable-dev-shm-usage");
            if !settings.headless {
                builder = builder.with_head();
            }
            if let Some(path) = &settings.chrome_path {
                builder = builder.chrome_executable(path);
            }
            if let Some(display) = display {
                builder = builder.env("DISPLAY", display);
            }
            let config = builder.build().map_err(ScrapeError::Browser)?;
            info!("launching Chrome (headless: {})", settings.headless);
            Browser::launch(config).await.map_err(ScrapeError::browser)?
        };

        // The handler stream must be polled for the browser to make progress.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(err) => {
                handler.abort();
                return Err(ScrapeError::browser(err));
            }
        };

        Ok(Self {
            browser,
            page,
            handler,
            owned: remote_url.is_none(),
        })
    }

    pub async fn page_source(&self, url: &str) -> Result<String> {
        self.page
            .set_user_agent(UserAgent::chrome())
            .await
            .map_err(ScrapeError::browser)?;
        self.page.goto(url).await.map_err(ScrapeError::browser)?;
        self.page.content().await.map_err(ScrapeError::browser)
    }

    #[cfg(test)]
    async fn open_pages(&self) -> Result<usize> {
        Ok(self.browser.pages().await.map_err(ScrapeError::browser)?.len())
    }

    pub async fn close(mut self) -> Result<()> {
        let closed = self.page.close().await.map_err(ScrapeError::browser);
        if self.owned {
            self.browser.close().await.map_err(ScrapeError::browser)?;
            self.browser.wait().await?;
        }
        self.handler.abort();
        closed
    }
}
