mod chrome;
mod display;
mod firefox;

use std::time::Duration;

use clap::ValueEnum;
use log::info;

pub use chrome::ChromeDriver;
pub use display::VirtualDisplay;
pub use firefox::GeckoDriver;

use crate::{
    config::BrowserSettings,
    error::{Result, ScrapeError},
    ratelimit::RateLimiter,
    requests::with_retry,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum BrowserKind {
    #[default]
    Chrome,
    Firefox,
}

enum Driver {
    Chrome(ChromeDriver),
    Firefox(GeckoDriver),
}

/// Launch options that don't come from the settings files.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub timeout: Duration,
    pub retry: u32,
    pub interval: Duration,
    pub remote_debugging_url: Option<String>,
}

/// A running browser plus, optionally, the virtual display it renders to.
pub struct BrowserSession {
    driver: Driver,
    rate_limiter: RateLimiter,
    timeout: Duration,
    retry: u32,
    // Dropped after the driver, taking Xvfb down with it.
    _display: Option<VirtualDisplay>,
}

impl BrowserSession {
    pub async fn launch(
        kind: BrowserKind,
        settings: &BrowserSettings,
        options: LaunchOptions,
    ) -> Result<Self> {
        let display = if settings.virtual_display {
            Some(VirtualDisplay::start(&settings.display).await?)
        } else {
            None
        };
        let display_name = display.as_ref().map(VirtualDisplay::display);

        let driver = match kind {
            BrowserKind::Chrome => Driver::Chrome(
                ChromeDriver::launch(
                    settings,
                    options.remote_debugging_url.as_deref(),
                    display_name,
                    options.timeout,
                )
                .await?,
            ),
            BrowserKind::Firefox => Driver::Firefox(
                GeckoDriver::launch(settings, display_name, options.timeout).await?,
            ),
        };
        info!("{kind:?} session ready");

        Ok(Self {
            driver,
            rate_limiter: RateLimiter::new(options.interval),
            timeout: options.timeout,
            retry: options.retry,
            _display: display,
        })
    }

    /// Navigates to `url` and returns the rendered document.
    pub async fn fetch_page_source(&self, url: &str) -> Result<String> {
        with_retry(self.retry, url, || async move {
            self.rate_limiter.wait_until_ready().await;
            let navigation = async {
                match &self.driver {
                    Driver::Chrome(chrome) => chrome.page_source(url).await,
                    Driver::Firefox(gecko) => gecko.page_source(url).await,
                }
            };
            tokio::time::timeout(self.timeout, navigation)
                .await
                .map_err(|_| ScrapeError::Timeout(self.timeout))?
        })
        .await
    }

    pub async fn close(self) -> Result<()> {
        match self.driver {
            Driver::Chrome(chrome) => chrome.close().await,
            Driver::Firefox(gecko) => gecko.close().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    fn firefox_session(server: &MockServer, timeout: Duration, retry: u32) -> BrowserSession {
        BrowserSession {
            driver: Driver::Firefox(GeckoDriver::attached(
                server.uri(),
                "abc",
                Duration::from_secs(30),
            )),
            rate_limiter: RateLimiter::new(Duration::ZERO),
            timeout,
            retry,
            _display: None,
        }
    }

    async fn mount_source(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/session/abc/source"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "value": "<html></html>" })),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn slow_navigation_times_out_after_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/session/abc/url"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "value": null }))
                    .set_delay(Duration::from_secs(10)),
            )
            .mount(&server)
            .await;
        mount_source(&server).await;

        let session = firefox_session(&server, Duration::from_millis(200), 1);
        let err = session
            .fetch_page_source("https://example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::Timeout(timeout) if timeout == Duration::from_millis(200)));
        let navigations = server.received_requests().await.unwrap();
        assert_eq!(navigations.len(), 2);
    }

    #[tokio::test]
    async fn failed_navigation_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/session/abc/url"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "value": { "error": "unknown error", "message": "net error" }
            })))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/session/abc/url"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": null })))
            .mount(&server)
            .await;
        mount_source(&server).await;

        let session = firefox_session(&server, Duration::from_secs(5), 1);
        let html = session.fetch_page_source("https://example.com").await.unwrap();
        assert_eq!(html, "<html></html>");
    }

    #[tokio::test]
    async fn navigation_error_surfaces_without_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/session/abc/url"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "value": { "error": "unknown error", "message": "net error" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = firefox_session(&server, Duration::from_secs(5), 0);
        let err = session.fetch_page_source("https://example.com").await.unwrap_err();
        assert!(err.to_string().contains("net error"));
    }

    #[test]
    fn browser_kind_parses_from_cli_names() {
        assert_eq!(BrowserKind::from_str("chrome", true).unwrap(), BrowserKind::Chrome);
        assert_eq!(BrowserKind::from_str("Firefox", true).unwrap(), BrowserKind::Firefox);
        assert!(BrowserKind::from_str("safari", true).is_err());
        assert_eq!(BrowserKind::default(), BrowserKind::Chrome);
    }
}
