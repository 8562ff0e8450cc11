use std::{future::Future, path::PathBuf, time::Duration};

use log::{debug, warn};
use reqwest::{
    Client, ClientBuilder, Response,
    header::{CONTENT_TYPE, USER_AGENT},
};
use url::Url;

use crate::{
    error::{Result, ScrapeError},
    ratelimit::RateLimiter,
    user_agent::UserAgent,
};

pub struct RequestClient {
    client: Client,
    rate_limiter: RateLimiter,
    retry: u32,
}

impl RequestClient {
    /// `timeout` bounds each request, `retry` is the number of extra attempts
    /// and `interval` the minimum spacing between any two requests.
    pub fn new(timeout: Duration, retry: u32, interval: Duration) -> Result<Self> {
        let client = ClientBuilder::new().timeout(timeout).build()?;
        let rate_limiter = RateLimiter::new(interval);
        Ok(Self {
            client,
            rate_limiter,
            retry,
        })
    }

    pub async fn fetch_url_response(&self, url: &str) -> Result<Response> {
        // Wait (non-blocking) until we're allowed to make a request according
        // to our self-imposed rate-limiting policy.
        self.rate_limiter.wait_until_ready().await;

        let response = self
            .client
            .get(url)
            .header(USER_AGENT, UserAgent::chrome())
            .header(CONTENT_TYPE, "text/html")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::Status {
                url: url.to_string(),
                status,
            });
        }
        Ok(response)
    }

    /// Body of `url`; `file://` URLs are read from disk.
    pub async fn fetch_url_body(&self, url: &str) -> Result<String> {
        if let Some(path) = local_path(url)? {
            debug!("reading {}", path.display());
            return Ok(tokio::fs::read_to_string(path).await?);
        }
        with_retry(self.retry, url, || async move {
            let response = self.fetch_url_response(url).await?;
            Ok(response.text().await?)
        })
        .await
    }
}

/// Filesystem path of a `file://` URL, `None` for any other scheme.
pub(crate) fn local_path(url: &str) -> Result<Option<PathBuf>> {
    if !url.starts_with("file:") {
        return Ok(None);
    }
    let parsed = Url::parse(url).map_err(|_| ScrapeError::UrlInvalid(url.to_string()))?;
    parsed
        .to_file_path()
        .map(Some)
        .map_err(|_| ScrapeError::UrlInvalid(url.to_string()))
}

/// Runs `attempt` up to `retry + 1` times, returning the first success or the last error.
///
/// Spacing between attempts comes from the caller's rate limiter.
pub(crate) async fn with_retry<T, F, Fut>(retry: u32, url: &str, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut tries = 0;
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) if tries < retry => {
                tries += 1;
                warn!("fetching {url} failed ({err}), retry {tries}/{retry}");
            }
            Err(err) => return Err(err),
        }
    }
}
