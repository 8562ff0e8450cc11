use std::{net::TcpListener, process::Stdio, time::Duration};

use log::{debug, info};
use reqwest::{Client, Method, Response};
use serde_json::{Value, json};
use tokio::process::{Child, Command};

use crate::{
    config::BrowserSettings,
    error::{Result, ScrapeError},
    user_agent::UserAgent,
};

const READY_POLL: Duration = Duration::from_millis(100);

/// Firefox through geckodriver, spoken to with the W3C WebDriver protocol.
pub struct GeckoDriver {
    http: Client,
    base: String,
    session_id: String,
    _driver: Option<Child>,
}

impl GeckoDriver {
    pub async fn launch(
        settings: &BrowserSettings,
        display: Option<&str>,
        timeout: Duration,
    ) -> Result<Self> {
        let port = free_port()?;
        let mut command = Command::new(&settings.geckodriver_path);
        command
            .arg("--port")
            .arg(port.to_string())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(display) = display {
            command.env("DISPLAY", display);
        }
        info!("starting {} on port {port}", settings.geckodriver_path);
        let driver = command.spawn()?;

        let base = format!("http://127.0.0.1:{port}");
        let http = Client::builder().timeout(timeout).build()?;
        tokio::time::timeout(timeout, wait_until_ready(&http, &base))
            .await
            .map_err(|_| ScrapeError::Browser("geckodriver did not become ready".to_string()))??;

        let session_id = new_session(&http, &base, settings.headless).await?;
        debug!("WebDriver session {session_id}");
        let gecko = Self {
            http,
            base,
            session_id,
            _driver: Some(driver),
        };
        gecko
            .command(
                Method::POST,
                "timeouts",
                Some(json!({ "pageLoad": timeout.as_millis() as u64 })),
            )
            .await?;
        Ok(gecko)
    }

    pub async fn page_source(&self, url: &str) -> Result<String> {
        self.command(Method::POST, "url", Some(json!({ "url": url })))
            .await?;
        let source = self.command(Method::GET, "source", None).await?;
        source
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| ScrapeError::Browser("page source is not a string".to_string()))
    }

    /// Ends the session; geckodriver itself is killed on drop.
    pub async fn close(self) -> Result<()> {
        let url = format!("{}/session/{}", self.base, self.session_id);
        read_value(self.http.delete(url).send().await?).await?;
        Ok(())
    }

    /// A driver for an already running session, with no geckodriver process of its own.
    #[cfg(test)]
    pub(crate) fn attached(base: String, session_id: &str, timeout: Duration) -> Self {
        Self {
            http: Client::builder().timeout(timeout).build().unwrap(),
            base,
            session_id: session_id.to_string(),
            _driver: None,
        }
    }

    async fn command(&self, method: Method, endpoint: &str, body: Option<Value>) -> Result<Value> {
        let url = format!("{}/session/{}/{endpoint}", self.base, self.session_id);
        let request = self.http.request(method, url);
        let request = match body {
            Some(body) => request.json(&body),
            None => request,
        };
        read_value(request.send().await?).await
    }
}

fn free_port() -> Result<u16> {
    let listener = TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}

async fn wait_until_ready(http: &Client, base: &str) -> Result<()> {
    loop {
        if let Ok(response) = http.get(format!("{base}/status")).send().await {
            if let Ok(status) = read_value(response).await {
                if status.get("ready").and_then(Value::as_bool) == Some(true) {
                    return Ok(());
                }
            }
        }
        tokio::time::sleep(READY_POLL).await;
    }
}

pub(crate) fn capabilities(headless: bool, user_agent: &str) -> Value {
    let args: Vec<&str> = if headless { vec!["-headless"] } else { vec![] };
    json!({
        "capabilities": {
            "alwaysMatch": {
                "browserName": "firefox",
                "moz:firefoxOptions": {
                    "args": args,
                    "prefs": { "general.useragent.override": user_agent }
                }
            }
        }
    })
}

async fn new_session(http: &Client, base: &str, headless: bool) -> Result<String> {
    let response = http
        .post(format!("{base}/session"))
        .json(&capabilities(headless, UserAgent::firefox()))
        .send()
        .await?;
    let value = read_value(response).await?;
    value
        .get("sessionId")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| ScrapeError::Browser("no sessionId in new session response".to_string()))
}

/// The `value` member of a WebDriver response; error responses become [`ScrapeError::Browser`].
async fn read_value(response: Response) -> Result<Value> {
    let status = response.status();
    let mut body: Value = response.json().await?;
    let value = body.get_mut("value").map(Value::take).unwrap_or(Value::Null);
    if !status.is_success() {
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown WebDriver error");
        return Err(ScrapeError::Browser(format!("WebDriver {status}: {message}")));
    }
    Ok(value)
}
