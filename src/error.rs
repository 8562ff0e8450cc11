use thiserror::Error;

/// Everything that can go wrong while fetching, parsing or exporting listings.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("the supplied URL is not valid: {0}")]
    UrlInvalid(String),

    #[error("{url} answered with HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("malformed listing data: {0}")]
    Listing(#[from] serde_json::Error),

    #[error("browser: {0}")]
    Browser(String),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("cannot encode {text:?} as {encoding}")]
    Encoding {
        text: String,
        encoding: &'static str,
    },

    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = ScrapeError> = std::result::Result<T, E>;

impl ScrapeError {
    pub(crate) fn browser(err: impl std::fmt::Display) -> Self {
        ScrapeError::Browser(err.to_string())
    }
}
