use std::time::Duration;
use thiserror::Error;

/// Failure taxonomy for a single extraction unit.
///
/// Only [`ScrapeError::Fetch`] ends a unit without output; everything else is
/// recovered by the pipeline.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("section '{0}' not found")]
    NotFound(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("could not parse {field} from {value:?}")]
    Parse { field: &'static str, value: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid JSON from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("browser: {0}")]
    Browser(String),
}

impl FetchError {
    /// Conditions worth another attempt: throttling, server errors and
    /// connection-level failures.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::Request { source, .. } => {
                source.is_timeout() || source.is_connect() || source.is_request()
            }
            FetchError::Decode { .. } | FetchError::InvalidUrl(_) | FetchError::Browser(_) => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::Status { status: 404, .. })
    }
}
