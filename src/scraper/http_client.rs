use crate::config::ScraperConfig;
use crate::error::FetchError;
use anyhow::{Context, Result};
use rand::Rng;
use reqwest::header::ACCEPT;
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;
use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, warn};

pub struct HttpClient {
    inner: reqwest::Client,
    config: ScraperConfig,
}

impl HttpClient {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            // Accept cookies so session-gated endpoints keep working
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            inner,
            config: config.clone(),
        })
    }

    /// Fetch a URL as JSON with rate-limiting and retry.
    ///
    /// Throttling, 5xx and connection failures are retried with exponential
    /// backoff (`backoff_ms`, doubling, jittered) up to `max_retries` times.
    /// Other statuses fail immediately.
    pub async fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        self.polite_delay().await;

        let strategy = ExponentialBackoff::from_millis(2)
            .factor((self.config.backoff_ms / 2).max(1))
            .max_delay(Duration::from_secs(30))
            .map(jitter)
            .take(self.config.max_retries as usize);

        let mut attempt = 0u32;
        RetryIf::start(
            strategy,
            || {
                attempt += 1;
                let n = attempt;
                async move {
                    debug!("GET {} (attempt {})", url, n);
                    self.fetch_once(url).await
                }
            },
            |e: &FetchError| {
                let retry = e.is_transient();
                if retry {
                    warn!("{}; backing off", e);
                }
                retry
            },
        )
        .await
    }

    async fn fetch_once(&self, url: &str) -> Result<Value, FetchError> {
        let resp = self
            .inner
            .get(url)
            .header(ACCEPT, "application/json, text/plain, */*")
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = resp.text().await.map_err(|source| FetchError::Request {
            url: url.to_string(),
            source,
        })?;
        debug!("{}: {} bytes", url, body.len());

        serde_json::from_str(&body).map_err(|source| FetchError::Decode {
            url: url.to_string(),
            source,
        })
    }

    /// Sleep for the configured delay + random jitter.
    async fn polite_delay(&self) {
        let jitter = if self.config.jitter_ms > 0 {
            rand::rng().random_range(0..=self.config.jitter_ms)
        } else {
            0
        };
        let total = self.config.request_delay_ms + jitter;
        if total > 0 {
            sleep(Duration::from_millis(total)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_config() -> ScraperConfig {
        ScraperConfig {
            request_delay_ms: 0,
            jitter_ms: 0,
            max_retries: 2,
            backoff_ms: 2,
            timeout_secs: 5,
            ..ScraperConfig::default()
        }
    }

    #[tokio::test]
    async fn test_retries_transient_status_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/2025"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/2025"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [{"rank": "1"}]})))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::new(&fast_config()).unwrap();
        let value = client.get_json(&format!("{}/2025", server.uri())).await.unwrap();
        assert_eq!(value["data"][0]["rank"], "1");
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::new(&fast_config()).unwrap();
        let err = client
            .get_json(&format!("{}/2025/key_statistics", server.uri()))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let client = HttpClient::new(&fast_config()).unwrap();
        let err = client.get_json(&server.uri()).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_bad_json_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>blocked</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::new(&fast_config()).unwrap();
        let err = client.get_json(&server.uri()).await.unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }));
    }
}
