//! Network capture: the rankings page fills its tables from XHR JSON, so the
//! driver records those response bodies while the page loads. The DOM is the
//! fallback when nothing usable comes over the wire.

use crate::error::{FetchError, ScrapeError};
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventLoadingFinished, EventResponseReceived, GetResponseBodyParams,
};
use futures::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

/// One JSON response body seen on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedResponse {
    pub url: String,
    pub body: Value,
}

pub type CaptureStore = Arc<Mutex<Vec<CapturedResponse>>>;

const TRACKING_HINTS: &[&str] = &[
    "facebook.com/tr",
    "google-analytics",
    "googletagmanager",
    "gtag",
    "doubleclick.net",
    "analytics.",
    "/pixel",
    "/track",
    "/beacon",
    "cookiebot",
    "hotjar",
    "mixpanel",
    "segment.io",
    "linkedin.com/px",
    "recaptcha",
    "rubiconproject.com",
    "smartadserver.com",
];

const STATIC_SUFFIXES: &[&str] = &[".js", ".css", ".svg", ".png", ".jpg", ".gif", ".woff2"];

const DATA_HINTS: &[&str] = &[
    "/ranking",
    "/data",
    ".json",
    "/api/",
    "/ajax",
    "/datatable",
    "/load",
    "world-ranking",
];

/// Whether a response looks like table data rather than tracking or assets.
pub fn is_data_endpoint(url: &str, status: i64, mime_type: &str) -> bool {
    if status != 200 {
        return false;
    }
    let url = url.to_lowercase();
    let path = url.split(['?', '#']).next().unwrap_or(&url);

    if TRACKING_HINTS.iter().any(|t| url.contains(t)) {
        return false;
    }
    if STATIC_SUFFIXES.iter().any(|ext| path.ends_with(ext)) {
        return false;
    }
    mime_type.contains("json") || DATA_HINTS.iter().any(|h| url.contains(h))
}

/// Distinct URLs in capture order.
pub fn endpoint_urls(captured: &[CapturedResponse]) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for c in captured {
        if !urls.contains(&c.url) {
            urls.push(c.url.clone());
        }
    }
    urls
}

fn cdp_err(e: impl std::fmt::Display) -> ScrapeError {
    ScrapeError::Fetch(FetchError::Browser(e.to_string()))
}

/// Enable the network domain and start recording JSON bodies into `store`.
/// Bodies are fetched once loading finishes; before that CDP has none.
pub async fn start(page: &Page, store: CaptureStore) -> Result<Vec<JoinHandle<()>>, ScrapeError> {
    page.execute(EnableParams::default()).await.map_err(cdp_err)?;

    let mut responses = page
        .event_listener::<EventResponseReceived>()
        .await
        .map_err(cdp_err)?;
    let mut finished = page
        .event_listener::<EventLoadingFinished>()
        .await
        .map_err(cdp_err)?;

    // request id → url, for responses worth reading
    let pending: Arc<Mutex<HashMap<String, String>>> = Arc::default();

    let watch = {
        let pending = Arc::clone(&pending);
        tokio::spawn(async move {
            while let Some(event) = responses.next().await {
                let response = &event.response;
                if !is_data_endpoint(&response.url, response.status, &response.mime_type) {
                    continue;
                }
                debug!("Data response: {}", response.url);
                if let Ok(mut pending) = pending.lock() {
                    pending.insert(event.request_id.as_ref().to_string(), response.url.clone());
                }
            }
        })
    };

    let read = {
        let page = page.clone();
        tokio::spawn(async move {
            while let Some(event) = finished.next().await {
                let url = match pending.lock() {
                    Ok(mut pending) => pending.remove(event.request_id.as_ref()),
                    Err(_) => None,
                };
                let Some(url) = url else { continue };

                let body = match page
                    .execute(GetResponseBodyParams::new(event.request_id.clone()))
                    .await
                {
                    Ok(resp) if !resp.result.base64_encoded => resp.result.body.clone(),
                    Ok(_) => {
                        debug!("Skipping binary body from {}", url);
                        continue;
                    }
                    Err(e) => {
                        debug!("No body for {}: {}", url, e);
                        continue;
                    }
                };

                match serde_json::from_str::<Value>(&body) {
                    Ok(body) => {
                        if let Ok(mut store) = store.lock() {
                            store.push(CapturedResponse { url, body });
                        }
                    }
                    Err(_) => debug!("Not JSON: {} ({} bytes)", url, body.len()),
                }
            }
        })
    };

    Ok(vec![watch, read])
}
