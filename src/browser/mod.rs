//! Browser half of the HTML path: a small driver trait the pipeline talks to,
//! and a Chrome implementation over CDP.

pub mod capture;

use crate::config::BrowserConfig;
use crate::error::{FetchError, ScrapeError};
use crate::loader::RowProbe;
use anyhow::Result;
use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig as CdpConfig};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use self::capture::{CaptureStore, CapturedResponse};

/// Operations the HTML path needs from a rendered page.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn open(&self, url: &str) -> Result<(), ScrapeError>;

    /// Click the tab whose visible text is `label`. `false` if no such tab.
    async fn activate_tab(&self, label: &str) -> Result<bool, ScrapeError>;

    /// Scroll to the bottom and press any "load more" / "show all" control.
    async fn load_more(&self) -> Result<(), ScrapeError>;

    /// Body rows of the largest visible table.
    async fn count_rows(&self) -> Result<usize, ScrapeError>;

    /// Current DOM serialized as HTML.
    async fn content(&self) -> Result<String, ScrapeError>;

    /// JSON bodies of data requests made since the last `open`.
    async fn captured_json(&self) -> Result<Vec<CapturedResponse>, ScrapeError> {
        Ok(Vec::new())
    }
}

/// Adapts a driver to the loader's probe interface.
pub struct DriverProbe<'a>(pub &'a dyn PageDriver);

#[async_trait]
impl RowProbe for DriverProbe<'_> {
    async fn trigger_load(&self) -> Result<()> {
        Ok(self.0.load_more().await?)
    }

    async fn count_rows(&self) -> Result<usize> {
        Ok(self.0.count_rows().await?)
    }
}

// ── Page scripts ──────────────────────────────────────────────────────────────

const HIDE_WEBDRIVER_JS: &str =
    "Object.defineProperty(navigator, 'webdriver', { get: () => undefined });";

fn activate_tab_js(label: &str) -> String {
    // serde_json gives a correctly escaped JS string literal.
    let label = serde_json::Value::String(label.to_lowercase()).to_string();
    format!(
        r#"(() => {{
            const want = {label};
            const norm = s => (s || '').replace(/\s+/g, ' ').trim().toLowerCase();
            // Real tabs first; a nav link with the same text would navigate away.
            for (const sel of ['[role=tab]', 'button, label', 'a, li']) {{
                for (const el of document.querySelectorAll(sel)) {{
                    if (norm(el.innerText) === want) {{ el.click(); return true; }}
                }}
            }}
            return false;
        }})()"#
    )
}

const LOAD_MORE_JS: &str = r#"(() => {
    window.scrollTo(0, document.body.scrollHeight);
    for (const sel of document.querySelectorAll('select')) {
        const all = Array.from(sel.options).find(o => /^\s*all\s*$/i.test(o.text));
        if (all && sel.value !== all.value) {
            sel.value = all.value;
            sel.dispatchEvent(new Event('change', { bubbles: true }));
        }
    }
    const more = Array.from(document.querySelectorAll('button, a'))
        .find(el => /^(load|show) (more|all)/i.test((el.innerText || '').trim()));
    if (more) { more.click(); }
    return true;
})()"#;

const COUNT_ROWS_JS: &str = r#"(() => {
    const visible = Array.from(document.querySelectorAll('table'))
        .filter(t => t.offsetParent !== null);
    return visible.reduce((max, t) => Math.max(max, t.querySelectorAll('tbody tr').length), 0);
})()"#;

// ── Chrome ────────────────────────────────────────────────────────────────────

pub struct ChromeDriver {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    capture_tasks: Vec<JoinHandle<()>>,
    captured: CaptureStore,
    timeout: Duration,
}

fn cdp_err(e: impl std::fmt::Display) -> ScrapeError {
    ScrapeError::Fetch(FetchError::Browser(e.to_string()))
}

impl ChromeDriver {
    pub async fn launch(config: &BrowserConfig) -> Result<Self, ScrapeError> {
        let mut builder = CdpConfig::builder()
            .window_size(1920, 1080)
            .request_timeout(config.timeout())
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--no-sandbox");
        if !config.headless {
            builder = builder.with_head();
        }
        let cdp_config = builder.build().map_err(cdp_err)?;

        info!("Launching Chrome (headless: {})", config.headless);
        let (browser, mut events) = Browser::launch(cdp_config).await.map_err(cdp_err)?;

        let handler = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser.new_page("about:blank").await.map_err(cdp_err)?;
        page.evaluate_on_new_document(AddScriptToEvaluateOnNewDocumentParams::new(
            HIDE_WEBDRIVER_JS,
        ))
        .await
        .map_err(cdp_err)?;

        let captured = CaptureStore::default();
        let capture_tasks = capture::start(&page, Arc::clone(&captured)).await?;

        Ok(Self {
            browser,
            page,
            handler,
            capture_tasks,
            captured,
            timeout: config.timeout(),
        })
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, ScrapeError>
    where
        F: Future<Output = Result<T, ScrapeError>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| ScrapeError::Timeout(self.timeout))?
    }

    async fn eval<T: DeserializeOwned>(&self, js: &str) -> Result<T, ScrapeError> {
        self.bounded(async {
            let result = self.page.evaluate(js).await.map_err(cdp_err)?;
            result.into_value::<T>().map_err(cdp_err)
        })
        .await
    }

    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Chrome did not close cleanly: {}", e);
        }
        for task in &self.capture_tasks {
            task.abort();
        }
        self.handler.abort();
    }
}

#[async_trait]
impl PageDriver for ChromeDriver {
    async fn open(&self, url: &str) -> Result<(), ScrapeError> {
        debug!("Opening {}", url);
        if let Ok(mut captured) = self.captured.lock() {
            captured.clear();
        }
        self.bounded(async {
            self.page.goto(url).await.map_err(cdp_err)?;
            self.page.wait_for_navigation().await.map_err(cdp_err)?;
            Ok(())
        })
        .await
    }

    async fn activate_tab(&self, label: &str) -> Result<bool, ScrapeError> {
        self.eval(&activate_tab_js(label)).await
    }

    async fn load_more(&self) -> Result<(), ScrapeError> {
        self.eval::<bool>(LOAD_MORE_JS).await.map(|_| ())
    }

    async fn count_rows(&self) -> Result<usize, ScrapeError> {
        self.eval(COUNT_ROWS_JS).await
    }

    async fn content(&self) -> Result<String, ScrapeError> {
        self.bounded(async { self.page.content().await.map_err(cdp_err) })
            .await
    }

    async fn captured_json(&self) -> Result<Vec<CapturedResponse>, ScrapeError> {
        self.captured
            .lock()
            .map(|captured| captured.clone())
            .map_err(|_| cdp_err("capture store poisoned"))
    }
}
