use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub run: RunConfig,
}

/// HTTP / API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScraperConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Browser path configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrowserConfig {
    #[serde(default = "default_site_base_url")]
    pub site_base_url: String,

    #[serde(default = "default_true")]
    pub headless: bool,

    /// Page load / CDP command timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Per-tab budget for the scroll/load-more loop.
    #[serde(default = "default_scroll_wait_secs")]
    pub scroll_wait_secs: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Write the data endpoints seen on each page to `api_endpoints_{year}.txt`.
    #[serde(default)]
    pub save_endpoints: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunConfig {
    #[serde(default = "default_years")]
    pub years: Vec<i32>,

    /// Subject slugs scraped in addition to the general table (API path only).
    #[serde(default)]
    pub subjects: Vec<String>,

    /// Test-mode cap on rows per table.
    #[serde(default)]
    pub limit: Option<usize>,

    /// Known full-dataset sizes, keyed by year. String keys so TOML tables
    /// (`[run.full_counts]`) deserialize.
    #[serde(default = "default_full_counts")]
    pub full_counts: BTreeMap<String, usize>,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_api_base_url() -> String {
    "https://www.timeshighereducation.com/json/ranking_tables/world_university_rankings"
        .to_string()
}
fn default_site_base_url() -> String {
    "https://www.timeshighereducation.com".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_request_delay_ms() -> u64 {
    1000
}
fn default_jitter_ms() -> u64 {
    250
}
fn default_max_retries() -> u32 {
    3
}
fn default_backoff_ms() -> u64 {
    500
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 13_5_2) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36"
        .to_string()
}
fn default_true() -> bool {
    true
}
fn default_scroll_wait_secs() -> u64 {
    120
}
fn default_poll_interval_ms() -> u64 {
    2000
}
fn default_out_dir() -> PathBuf {
    PathBuf::from("outputs")
}
fn default_years() -> Vec<i32> {
    vec![2026]
}
fn default_full_counts() -> BTreeMap<String, usize> {
    [(2024, 2671), (2025, 2855), (2026, 2191)]
        .into_iter()
        .map(|(year, count)| (year.to_string(), count))
        .collect()
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            timeout_secs: default_timeout_secs(),
            request_delay_ms: default_request_delay_ms(),
            jitter_ms: default_jitter_ms(),
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            site_base_url: default_site_base_url(),
            headless: true,
            timeout_secs: default_timeout_secs(),
            scroll_wait_secs: default_scroll_wait_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            save_endpoints: false,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { out_dir: default_out_dir() }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            years: default_years(),
            subjects: Vec::new(),
            limit: None,
            full_counts: default_full_counts(),
        }
    }
}

// ── Derived values ───────────────────────────────────────────────────────────

impl BrowserConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn scroll_wait(&self) -> Duration {
        Duration::from_secs(self.scroll_wait_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl RunConfig {
    /// Row target for one year: the test-mode limit wins, otherwise the known
    /// full-dataset size. `None` means "as many as the source gives".
    pub fn row_target(&self, year: i32) -> Option<usize> {
        self.limit
            .or_else(|| self.full_counts.get(&year.to_string()).copied())
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("THE").separator("__"))
            .build()?;

        cfg.try_deserialize().context("Invalid configuration")
    }
}
