pub mod cleaner;
pub mod http_client;
pub mod parsers;

use crate::config::ScraperConfig;
use crate::error::{FetchError, ScrapeError};
use crate::models::{Category, TableKind};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use self::http_client::HttpClient;

// ── Source trait ──────────────────────────────────────────────────────────────

/// Swappable JSON ranking-table source.
#[async_trait]
pub trait RankingApi: Send + Sync {
    /// Raw payload for one table. `Ok(None)` when the source has no such
    /// table (e.g. no key statistics published for that year).
    async fn fetch_table(
        &self,
        year: i32,
        category: &Category,
        table: TableKind,
    ) -> Result<Option<Value>, ScrapeError>;
}

// ── THE JSON endpoints ────────────────────────────────────────────────────────

pub struct ApiSource {
    client: HttpClient,
    base_url: Url,
}

impl ApiSource {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        // Trailing slash so path segments append instead of replacing.
        let base = format!("{}/", config.api_base_url.trim_end_matches('/'));
        Ok(Self {
            client: HttpClient::new(config)?,
            base_url: Url::parse(&base)
                .with_context(|| format!("Invalid API base URL {}", config.api_base_url))?,
        })
    }

    /// `{base}/{year}[/{subject}][/key_statistics]`
    pub fn table_url(&self, year: i32, category: &Category, table: TableKind) -> Result<Url> {
        let mut path = year.to_string();
        if let Some(slug) = category.subject_slug() {
            path.push('/');
            path.push_str(slug);
        }
        if table == TableKind::KeyStatistics {
            path.push('/');
            path.push_str(table.slug());
        }
        self.base_url
            .join(&path)
            .with_context(|| format!("Cannot build URL for {}", path))
    }
}

#[async_trait]
impl RankingApi for ApiSource {
    async fn fetch_table(
        &self,
        year: i32,
        category: &Category,
        table: TableKind,
    ) -> Result<Option<Value>, ScrapeError> {
        let url = self
            .table_url(year, category, table)
            .map_err(|e| FetchError::InvalidUrl(format!("{:#}", e)))?;
        info!("Fetching {} {} {} ({})", year, category, table.slug(), url);

        match self.client.get_json(url.as_str()).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => {
                debug!("{}", e);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> ApiSource {
        ApiSource::new(&ScraperConfig {
            api_base_url: "https://example.org/json/ranking_tables/world_university_rankings/"
                .into(),
            ..ScraperConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_table_urls() {
        let s = source();
        assert_eq!(
            s.table_url(2025, &Category::General, TableKind::Rankings).unwrap().as_str(),
            "https://example.org/json/ranking_tables/world_university_rankings/2025"
        );
        assert_eq!(
            s.table_url(2025, &Category::General, TableKind::KeyStatistics)
                .unwrap()
                .as_str(),
            "https://example.org/json/ranking_tables/world_university_rankings/2025/key_statistics"
        );
        assert_eq!(
            s.table_url(2024, &Category::Subject("arts-and-humanities".into()), TableKind::Rankings)
                .unwrap()
                .as_str(),
            "https://example.org/json/ranking_tables/world_university_rankings/2024/arts-and-humanities"
        );
    }
}
