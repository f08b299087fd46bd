//! Pipeline orchestrator: ties fetch → locate → load → clean → write together.
//!
//! ## Run modes
//!
//! `run_api()` — JSON endpoints, partitioned output:
//!   every year × (general + configured subjects) × (rankings, key statistics).
//!
//! `run_browser()` — rendered rankings page, flat output:
//!   every year × (rankings, key statistics); subjects are not reachable here.
//!
//! Units run strictly one after another. A unit that fails is reported and the
//! batch moves on; a table that is missing still gets a header-only file.

use crate::browser::capture::{CapturedResponse, endpoint_urls};
use crate::browser::{DriverProbe, PageDriver};
use crate::config::AppConfig;
use crate::error::ScrapeError;
use crate::loader::{ExtractionSession, IncrementalLoader, Pause};
use crate::models::{Category, Extraction, RawRow, TableKind, UnitKey};
use crate::scraper::RankingApi;
use crate::scraper::cleaner::{CleanStats, clean_key_stat_rows, clean_ranking_rows};
use crate::scraper::parsers::{locate_html_table, locate_json_rows};
use crate::storage::{Layout, OutputWriter};
use crate::utils::fmt_number;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fmt;
use tracing::{error, info, warn};

// ── Reports ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitStatus {
    Complete,
    /// `requested: None` when the load timed out with no known total.
    Partial {
        obtained: usize,
        requested: Option<usize>,
    },
    NotFound,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct UnitReport {
    pub key: UnitKey,
    pub status: UnitStatus,
    pub rows_written: usize,
    pub rows_skipped: usize,
    pub warnings: Vec<String>,
}

impl UnitReport {
    fn new(key: UnitKey) -> Self {
        Self {
            key,
            status: UnitStatus::Complete,
            rows_written: 0,
            rows_skipped: 0,
            warnings: Vec::new(),
        }
    }

    fn warn(&mut self, message: String) {
        warn!("{}: {}", self.key, message);
        self.warnings.push(message);
    }

    /// ✓ when at least 90% of the requested rows arrived.
    pub fn mark(&self) -> char {
        match &self.status {
            UnitStatus::Complete => '✓',
            UnitStatus::Partial {
                obtained,
                requested: Some(requested),
            } if obtained * 10 >= requested * 9 => '✓',
            UnitStatus::Partial { .. } | UnitStatus::NotFound => '⚠',
            UnitStatus::Failed(_) => '✗',
        }
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitStatus::Complete => f.write_str("complete"),
            UnitStatus::Partial {
                obtained,
                requested: Some(requested),
            } => write!(f, "partial {}/{}", obtained, requested),
            UnitStatus::Partial {
                obtained,
                requested: None,
            } => write!(f, "partial {} (timed out)", obtained),
            UnitStatus::NotFound => f.write_str("not found"),
            UnitStatus::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub units: Vec<UnitReport>,
}

impl RunSummary {
    pub fn rows_written(&self) -> usize {
        self.units.iter().map(|u| u.rows_written).sum()
    }

    pub fn failed(&self) -> usize {
        self.units
            .iter()
            .filter(|u| matches!(u.status, UnitStatus::Failed(_)))
            .count()
    }

    pub fn log(&self) {
        info!("=== Run summary ({} units) ===", self.units.len());
        for unit in &self.units {
            info!(
                "{} {:<40} {:>8} rows | {} skipped | {}",
                unit.mark(),
                unit.key.to_string(),
                fmt_number(unit.rows_written),
                unit.rows_skipped,
                unit.status,
            );
            for w in &unit.warnings {
                info!("    - {}", w);
            }
        }
        let took = self.finished_at - self.started_at;
        info!(
            "=== Done: {} rows | {} failed | {} → {} ({}s) ===",
            fmt_number(self.rows_written()),
            self.failed(),
            self.started_at.format("%H:%M:%S"),
            self.finished_at.format("%H:%M:%S"),
            took.num_seconds(),
        );
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

pub struct Pipeline {
    config: AppConfig,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub async fn run_api(&self, api: &dyn RankingApi) -> Result<RunSummary> {
        let started_at = Utc::now();
        let writer = OutputWriter::new(&self.config.output.out_dir, Layout::Partitioned);
        let mut units = Vec::new();

        let mut categories = vec![Category::General];
        categories.extend(self.config.run.subjects.iter().cloned().map(Category::Subject));

        for &year in &self.config.run.years {
            for category in &categories {
                for table in TableKind::ALL {
                    let key = UnitKey {
                        year,
                        category: category.clone(),
                        table,
                    };
                    let report = match self.api_unit(api, &writer, key.clone()).await {
                        Ok(report) => report,
                        Err(e) => failed(key, e),
                    };
                    units.push(report);
                }
            }
        }

        Ok(RunSummary {
            started_at,
            finished_at: Utc::now(),
            units,
        })
    }

    async fn api_unit(
        &self,
        api: &dyn RankingApi,
        writer: &OutputWriter,
        key: UnitKey,
    ) -> Result<UnitReport> {
        let mut report = UnitReport::new(key);
        let key = &report.key;

        let payload = api
            .fetch_table(key.year, &key.category, key.table)
            .await
            .with_context(|| format!("fetch {}", key))?;

        let extraction = match payload.and_then(|v| locate_json_rows(&v, key.table)) {
            Some(rows) => classify(self.cap(rows), self.config.run.limit, false),
            None => Extraction::NotFound,
        };

        self.finish(writer, extraction, &mut report)?;
        Ok(report)
    }

    pub async fn run_browser(
        &self,
        driver: &dyn PageDriver,
        pause: &dyn Pause,
    ) -> Result<RunSummary> {
        let started_at = Utc::now();
        let writer = OutputWriter::new(&self.config.output.out_dir, Layout::Flat);
        let mut units = Vec::new();

        if !self.config.run.subjects.is_empty() {
            warn!(
                "Subject tables are only reachable through the API; ignoring {} subjects",
                self.config.run.subjects.len()
            );
        }

        for &year in &self.config.run.years {
            let url = format!(
                "{}/world-university-rankings/{}/world-ranking",
                self.config.browser.site_base_url.trim_end_matches('/'),
                year
            );
            info!("Opening {} rankings page: {}", year, url);
            let opened = driver.open(&url).await;

            for table in TableKind::ALL {
                let key = UnitKey {
                    year,
                    category: Category::General,
                    table,
                };
                let report = match &opened {
                    Ok(()) => match self.browser_unit(driver, pause, &writer, key.clone()).await {
                        Ok(report) => report,
                        Err(e) => failed(key, e),
                    },
                    Err(e) => failed(key, anyhow::anyhow!("open {}: {}", url, e)),
                };
                units.push(report);
            }

            if self.config.browser.save_endpoints && opened.is_ok() {
                save_endpoints(driver, &writer, year).await;
            }
        }

        Ok(RunSummary {
            started_at,
            finished_at: Utc::now(),
            units,
        })
    }

    async fn browser_unit(
        &self,
        driver: &dyn PageDriver,
        pause: &dyn Pause,
        writer: &OutputWriter,
        key: UnitKey,
    ) -> Result<UnitReport> {
        let mut report = UnitReport::new(key);
        let (year, table) = (report.key.year, report.key.table);
        let target = self.config.run.row_target(year);
        let mut timed_out = false;

        match driver.activate_tab(table.label()).await {
            Ok(true) => {
                let browser = &self.config.browser;
                let session =
                    ExtractionSession::new(target, browser.poll_interval(), browser.scroll_wait());
                let probe = DriverProbe(driver);
                let outcome = IncrementalLoader::new(&probe, pause).run(session).await;
                info!("{}: {} rows visible", report.key, outcome.progress());
                if let Some(reason) = &outcome.interrupted {
                    report.warn(format!("row loading stopped early: {}", reason));
                }
                timed_out = outcome.timed_out();
            }
            // Still worth locating: the table may be rendered without a tab.
            Ok(false) => report.warn(format!("no '{}' tab on the page", table.label())),
            Err(e) => report.warn(format!("could not activate '{}' tab: {}", table.label(), e)),
        }

        let captured = match driver.captured_json().await {
            Ok(captured) => best_captured_rows(&captured, table),
            Err(e) => {
                report.warn(format!("network capture unavailable: {}", e));
                None
            }
        };

        let extraction = match captured {
            Some(rows) if rows.len() >= MIN_CAPTURED_ROWS => {
                info!("{}: {} rows from network capture", report.key, rows.len());
                classify(self.cap(rows), target, false)
            }
            captured => {
                let dom = match driver.content().await {
                    Ok(html) => locate_html_table(&html, table),
                    Err(e) if captured.is_some() => {
                        report.warn(format!("could not read page: {}", e));
                        None
                    }
                    Err(e) => {
                        return Err(anyhow::Error::new(e)
                            .context(format!("read page for {}", report.key)));
                    }
                };
                // The rendered table is only as complete as the load loop got it.
                match (dom, captured) {
                    (Some(dom), Some(net)) if net.len() > dom.len() => {
                        classify(self.cap(net), target, false)
                    }
                    (Some(dom), _) => classify(self.cap(dom), target, timed_out),
                    (None, Some(net)) => classify(self.cap(net), target, false),
                    (None, None) => Extraction::NotFound,
                }
            }
        };

        self.finish(writer, extraction, &mut report)?;
        Ok(report)
    }

    fn cap(&self, mut rows: Vec<RawRow>) -> Vec<RawRow> {
        if let Some(limit) = self.config.run.limit {
            rows.truncate(limit);
        }
        rows
    }

    /// Normalize and write one unit's rows, filling in the report.
    fn finish(
        &self,
        writer: &OutputWriter,
        extraction: Extraction,
        report: &mut UnitReport,
    ) -> Result<()> {
        let key = report.key.clone();

        let raws = match extraction {
            Extraction::NotFound => {
                writer.write_empty(&key)?;
                report.status = UnitStatus::NotFound;
                report.warn(format!(
                    "{}; wrote header-only output",
                    ScrapeError::NotFound(key.table.label().to_string())
                ));
                return Ok(());
            }
            Extraction::Partial { rows, requested } => {
                report.status = UnitStatus::Partial {
                    obtained: rows.len(),
                    requested,
                };
                match requested {
                    Some(requested) => {
                        report.warn(format!("only {}/{} rows obtained", rows.len(), requested))
                    }
                    None => report.warn(format!(
                        "row loading timed out before the count settled; kept {} rows",
                        rows.len()
                    )),
                }
                rows
            }
            Extraction::Success(rows) => rows,
        };

        let (written, stats) = match key.table {
            TableKind::Rankings => {
                let (rows, stats) = clean_ranking_rows(key.year, &raws);
                writer.write(&key, &rows)?;
                (rows.len(), stats)
            }
            TableKind::KeyStatistics => {
                let (rows, stats) = clean_key_stat_rows(key.year, &raws);
                writer.write(&key, &rows)?;
                (rows.len(), stats)
            }
        };

        report.rows_written = written;
        report.rows_skipped = stats.skipped;
        note_cleaning(report, stats);
        Ok(())
    }
}

/// Fewer captured rows than this and the rendered table is tried as well.
const MIN_CAPTURED_ROWS: usize = 50;

/// Partial when a known target was not met, or when loading timed out with
/// no target to judge the rows against.
fn classify(rows: Vec<RawRow>, requested: Option<usize>, timed_out: bool) -> Extraction {
    match requested {
        Some(r) if rows.len() < r => Extraction::Partial {
            rows,
            requested: Some(r),
        },
        None if timed_out => Extraction::Partial {
            rows,
            requested: None,
        },
        _ => Extraction::Success(rows),
    }
}

/// Rows for `table` from the captured response with the most named rows.
/// Payloads without any of the table's own columns don't count.
fn best_captured_rows(captured: &[CapturedResponse], table: TableKind) -> Option<Vec<RawRow>> {
    captured
        .iter()
        .filter_map(|c| locate_json_rows(&c.body, table))
        .filter(|rows| rows.iter().any(|r| has_table_columns(r, table)))
        .map(|rows| (rows.iter().filter(|r| r.name.is_some()).count(), rows))
        .filter(|(named, _)| *named > 0)
        .max_by_key(|(named, _)| *named)
        .map(|(_, rows)| rows)
}

fn has_table_columns(row: &RawRow, table: TableKind) -> bool {
    match table {
        TableKind::Rankings => [&row.overall, &row.teaching, &row.research_quality]
            .iter()
            .any(|v| v.is_some()),
        TableKind::KeyStatistics => [
            &row.fte_students,
            &row.students_per_staff,
            &row.international_students,
            &row.female_male_ratio,
        ]
        .iter()
        .any(|v| v.is_some()),
    }
}

async fn save_endpoints(driver: &dyn PageDriver, writer: &OutputWriter, year: i32) {
    let urls = match driver.captured_json().await {
        Ok(captured) => endpoint_urls(&captured),
        Err(e) => {
            warn!("{}: no endpoints to save: {}", year, e);
            return;
        }
    };
    if urls.is_empty() {
        info!("{}: no data endpoints seen", year);
        return;
    }
    if let Err(e) = writer.write_endpoints(year, &urls) {
        warn!("{}: could not save endpoints: {:#}", year, e);
    }
}

fn note_cleaning(report: &mut UnitReport, stats: CleanStats) {
    if stats.skipped > 0 {
        report.warn(format!("{} rows without a name skipped", stats.skipped));
    }
    if stats.nulled_fields > 0 {
        report.warn(format!("{} unparseable values nulled", stats.nulled_fields));
    }
}

fn failed(key: UnitKey, e: anyhow::Error) -> UnitReport {
    error!("{}: {:#}", key, e);
    UnitReport {
        status: UnitStatus::Failed(format!("{:#}", e)),
        ..UnitReport::new(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::models::{KEY_STAT_HEADERS, RankingRow};
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::collections::{BTreeMap, HashMap};
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn config(out_dir: &Path) -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.output.out_dir = out_dir.to_path_buf();
        cfg.run.years = vec![2025];
        cfg.run.full_counts = BTreeMap::new();
        cfg.browser.poll_interval_ms = 2000;
        cfg.browser.scroll_wait_secs = 10;
        cfg
    }

    fn report<'a>(summary: &'a RunSummary, table: TableKind) -> &'a UnitReport {
        summary
            .units
            .iter()
            .find(|u| u.key.table == table)
            .unwrap()
    }

    // ── API path ──────────────────────────────────────────────────────────────

    struct FakeApi {
        tables: HashMap<(i32, String, TableKind), Result<Value, u16>>,
    }

    #[async_trait]
    impl RankingApi for FakeApi {
        async fn fetch_table(
            &self,
            year: i32,
            category: &Category,
            table: TableKind,
        ) -> Result<Option<Value>, ScrapeError> {
            match self.tables.get(&(year, category.to_string(), table)) {
                None => Ok(None),
                Some(Ok(v)) => Ok(Some(v.clone())),
                Some(Err(status)) => Err(FetchError::Status {
                    status: *status,
                    url: "fake".into(),
                }
                .into()),
            }
        }
    }

    fn ranking_payload() -> Value {
        json!({"data": [
            {"rank": "1", "name": "University of Oxford", "scores_overall": "98.5",
             "scores_teaching": "96.8"},
            {"rank": "=12", "name": "Yale University", "scores_overall": "91.2"},
            {"rank": "13", "name": "", "scores_overall": "90.0"},
        ]})
    }

    #[tokio::test]
    async fn test_api_run_writes_partitions_and_reports_missing_key_stats() {
        let dir = tempfile::tempdir().unwrap();
        let api = FakeApi {
            tables: HashMap::from([(
                (2025, "general".to_string(), TableKind::Rankings),
                Ok(ranking_payload()),
            )]),
        };

        let summary = Pipeline::new(config(dir.path())).run_api(&api).await.unwrap();
        assert_eq!(summary.units.len(), 2);

        let rankings = report(&summary, TableKind::Rankings);
        assert_eq!(rankings.status, UnitStatus::Complete);
        assert_eq!(rankings.rows_written, 2);
        assert_eq!(rankings.rows_skipped, 1);
        assert_eq!(rankings.mark(), '✓');

        let json_path = dir.path().join("json/general/THE_2025_rankings.json");
        let rows: Vec<RankingRow> =
            serde_json::from_slice(&std::fs::read(json_path).unwrap()).unwrap();
        assert_eq!(rows[1].rank, Some(12));
        assert_eq!(rows[1].rank_prefix.as_deref(), Some("="));

        let key_stats = report(&summary, TableKind::KeyStatistics);
        assert_eq!(key_stats.status, UnitStatus::NotFound);
        assert_eq!(key_stats.warnings.len(), 1);
        assert!(key_stats.warnings[0].contains("Key statistics"));
        let csv = std::fs::read_to_string(
            dir.path().join("csv/general/THE_2025_key_statistics.csv"),
        )
        .unwrap();
        assert_eq!(csv.trim_end(), KEY_STAT_HEADERS.join(","));
    }

    #[tokio::test]
    async fn test_failing_unit_does_not_abort_batch() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.run.years = vec![2024, 2025];
        let api = FakeApi {
            tables: HashMap::from([
                ((2024, "general".to_string(), TableKind::Rankings), Err(503)),
                (
                    (2025, "general".to_string(), TableKind::Rankings),
                    Ok(ranking_payload()),
                ),
            ]),
        };

        let summary = Pipeline::new(cfg).run_api(&api).await.unwrap();
        assert_eq!(summary.units.len(), 4);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.units[0].mark(), '✗');
        assert!(!dir.path().join("csv/general/THE_2024_rankings.csv").exists());
        assert!(dir.path().join("csv/general/THE_2025_rankings.csv").exists());
        assert_eq!(summary.rows_written(), 2);
    }

    #[tokio::test]
    async fn test_api_limit_truncates_and_subjects_get_own_partition() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.run.limit = Some(1);
        cfg.run.subjects = vec!["law".into()];
        let api = FakeApi {
            tables: HashMap::from([
                (
                    (2025, "general".to_string(), TableKind::Rankings),
                    Ok(ranking_payload()),
                ),
                (
                    (2025, "subject/law".to_string(), TableKind::Rankings),
                    Ok(ranking_payload()),
                ),
            ]),
        };

        let summary = Pipeline::new(cfg).run_api(&api).await.unwrap();
        assert_eq!(summary.units.len(), 4);
        assert_eq!(report(&summary, TableKind::Rankings).rows_written, 1);
        assert!(dir.path().join("csv/subject/THE_2025_law_rankings.csv").exists());
    }

    // ── Browser path ──────────────────────────────────────────────────────────

    struct FakePage {
        html: String,
        /// Visible row counts per poll; the last one repeats.
        counts: Vec<usize>,
        /// 1-based count call that times out instead.
        fail_on: Option<usize>,
        calls: AtomicUsize,
        tabs: Vec<&'static str>,
        captured: Vec<CapturedResponse>,
        opened: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PageDriver for FakePage {
        async fn open(&self, url: &str) -> Result<(), ScrapeError> {
            self.opened.lock().unwrap().push(url.to_string());
            Ok(())
        }

        async fn activate_tab(&self, label: &str) -> Result<bool, ScrapeError> {
            Ok(self.tabs.contains(&label))
        }

        async fn load_more(&self) -> Result<(), ScrapeError> {
            Ok(())
        }

        async fn count_rows(&self) -> Result<usize, ScrapeError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on == Some(call) {
                return Err(ScrapeError::Timeout(Duration::from_secs(60)));
            }
            Ok(self.counts[(call - 1).min(self.counts.len() - 1)])
        }

        async fn content(&self) -> Result<String, ScrapeError> {
            Ok(self.html.clone())
        }

        async fn captured_json(&self) -> Result<Vec<CapturedResponse>, ScrapeError> {
            Ok(self.captured.clone())
        }
    }

    struct NoPause;

    #[async_trait]
    impl Pause for NoPause {
        async fn pause(&self, _duration: Duration) {}
    }

    fn rankings_page(rows: usize) -> String {
        let body: String = (1..=rows)
            .map(|i| {
                let rank = if i == 12 { "=12".to_string() } else { i.to_string() };
                format!(
                    "<tr><td>{rank}</td><td><a>University {i}</a> Somewhere</td>\
                     <td>{:.1}</td><td>50.0</td></tr>",
                    100.0 - i as f64 / 10.0
                )
            })
            .collect();
        format!(
            r##"<html><body>
            <ul><li><a href="#rankings-panel">Rankings</a></li></ul>
            <div id="rankings-panel"><table>
              <thead><tr><th>Rank</th><th>Name</th><th>Overall</th><th>Teaching</th></tr></thead>
              <tbody>{body}</tbody>
            </table></div>
            </body></html>"##
        )
    }

    fn page(rows: usize, visible_rows: usize) -> FakePage {
        FakePage {
            html: rankings_page(rows),
            counts: vec![visible_rows],
            fail_on: None,
            calls: AtomicUsize::new(0),
            tabs: vec!["Rankings"],
            captured: Vec::new(),
            opened: Mutex::new(Vec::new()),
        }
    }

    #[tokio::test]
    async fn test_browser_target_met_is_complete() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.run.limit = Some(35);
        let driver = page(35, 35);

        let summary = Pipeline::new(cfg)
            .run_browser(&driver, &NoPause)
            .await
            .unwrap();

        let rankings = report(&summary, TableKind::Rankings);
        assert_eq!(rankings.status, UnitStatus::Complete);
        assert_eq!(rankings.rows_written, 35);
        assert_eq!(
            driver.opened.lock().unwrap().as_slice(),
            ["https://www.timeshighereducation.com/world-university-rankings/2025/world-ranking"]
        );

        let mut reader =
            csv::Reader::from_path(dir.path().join("THE_Rankings_2025.csv")).unwrap();
        let rows: Vec<RankingRow> = reader.deserialize().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 35);
        assert_eq!(rows[11].rank, Some(12));
        assert_eq!(rows[11].rank_prefix.as_deref(), Some("="));
        assert_eq!(rows[0].name, "University 1");
    }

    #[tokio::test]
    async fn test_browser_capped_page_is_partial_with_missing_key_stats() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.run.full_counts = BTreeMap::from([("2025".to_string(), 3118)]);
        let driver = page(35, 35);

        let summary = Pipeline::new(cfg)
            .run_browser(&driver, &NoPause)
            .await
            .unwrap();

        let rankings = report(&summary, TableKind::Rankings);
        assert_eq!(
            rankings.status,
            UnitStatus::Partial {
                obtained: 35,
                requested: Some(3118)
            }
        );
        assert_eq!(rankings.rows_written, 35);
        assert_eq!(rankings.mark(), '⚠');
        assert!(rankings.warnings.iter().any(|w| w.contains("35/3118")));

        let key_stats = report(&summary, TableKind::KeyStatistics);
        assert_eq!(key_stats.status, UnitStatus::NotFound);
        assert!(key_stats.warnings.iter().any(|w| w.contains("no 'Key statistics' tab")));
        let csv = std::fs::read_to_string(dir.path().join("THE_KeyStatistics_2025.csv")).unwrap();
        assert_eq!(csv.lines().count(), 1);
        assert!(csv.starts_with("Year,"));
    }

    #[test]
    fn test_mark_threshold() {
        let unit = |status| UnitReport {
            status,
            ..UnitReport::new(UnitKey {
                year: 2025,
                category: Category::General,
                table: TableKind::Rankings,
            })
        };
        let partial = |obtained, requested| UnitStatus::Partial {
            obtained,
            requested: Some(requested),
        };

        assert_eq!(unit(partial(90, 100)).mark(), '✓');
        assert_eq!(unit(partial(89, 100)).mark(), '⚠');
        assert_eq!(unit(UnitStatus::NotFound).mark(), '⚠');
        assert_eq!(
            unit(UnitStatus::Partial {
                obtained: 500,
                requested: None
            })
            .mark(),
            '⚠'
        );
        assert_eq!(unit(UnitStatus::Failed("x".into())).mark(), '✗');
    }

    #[tokio::test]
    async fn test_count_timeout_mid_load_keeps_rendered_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.run.full_counts = BTreeMap::from([("2025".to_string(), 3118)]);
        let mut driver = page(35, 35);
        driver.fail_on = Some(3);

        let summary = Pipeline::new(cfg)
            .run_browser(&driver, &NoPause)
            .await
            .unwrap();

        let rankings = report(&summary, TableKind::Rankings);
        assert_eq!(
            rankings.status,
            UnitStatus::Partial {
                obtained: 35,
                requested: Some(3118)
            }
        );
        assert_eq!(rankings.rows_written, 35);
        assert!(
            rankings
                .warnings
                .iter()
                .any(|w| w.contains("stopped early") && w.contains("timed out"))
        );
        assert!(dir.path().join("THE_Rankings_2025.csv").exists());
        assert!(dir.path().join("THE_Rankings_2025.json").exists());
    }

    #[tokio::test]
    async fn test_unsettled_load_without_target_is_not_complete() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.run.years = vec![2011];
        let mut driver = page(35, 0);
        driver.counts = vec![5, 10, 15, 20, 25, 30, 35];

        let summary = Pipeline::new(cfg)
            .run_browser(&driver, &NoPause)
            .await
            .unwrap();

        let rankings = report(&summary, TableKind::Rankings);
        assert_eq!(
            rankings.status,
            UnitStatus::Partial {
                obtained: 35,
                requested: None
            }
        );
        assert_eq!(rankings.mark(), '⚠');
        assert_eq!(rankings.rows_written, 35);
        assert!(rankings.warnings.iter().any(|w| w.contains("timed out")));
        assert_eq!(rankings.status.to_string(), "partial 35 (timed out)");
    }

    fn captured_payload(rows: usize) -> CapturedResponse {
        let data: Vec<Value> = (1..=rows)
            .map(|i| {
                json!({
                    "rank": i.to_string(),
                    "name": format!("University {}", i),
                    "scores_overall": "80.0",
                    "stats_number_students": "12,000",
                    "stats_pc_intl_students": "25%",
                })
            })
            .collect();
        CapturedResponse {
            url: "https://example.org/the_data_rankings/world_university_rankings_2025.json".into(),
            body: json!({ "data": data }),
        }
    }

    #[tokio::test]
    async fn test_captured_json_wins_over_capped_dom() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.run.full_counts = BTreeMap::from([("2025".to_string(), 120)]);
        cfg.browser.save_endpoints = true;
        let mut driver = page(35, 35);
        driver.tabs = vec!["Rankings", "Key statistics"];
        driver.captured = vec![
            CapturedResponse {
                url: "https://example.org/api/config".into(),
                body: json!({"items": [{"id": 1}]}),
            },
            captured_payload(120),
        ];

        let summary = Pipeline::new(cfg)
            .run_browser(&driver, &NoPause)
            .await
            .unwrap();

        let rankings = report(&summary, TableKind::Rankings);
        assert_eq!(rankings.status, UnitStatus::Complete);
        assert_eq!(rankings.rows_written, 120);

        let key_stats = report(&summary, TableKind::KeyStatistics);
        assert_eq!(key_stats.status, UnitStatus::Complete);
        assert_eq!(key_stats.rows_written, 120);
        let csv = std::fs::read_to_string(dir.path().join("THE_KeyStatistics_2025.csv")).unwrap();
        assert!(csv.contains("2025,1,,University 1,12000,,25%,"));

        let endpoints = std::fs::read_to_string(dir.path().join("api_endpoints_2025.txt")).unwrap();
        assert_eq!(endpoints.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_small_capture_falls_back_to_page() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.run.limit = Some(35);
        let mut driver = page(35, 35);
        driver.captured = vec![captured_payload(10)];

        let summary = Pipeline::new(cfg)
            .run_browser(&driver, &NoPause)
            .await
            .unwrap();

        let rankings = report(&summary, TableKind::Rankings);
        assert_eq!(rankings.status, UnitStatus::Complete);
        assert_eq!(rankings.rows_written, 35);
        assert!(!dir.path().join("api_endpoints_2025.txt").exists());
    }
}
