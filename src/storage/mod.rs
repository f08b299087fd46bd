use crate::models::{Category, KeyStatRow, RankingRow, TableKind, TabularRow, UnitKey};
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

// ── Layout ────────────────────────────────────────────────────────────────────

/// How output files are named and partitioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// `THE_Rankings_2025.csv` next to each other (browser path).
    Flat,
    /// `csv/general/THE_2025_rankings.csv`, `json/subject/...` (API path).
    Partitioned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub csv: PathBuf,
    pub json: PathBuf,
}

// ── Writer ────────────────────────────────────────────────────────────────────

pub struct OutputWriter {
    out_dir: PathBuf,
    layout: Layout,
}

impl OutputWriter {
    pub fn new(out_dir: impl Into<PathBuf>, layout: Layout) -> Self {
        Self {
            out_dir: out_dir.into(),
            layout,
        }
    }

    /// Deterministic file locations for one unit.
    pub fn paths(&self, key: &UnitKey) -> OutputPaths {
        match self.layout {
            Layout::Flat => {
                let stem = match key.table {
                    TableKind::Rankings => format!("THE_Rankings_{}", key.year),
                    TableKind::KeyStatistics => format!("THE_KeyStatistics_{}", key.year),
                };
                OutputPaths {
                    csv: self.out_dir.join(format!("{}.csv", stem)),
                    json: self.out_dir.join(format!("{}.json", stem)),
                }
            }
            Layout::Partitioned => {
                let stem = match &key.category {
                    Category::General => format!("THE_{}_{}", key.year, key.table.slug()),
                    Category::Subject(slug) => {
                        format!("THE_{}_{}_{}", key.year, slug, key.table.slug())
                    }
                };
                let partition = key.category.partition();
                OutputPaths {
                    csv: self
                        .out_dir
                        .join("csv")
                        .join(partition)
                        .join(format!("{}.csv", stem)),
                    json: self
                        .out_dir
                        .join("json")
                        .join(partition)
                        .join(format!("{}.json", stem)),
                }
            }
        }
    }

    /// Write one CSV (header first, even with no rows) and one JSON array.
    /// Overwrites whatever a previous run left for the same key.
    pub fn write<R: TabularRow>(&self, key: &UnitKey, rows: &[R]) -> Result<OutputPaths> {
        debug_assert_eq!(R::KIND, key.table);
        let paths = self.paths(key);

        let csv_bytes = render_csv(rows)?;
        let json_bytes = serde_json::to_vec_pretty(rows).context("JSON serialization failed")?;

        write_atomic(&paths.csv, &csv_bytes)?;
        write_atomic(&paths.json, &json_bytes)?;

        info!("{}: {} rows → {}", key, rows.len(), paths.csv.display());
        Ok(paths)
    }

    /// Data endpoints the rankings page called, one URL per line, for
    /// pointing the API path at them later.
    pub fn write_endpoints(&self, year: i32, urls: &[String]) -> Result<PathBuf> {
        let path = self.out_dir.join(format!("api_endpoints_{}.txt", year));
        let mut text = urls.join("\n");
        text.push('\n');
        write_atomic(&path, text.as_bytes())?;
        info!("{}: {} endpoints → {}", year, urls.len(), path.display());
        Ok(path)
    }

    /// Header-only output for a table that could not be found.
    pub fn write_empty(&self, key: &UnitKey) -> Result<OutputPaths> {
        match key.table {
            TableKind::Rankings => self.write::<RankingRow>(key, &[]),
            TableKind::KeyStatistics => self.write::<KeyStatRow>(key, &[]),
        }
    }
}

fn render_csv<R: TabularRow>(rows: &[R]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    writer.write_record(R::KIND.headers())?;
    for row in rows {
        writer
            .serialize(row)
            .with_context(|| format!("CSV serialization failed for {}", row.name()))?;
    }

    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("CSV flush failed: {}", e))
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Write via a temp sibling + rename so readers never see half a file.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Could not create dir {:?}", parent))?;
    }

    let tmp = tmp_path(path);
    {
        let mut file =
            fs::File::create(&tmp).with_context(|| format!("Could not create {:?}", tmp))?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path).with_context(|| format!("Could not move {:?} into place", path))?;
    Ok(())
}
