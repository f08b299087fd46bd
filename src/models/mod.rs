use serde::{Deserialize, Serialize};
use std::fmt;

// ── Table kind ────────────────────────────────────────────────────────────────

/// The two labelled sub-tables THE publishes for every ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Rankings,
    KeyStatistics,
}

impl TableKind {
    pub const ALL: [TableKind; 2] = [TableKind::Rankings, TableKind::KeyStatistics];

    /// Visible tab label on the rankings page.
    pub fn label(self) -> &'static str {
        match self {
            TableKind::Rankings => "Rankings",
            TableKind::KeyStatistics => "Key statistics",
        }
    }

    /// Snake-case name used in API paths and partitioned file names.
    pub fn slug(self) -> &'static str {
        match self {
            TableKind::Rankings => "rankings",
            TableKind::KeyStatistics => "key_statistics",
        }
    }

    pub fn headers(self) -> &'static [&'static str] {
        match self {
            TableKind::Rankings => RANKING_HEADERS,
            TableKind::KeyStatistics => KEY_STAT_HEADERS,
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ── Category ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    General,
    Subject(String),
}

impl Category {
    /// Directory name in the partitioned output layout.
    pub fn partition(&self) -> &'static str {
        match self {
            Category::General => "general",
            Category::Subject(_) => "subject",
        }
    }

    pub fn subject_slug(&self) -> Option<&str> {
        match self {
            Category::General => None,
            Category::Subject(slug) => Some(slug),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::General => f.write_str("general"),
            Category::Subject(slug) => write!(f, "subject/{}", slug),
        }
    }
}

/// One output partition: exactly one CSV + one JSON file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnitKey {
    pub year: i32,
    pub category: Category,
    pub table: TableKind,
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.year, self.category, self.table.slug())
    }
}

// ── Normalized rows ───────────────────────────────────────────────────────────

pub const RANKING_HEADERS: &[&str] = &[
    "Year",
    "Rank",
    "Rank Prefix",
    "Name",
    "Overall",
    "Teaching",
    "Research Environment",
    "Research Quality",
    "Industry",
    "International Outlook",
];

pub const KEY_STAT_HEADERS: &[&str] = &[
    "Year",
    "Rank",
    "Rank Prefix",
    "Name",
    "No. of FTE students",
    "No. of students per staff",
    "International students",
    "Female:Male ratio",
];

/// Field order must match [`RANKING_HEADERS`]; the CSV writer relies on it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankingRow {
    #[serde(rename = "Year")]
    pub year: i32,
    #[serde(rename = "Rank")]
    pub rank: Option<i64>,
    #[serde(rename = "Rank Prefix")]
    pub rank_prefix: Option<String>,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Overall")]
    pub overall: Option<f64>,
    #[serde(rename = "Teaching")]
    pub teaching: Option<f64>,
    #[serde(rename = "Research Environment")]
    pub research_environment: Option<f64>,
    #[serde(rename = "Research Quality")]
    pub research_quality: Option<f64>,
    #[serde(rename = "Industry")]
    pub industry: Option<f64>,
    #[serde(rename = "International Outlook")]
    pub international_outlook: Option<f64>,
}

/// Field order must match [`KEY_STAT_HEADERS`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeyStatRow {
    #[serde(rename = "Year")]
    pub year: i32,
    #[serde(rename = "Rank")]
    pub rank: Option<i64>,
    #[serde(rename = "Rank Prefix")]
    pub rank_prefix: Option<String>,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "No. of FTE students")]
    pub fte_students: Option<i64>,
    #[serde(rename = "No. of students per staff")]
    pub students_per_staff: Option<f64>,
    #[serde(rename = "International students", default)]
    pub international_students: String,
    #[serde(rename = "Female:Male ratio", default)]
    pub female_male_ratio: String,
}

/// Rows the writer knows how to lay out.
pub trait TabularRow: Serialize {
    const KIND: TableKind;

    fn name(&self) -> &str;
}

impl TabularRow for RankingRow {
    const KIND: TableKind = TableKind::Rankings;

    fn name(&self) -> &str {
        &self.name
    }
}

impl TabularRow for KeyStatRow {
    const KIND: TableKind = TableKind::KeyStatistics;

    fn name(&self) -> &str {
        &self.name
    }
}

// ── Raw rows ──────────────────────────────────────────────────────────────────

/// One source row before cleaning. Filled from HTML cells (matched by header
/// label) or JSON fields; columns the source lacks stay `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    pub rank: Option<String>,
    pub name: Option<String>,
    pub overall: Option<String>,
    pub teaching: Option<String>,
    pub research_environment: Option<String>,
    pub research_quality: Option<String>,
    pub industry: Option<String>,
    pub international_outlook: Option<String>,
    pub fte_students: Option<String>,
    pub students_per_staff: Option<String>,
    pub international_students: Option<String>,
    pub female_male_ratio: Option<String>,
}

// ── Extraction outcome ────────────────────────────────────────────────────────

/// What a fetch + locate step produced for one unit.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Success(Vec<RawRow>),
    /// Fewer rows than requested, or a load that timed out before the row
    /// count settled (`requested: None`).
    Partial {
        rows: Vec<RawRow>,
        requested: Option<usize>,
    },
    NotFound,
}
