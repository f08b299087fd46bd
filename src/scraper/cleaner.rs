use crate::error::ScrapeError;
use crate::models::{KeyStatRow, RankingRow, RawRow};
use tracing::{debug, warn};

// ── Parsers ───────────────────────────────────────────────────────────────────

fn is_placeholder(s: &str) -> bool {
    matches!(s, "" | "-" | "—" | "–" | "n/a" | "N/A" | "NA" | "null")
}

/// Strict numeric parse. `Ok(None)` for blank or placeholder text, `Err` for
/// anything else that is not a finite number.
/// "20,965" → 20965.0 | " 94.8 " → 94.8 | "—" → None | "48.2–54.9" → Err
pub fn try_parse_number(field: &'static str, s: &str) -> Result<Option<f64>, ScrapeError> {
    let cleaned: String = s
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();

    if is_placeholder(&cleaned) {
        return Ok(None);
    }

    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(ScrapeError::Parse {
            field,
            value: s.to_string(),
        }),
    }
}

/// Lenient numeric parse: failures become `None`.
pub fn parse_number(s: &str) -> Option<f64> {
    try_parse_number("number", s).unwrap_or(None)
}

/// Integral count, e.g. FTE students. "20,965" → 20965 | "12.5" → None
pub fn parse_count(s: &str) -> Option<i64> {
    parse_number(s)
        .filter(|v| v.fract() == 0.0 && v.abs() < i64::MAX as f64)
        .map(|v| v as i64)
}

/// Split a rank into its tie prefix and numeric value.
/// "=12" → (Some("="), Some(12)) | "7" → (None, Some(7))
/// "201–250" → (None, Some(201)) | "Reporter" → (None, None)
pub fn parse_rank(s: &str) -> (Option<String>, Option<i64>) {
    let s = s.trim();
    let digits_at = match s.find(|c: char| c.is_ascii_digit()) {
        Some(i) => i,
        None => return (None, None),
    };

    let prefix = s[..digits_at].trim();
    let number: String = s[digits_at..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == ',')
        .filter(|c| *c != ',')
        .collect();

    let prefix = if prefix.is_empty() {
        None
    } else {
        Some(prefix.to_string())
    };
    (prefix, number.parse().ok())
}

/// Collapse internal whitespace runs and trim.
pub fn normalise_text(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ── Cleaning stats ────────────────────────────────────────────────────────────

/// Per-table tallies surfaced in the run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanStats {
    /// Rows dropped because they had no name.
    pub skipped: usize,
    /// Numeric fields that could not be parsed and were nulled.
    pub nulled_fields: usize,
}

/// Parses a numeric field, nulling and counting it on failure.
fn numeric(field: &'static str, raw: &Option<String>, stats: &mut CleanStats) -> Option<f64> {
    let raw = raw.as_deref()?;
    match try_parse_number(field, raw) {
        Ok(v) => v,
        Err(e) => {
            debug!("{}", e);
            stats.nulled_fields += 1;
            None
        }
    }
}

fn required_name(raw: &RawRow) -> Option<String> {
    let name = normalise_text(raw.name.as_deref()?);
    if name.is_empty() { None } else { Some(name) }
}

fn rank_parts(raw: &RawRow) -> (Option<String>, Option<i64>) {
    raw.rank.as_deref().map(parse_rank).unwrap_or((None, None))
}

// ── RawRow → RankingRow ───────────────────────────────────────────────────────

pub fn raw_to_ranking_row(year: i32, raw: &RawRow, stats: &mut CleanStats) -> Option<RankingRow> {
    let name = required_name(raw)?;
    let (rank_prefix, rank) = rank_parts(raw);

    Some(RankingRow {
        year,
        rank,
        rank_prefix,
        name,
        overall: numeric("overall", &raw.overall, stats),
        teaching: numeric("teaching", &raw.teaching, stats),
        research_environment: numeric("research_environment", &raw.research_environment, stats),
        research_quality: numeric("research_quality", &raw.research_quality, stats),
        industry: numeric("industry", &raw.industry, stats),
        international_outlook: numeric("international_outlook", &raw.international_outlook, stats),
    })
}

pub fn clean_ranking_rows(year: i32, raws: &[RawRow]) -> (Vec<RankingRow>, CleanStats) {
    let mut stats = CleanStats::default();
    let mut rows = Vec::with_capacity(raws.len());

    for raw in raws {
        match raw_to_ranking_row(year, raw, &mut stats) {
            Some(row) => rows.push(row),
            None => stats.skipped += 1,
        }
    }

    if stats.skipped > 0 {
        warn!("{}: dropped {} ranking rows without a name", year, stats.skipped);
    }
    (rows, stats)
}

// ── RawRow → KeyStatRow ───────────────────────────────────────────────────────

pub fn raw_to_key_stat_row(year: i32, raw: &RawRow, stats: &mut CleanStats) -> Option<KeyStatRow> {
    let name = required_name(raw)?;
    let (rank_prefix, rank) = rank_parts(raw);

    let fte_students = raw.fte_students.as_deref().and_then(|s| {
        let v = parse_count(s);
        if v.is_none() && !is_placeholder(s.trim()) {
            stats.nulled_fields += 1;
        }
        v
    });

    Some(KeyStatRow {
        year,
        rank,
        rank_prefix,
        name,
        fte_students,
        students_per_staff: numeric("students_per_staff", &raw.students_per_staff, stats),
        international_students: raw
            .international_students
            .as_deref()
            .map(normalise_text)
            .unwrap_or_default(),
        female_male_ratio: raw
            .female_male_ratio
            .as_deref()
            .map(normalise_text)
            .unwrap_or_default(),
    })
}

pub fn clean_key_stat_rows(year: i32, raws: &[RawRow]) -> (Vec<KeyStatRow>, CleanStats) {
    let mut stats = CleanStats::default();
    let mut rows = Vec::with_capacity(raws.len());

    for raw in raws {
        match raw_to_key_stat_row(year, raw, &mut stats) {
            Some(row) => rows.push(row),
            None => stats.skipped += 1,
        }
    }

    if stats.skipped > 0 {
        warn!("{}: dropped {} key-statistics rows without a name", year, stats.skipped);
    }
    (rows, stats)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
