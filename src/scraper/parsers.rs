//! Table location: find the labelled table in a rendered page or the row
//! array in a JSON payload, and lift its rows into [`RawRow`]s.
//!
//! Everything matches on visible text or field names. The page layout moves
//! between releases, so nothing here depends on element position.

use crate::models::{RawRow, TableKind};
use crate::scraper::cleaner::normalise_text;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};
use tracing::debug;

// ── Columns ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Rank,
    Name,
    Overall,
    Teaching,
    ResearchEnvironment,
    ResearchQuality,
    Industry,
    InternationalOutlook,
    FteStudents,
    StudentsPerStaff,
    InternationalStudents,
    FemaleMaleRatio,
}

impl Column {
    fn slot(self, row: &mut RawRow) -> &mut Option<String> {
        match self {
            Column::Rank => &mut row.rank,
            Column::Name => &mut row.name,
            Column::Overall => &mut row.overall,
            Column::Teaching => &mut row.teaching,
            Column::ResearchEnvironment => &mut row.research_environment,
            Column::ResearchQuality => &mut row.research_quality,
            Column::Industry => &mut row.industry,
            Column::InternationalOutlook => &mut row.international_outlook,
            Column::FteStudents => &mut row.fte_students,
            Column::StudentsPerStaff => &mut row.students_per_staff,
            Column::InternationalStudents => &mut row.international_students,
            Column::FemaleMaleRatio => &mut row.female_male_ratio,
        }
    }

    /// Field names used by the THE JSON ranking tables, newest first.
    fn json_keys(self) -> &'static [&'static str] {
        match self {
            Column::Rank => &["rank"],
            Column::Name => &["name"],
            Column::Overall => &["scores_overall"],
            Column::Teaching => &["scores_teaching"],
            Column::ResearchEnvironment => &["scores_research_environment", "scores_research"],
            Column::ResearchQuality => &["scores_research_quality", "scores_citations"],
            Column::Industry => &["scores_industry", "scores_industry_income"],
            Column::InternationalOutlook => &["scores_international_outlook"],
            Column::FteStudents => &["stats_number_students"],
            Column::StudentsPerStaff => &["stats_student_staff_ratio"],
            Column::InternationalStudents => &["stats_pc_intl_students"],
            Column::FemaleMaleRatio => &["stats_female_male_ratio"],
        }
    }

    const ALL: [Column; 12] = [
        Column::Rank,
        Column::Name,
        Column::Overall,
        Column::Teaching,
        Column::ResearchEnvironment,
        Column::ResearchQuality,
        Column::Industry,
        Column::InternationalOutlook,
        Column::FteStudents,
        Column::StudentsPerStaff,
        Column::InternationalStudents,
        Column::FemaleMaleRatio,
    ];
}

/// Map a visible column header to a column.
fn column_for_header(header: &str) -> Option<Column> {
    let h = normalise_text(header).to_lowercase();

    if h.starts_with("rank") {
        Some(Column::Rank)
    } else if h.contains("name") || h.contains("institution") || h.contains("university") {
        Some(Column::Name)
    } else if h.contains("overall") {
        Some(Column::Overall)
    } else if h.contains("teaching") {
        Some(Column::Teaching)
    } else if h.contains("research environment") || h == "research" {
        Some(Column::ResearchEnvironment)
    } else if h.contains("research quality") || h.contains("citation") {
        Some(Column::ResearchQuality)
    } else if h.contains("industry") {
        Some(Column::Industry)
    } else if h.contains("international outlook") {
        Some(Column::InternationalOutlook)
    } else if h.contains("per staff") || h.contains("student staff") {
        Some(Column::StudentsPerStaff)
    } else if h.contains("fte") || h.contains("number of students") {
        Some(Column::FteStudents)
    } else if h.contains("international student") {
        Some(Column::InternationalStudents)
    } else if h.contains("female") {
        Some(Column::FemaleMaleRatio)
    } else {
        None
    }
}

/// Column order when a table has no header row.
fn positional_columns(kind: TableKind) -> &'static [Column] {
    match kind {
        TableKind::Rankings => &[
            Column::Rank,
            Column::Name,
            Column::Overall,
            Column::Teaching,
            Column::ResearchEnvironment,
            Column::ResearchQuality,
            Column::Industry,
            Column::InternationalOutlook,
        ],
        TableKind::KeyStatistics => &[
            Column::Rank,
            Column::Name,
            Column::FteStudents,
            Column::StudentsPerStaff,
            Column::InternationalStudents,
            Column::FemaleMaleRatio,
        ],
    }
}

fn has_signature(kind: TableKind, headers: &[String]) -> bool {
    let any = |needle: &str| headers.iter().any(|h| h.contains(needle));
    match kind {
        TableKind::Rankings => any("overall") || (any("teaching") && any("industry")),
        TableKind::KeyStatistics => {
            any("per staff") || any("female") || any("international student")
        }
    }
}

// ── HTML ──────────────────────────────────────────────────────────────────────

fn element_text(el: ElementRef<'_>) -> String {
    normalise_text(&el.text().collect::<Vec<_>>().join(" "))
}

fn label_matches(el: ElementRef<'_>, label: &str) -> bool {
    element_text(el).eq_ignore_ascii_case(label)
}

/// Locate the table for `kind` in a rendered page and extract its rows.
/// `None` means the section is not on the page.
pub fn locate_html_table(html: &str, kind: TableKind) -> Option<Vec<RawRow>> {
    let doc = Html::parse_document(html);

    let table = find_by_tab(&doc, kind)
        .or_else(|| find_by_caption(&doc, kind))
        .or_else(|| find_by_signature(&doc, kind));

    let Some(table) = table else {
        debug!("No '{}' table in page", kind.label());
        return None;
    };

    Some(extract_rows(table, kind))
}

/// Tab or heading whose text is the label, linked to a panel holding a table.
fn find_by_tab(doc: &Html, kind: TableKind) -> Option<ElementRef<'_>> {
    let Ok(tab_sel) = Selector::parse("[role=tab], a, button, li, h2, h3") else {
        return None;
    };
    let Ok(id_sel) = Selector::parse("[id]") else { return None };
    let Ok(table_sel) = Selector::parse("table") else { return None };

    for tab in doc.select(&tab_sel).filter(|el| label_matches(*el, kind.label())) {
        let target = tab
            .value()
            .attr("aria-controls")
            .or_else(|| tab.value().attr("href").and_then(|h| h.strip_prefix('#')))
            .filter(|id| !id.is_empty());

        if let Some(target) = target {
            let panel = doc
                .select(&id_sel)
                .find(|el| el.value().attr("id") == Some(target));
            if let Some(table) = panel.and_then(|p| p.select(&table_sel).next()) {
                return Some(table);
            }
            continue;
        }

        // Section heading: the table follows it among its siblings.
        let heading = matches!(tab.value().name(), "h2" | "h3");
        if heading {
            for sibling in tab.next_siblings().filter_map(ElementRef::wrap) {
                if matches!(sibling.value().name(), "h2" | "h3") {
                    break;
                }
                if sibling.value().name() == "table" {
                    return Some(sibling);
                }
                if let Some(table) = sibling.select(&table_sel).next() {
                    return Some(table);
                }
            }
        }
    }
    None
}

fn find_by_caption(doc: &Html, kind: TableKind) -> Option<ElementRef<'_>> {
    let Ok(table_sel) = Selector::parse("table") else { return None };
    let Ok(caption_sel) = Selector::parse("caption") else { return None };

    doc.select(&table_sel).find(|table| {
        let by_aria = table
            .value()
            .attr("aria-label")
            .map(|l| normalise_text(l).eq_ignore_ascii_case(kind.label()))
            .unwrap_or(false);
        by_aria
            || table
                .select(&caption_sel)
                .next()
                .map(|c| label_matches(c, kind.label()))
                .unwrap_or(false)
    })
}

fn find_by_signature(doc: &Html, kind: TableKind) -> Option<ElementRef<'_>> {
    let Ok(table_sel) = Selector::parse("table") else { return None };
    doc.select(&table_sel).find(|table| {
        let headers: Vec<String> = header_texts(*table)
            .into_iter()
            .map(|h| h.to_lowercase())
            .collect();
        has_signature(kind, &headers)
    })
}

fn header_texts(table: ElementRef<'_>) -> Vec<String> {
    let Ok(th_sel) = Selector::parse("thead th, thead td") else { return vec![] };
    let headers: Vec<String> = table.select(&th_sel).map(element_text).collect();
    if !headers.is_empty() {
        return headers;
    }

    // No thead: a first row made only of <th> cells is the header row.
    let Ok(tr_sel) = Selector::parse("tr") else { return vec![] };
    let Ok(cell_sel) = Selector::parse("td, th") else { return vec![] };
    table
        .select(&tr_sel)
        .next()
        .filter(|tr| tr.select(&cell_sel).all(|c| c.value().name() == "th"))
        .map(|tr| tr.select(&cell_sel).map(element_text).collect())
        .unwrap_or_default()
}

fn extract_rows(table: ElementRef<'_>, kind: TableKind) -> Vec<RawRow> {
    let headers = header_texts(table);
    let columns: Vec<Option<Column>> = if headers.is_empty() {
        positional_columns(kind).iter().copied().map(Some).collect()
    } else {
        headers.iter().map(|h| column_for_header(h)).collect()
    };

    let Ok(tr_sel) = Selector::parse("tbody tr") else { return vec![] };
    let Ok(cell_sel) = Selector::parse("td, th") else { return vec![] };
    let Ok(link_sel) = Selector::parse("a") else { return vec![] };

    let mut rows = Vec::new();
    for tr in table.select(&tr_sel) {
        let cells: Vec<ElementRef<'_>> = tr.select(&cell_sel).collect();

        // Header rows without a thead end up in tbody.
        if cells.iter().all(|c| c.value().name() == "th") && !headers.is_empty() {
            continue;
        }

        let mut row = RawRow::default();
        let mut any = false;
        for (cell, column) in cells.iter().zip(columns.iter()) {
            let Some(column) = column else { continue };

            // Institution cells carry the location under the link.
            let text = if *column == Column::Name {
                cell.select(&link_sel)
                    .map(element_text)
                    .find(|t| !t.is_empty())
                    .unwrap_or_else(|| element_text(*cell))
            } else {
                element_text(*cell)
            };

            any |= !text.is_empty();
            *column.slot(&mut row) = Some(text);
        }

        if any {
            rows.push(row);
        }
    }
    rows
}

// ── JSON ──────────────────────────────────────────────────────────────────────

/// Locate the row array for `kind` in a JSON payload.
/// Accepts `{"data": [...]}`, a bare array, a key named after the table, or
/// the first array of objects under any other key.
pub fn locate_json_rows(value: &Value, kind: TableKind) -> Option<Vec<RawRow>> {
    let items = json_row_array(value, kind)?;
    Some(
        items
            .iter()
            .filter_map(Value::as_object)
            .map(raw_from_json)
            .collect(),
    )
}

fn json_row_array(value: &Value, kind: TableKind) -> Option<&Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        Value::Object(map) => {
            match map.get(kind.slug()) {
                Some(Value::Array(items)) => return Some(items),
                Some(inner @ Value::Object(_)) => return json_row_array(inner, kind),
                _ => {}
            }
            if let Some(Value::Array(items)) = map.get("data") {
                return Some(items);
            }

            let other = TableKind::ALL
                .into_iter()
                .find(|k| *k != kind)
                .map(TableKind::slug);
            map.iter()
                .filter(|(key, _)| Some(key.as_str()) != other)
                .find_map(|(_, v)| match v {
                    Value::Array(items) if items.iter().any(Value::is_object) => Some(items),
                    _ => None,
                })
        }
        _ => None,
    }
}

fn json_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn raw_from_json(obj: &Map<String, Value>) -> RawRow {
    let mut row = RawRow::default();
    for column in Column::ALL {
        let value = column
            .json_keys()
            .iter()
            .find_map(|k| obj.get(*k).and_then(json_text));
        *column.slot(&mut row) = value;
    }
    row
}
