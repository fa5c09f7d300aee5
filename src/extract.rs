use regex::Regex;

use crate::formats::{ArticleRecord, SecondaryTableRow};
use crate::layout::{CatalogLayout, ReportColumns};
use crate::source::{TableCell, TableRow};

/// Build a record from one catalog row. Never fails: every field falls back
/// to its default independently.
pub fn extract_record(row: &TableRow, layout: &CatalogLayout) -> ArticleRecord {
    let columns = &layout.columns;
    let labels = &layout.labels;
    let known_labels = [
        labels.content_type.as_str(),
        labels.is_editorial.as_str(),
        labels.word_count.as_str(),
    ];
    let details = row.cell(columns.details);

    ArticleRecord {
        id: parse_id(row.cell(columns.id)),
        source_url: first_link(row.cell(columns.title)),
        title: cell_text(row.cell(columns.title)),
        author: cell_text(row.cell(columns.author)),
        post_date: cell_text(row.cell(columns.post_date)),
        last_edited: cell_text(row.cell(columns.last_edited)),
        content_type: labeled_value(details, &labels.content_type, &known_labels),
        is_editorial: labeled_value(details, &labels.is_editorial, &known_labels),
        word_count: labeled_value(details, &labels.word_count, &known_labels),
        thumbnail_url: first_image(row.cell(columns.thumbnail)),
        ..ArticleRecord::default()
    }
}

pub fn extract_records(rows: &[TableRow], layout: &CatalogLayout) -> Vec<ArticleRecord> {
    rows.iter().map(|row| extract_record(row, layout)).collect()
}

pub fn extract_report_row(row: &TableRow, columns: &ReportColumns) -> SecondaryTableRow {
    SecondaryTableRow {
        id: parse_id(row.cell(columns.id)),
        post: cell_text(row.cell(columns.post)),
        creative_count: parse_count(row.cell(columns.creative_count)),
    }
}

fn cell_text(cell: Option<&TableCell>) -> String {
    cell.map(|cell| cell.text.trim().to_owned())
        .unwrap_or_default()
}

fn first_link(cell: Option<&TableCell>) -> String {
    cell.and_then(|cell| cell.links.first())
        .map(|href| href.trim().to_owned())
        .unwrap_or_default()
}

fn first_image(cell: Option<&TableCell>) -> String {
    cell.and_then(|cell| cell.images.first())
        .map(|src| src.trim().to_owned())
        .unwrap_or_default()
}

fn parse_id(cell: Option<&TableCell>) -> u64 {
    let text = cell_text(cell);
    text.trim_start_matches('#').trim().parse().unwrap_or(0)
}

fn parse_count(cell: Option<&TableCell>) -> u64 {
    let text = cell_text(cell).replace(',', "");
    text.parse().unwrap_or(0)
}

/// Characters that end a labeled value in an inline `A: x | B: y` blob.
const VALUE_SEPARATORS: &[char] = &['|', ';'];

/// Value after `label:` in the cell, or `""`. A value runs until a separator
/// or the next known label, so both one-label-per-node and inline blobs work.
/// Segments are tried first, then the whole cell text for labels whose value
/// sits in a separate node.
fn labeled_value(cell: Option<&TableCell>, label: &str, known_labels: &[&str]) -> String {
    let Some(cell) = cell else {
        return String::new();
    };
    let label = label.trim();
    if label.is_empty() {
        return String::new();
    }
    let Ok(start) = Regex::new(&format!(r"{}\s*:\s*", regex::escape(label))) else {
        return String::new();
    };
    let others = known_labels
        .iter()
        .map(|other| other.trim())
        .filter(|other| !other.is_empty() && *other != label)
        .map(regex::escape)
        .collect::<Vec<_>>();
    let next_label = if others.is_empty() {
        None
    } else {
        Regex::new(&format!(r"(?:{})\s*:", others.join("|"))).ok()
    };

    let value_in = |text: &str| -> Option<String> {
        let found = start.find(text)?;
        let rest = &text[found.end()..];
        let mut end = rest.find(VALUE_SEPARATORS).unwrap_or(rest.len());
        if let Some(next) = next_label.as_ref().and_then(|re| re.find(&rest[..end])) {
            end = next.start();
        }
        let value = rest[..end].trim();
        (!value.is_empty()).then(|| value.to_owned())
    };

    cell.segments
        .iter()
        .find_map(|segment| value_in(segment.as_str()))
        .or_else(|| value_in(&cell.text))
        .unwrap_or_default()
}
