//! Executive compensation extraction from proxy statement HTML.
//!
//! Proxy statements carry a "Summary Compensation Table" with one block of
//! rows per named executive and one row per fiscal year. Layouts vary a lot
//! between filers: spacer cells, `$` in their own cells, names and titles in
//! one cell or two, and `rowspan`ed names on the second and third year rows.
//! The parser copes with that by anchoring every row on its year cell and
//! mapping the cells after it onto the header's columns.

use async_trait::async_trait;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::debug;

use crate::error::{ExtractionError, ExtractionResult};
use crate::traits::extractor::{Document, DocumentKind, Extraction, Extractor};
use crate::types::{
    cik::Cik,
    record::{Amount, ExecutiveCompensation, ExtractedRecord, RecordFacts},
};

static RE_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)summary\s+compensation\s+table").unwrap());
static RE_TABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<table\b.*?</table>").unwrap());
static RE_ROW: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<tr\b[^>]*>(.*?)</tr>").unwrap());
static RE_CELL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<t[dh]\b[^>]*>(.*?)</t[dh]>").unwrap());
static RE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>|</p>|</div>").unwrap());
static RE_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static RE_YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(19|20)\d{2}$").unwrap());
static RE_FOOTNOTE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\(\d{1,2}\)\s*$").unwrap());

/// How many tables after the heading are tried before giving up.
const MAX_CANDIDATE_TABLES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Name,
    Year,
    Salary,
    Bonus,
    StockAwards,
    OptionAwards,
    NonEquityIncentive,
    Pension,
    Other,
    Total,
    Unknown,
}

impl Column {
    fn classify(header: &str) -> Self {
        let h = header.to_lowercase();
        if h.contains("name") {
            Column::Name
        } else if h == "year" || h.starts_with("year ") || h.contains("fiscal year") {
            Column::Year
        } else if h.contains("pension") || h.contains("nonqualified") {
            Column::Pension
        } else if h.contains("salary") {
            Column::Salary
        } else if h.contains("bonus") {
            Column::Bonus
        } else if h.contains("stock") {
            Column::StockAwards
        } else if h.contains("option") {
            Column::OptionAwards
        } else if h.contains("non-equity") || h.contains("incentive plan") {
            Column::NonEquityIncentive
        } else if h.contains("all other") || h.contains("other compensation") {
            Column::Other
        } else if h.starts_with("total") {
            Column::Total
        } else {
            Column::Unknown
        }
    }
}

/// Parses the Summary Compensation Table of a proxy statement.
#[derive(Debug, Clone, Default)]
pub struct CompensationTableExtractor;

impl CompensationTableExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Parse every executive row for `target_year` out of `html`.
    pub fn parse(html: &str, target_year: i32) -> ExtractionResult<Vec<ExecutiveCompensation>> {
        let heading = RE_HEADING
            .find(html)
            .ok_or_else(|| ExtractionError::Parse("no summary compensation table heading".into()))?;

        // The heading may also appear in the table of contents, so try a few
        // tables after it until one has a recognizable header row.
        for table in RE_TABLE
            .find_iter(&html[heading.start()..])
            .take(MAX_CANDIDATE_TABLES)
        {
            let rows = table_rows(table.as_str());
            if let Some(rows) = parse_table(&rows, target_year) {
                if rows.is_empty() {
                    return Err(ExtractionError::NoData { year: target_year });
                }
                return Ok(rows);
            }
        }

        Err(ExtractionError::Parse(
            "summary compensation table has no recognizable header".into(),
        ))
    }
}

/// Rows of a table as cleaned cell text, with empty and `$`-only cells
/// removed.
fn table_rows(table: &str) -> Vec<Vec<String>> {
    RE_ROW
        .captures_iter(table)
        .map(|row| {
            RE_CELL
                .captures_iter(&row[1])
                .map(|cell| cell_text(&cell[1]))
                .filter(|text| !text.is_empty() && text != "$")
                .collect::<Vec<_>>()
        })
        .filter(|cells| !cells.is_empty())
        .collect()
}

/// Visible text of a cell. Line breaks inside the cell become `\n`.
fn cell_text(html: &str) -> String {
    let with_breaks = RE_BREAK.replace_all(html, "\n");
    let text = RE_TAG.replace_all(&with_breaks, " ");
    let text = decode_entities(&text);
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&#160;", " ")
        .replace("&#xa0;", " ")
        .replace("\u{a0}", " ")
        .replace("&#36;", "$")
        .replace("&amp;", "&")
        .replace("&#8212;", "\u{2014}")
        .replace("&mdash;", "\u{2014}")
        .replace("&#8211;", "\u{2013}")
        .replace("&ndash;", "\u{2013}")
        .replace("&#8217;", "'")
        .replace("&rsquo;", "'")
}

/// `None` when the table has no header row; otherwise the target-year rows.
fn parse_table(rows: &[Vec<String>], target_year: i32) -> Option<Vec<ExecutiveCompensation>> {
    let header_idx = rows.iter().position(|cells| {
        let columns: Vec<Column> = cells.iter().map(|c| Column::classify(c)).collect();
        columns.contains(&Column::Salary) && columns.contains(&Column::Year)
    })?;
    let header: Vec<Column> = rows[header_idx]
        .iter()
        .map(|c| Column::classify(c))
        .collect();
    let header_year = header.iter().position(|c| *c == Column::Year)?;
    let value_columns = &header[header_year + 1..];

    let mut executives = Vec::new();
    let mut current: Option<(String, Option<String>)> = None;

    for cells in &rows[header_idx + 1..] {
        let Some(year_idx) = cells.iter().position(|c| RE_YEAR.is_match(c)) else {
            continue;
        };
        if year_idx > 0 {
            current = Some(split_name(&cells[..year_idx]));
        }
        let Some((name, title)) = &current else {
            continue;
        };
        if cells[year_idx].parse::<i32>().ok() != Some(target_year) {
            continue;
        }

        let mut comp = ExecutiveCompensation::new(name.clone());
        comp.title = title.clone();
        for (column, raw) in value_columns.iter().zip(&cells[year_idx + 1..]) {
            let amount = parse_amount(raw);
            match column {
                Column::Salary => comp.salary = amount,
                Column::Bonus => comp.bonus = amount,
                Column::StockAwards => comp.stock_awards = amount,
                Column::OptionAwards => comp.option_awards = amount,
                Column::NonEquityIncentive => comp.non_equity_incentive = amount,
                Column::Other => comp.other_compensation = amount,
                Column::Total => comp.total = amount,
                Column::Name | Column::Year | Column::Pension | Column::Unknown => {}
            }
        }
        if comp.has_amounts() {
            executives.push(comp);
        }
    }

    Some(executives)
}

/// Name and optional title from the cells left of the year.
fn split_name(cells: &[String]) -> (String, Option<String>) {
    let mut lines = cells.iter().flat_map(|c| c.lines()).map(str::trim);
    let name = lines.next().unwrap_or_default().to_string();
    let title = lines.collect::<Vec<_>>().join(" ");
    (name, (!title.is_empty()).then_some(title))
}

/// Parse a money cell. Dashes and blanks are absent, parenthesized
/// (negative) values are absent.
fn parse_amount(raw: &str) -> Option<Amount> {
    let text = RE_FOOTNOTE.replace(raw.trim(), "");
    let text = text.trim();
    if text.is_empty() || text.starts_with('(') || (text.starts_with('-') && text.len() > 1) {
        return None;
    }
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(&cleaned).ok().and_then(Amount::non_negative)
}

/// Share of rows whose components add up to the reported total.
fn consistency(rows: &[ExecutiveCompensation]) -> f32 {
    if rows.is_empty() {
        return 0.0;
    }
    let consistent = rows
        .iter()
        .filter(|r| {
            let Some(total) = r.total.map(|t| t.value()) else {
                return false;
            };
            let sum: Decimal = [
                r.salary,
                r.bonus,
                r.stock_awards,
                r.option_awards,
                r.non_equity_incentive,
                r.other_compensation,
            ]
            .iter()
            .flatten()
            .map(|a| a.value())
            .sum();
            // Pension changes are not parsed, so only an upper bound is checked.
            !total.is_zero() && sum <= total * Decimal::new(101, 2)
        })
        .count();
    consistent as f32 / rows.len() as f32
}

#[async_trait]
impl Extractor for CompensationTableExtractor {
    fn accepts(&self, kind: DocumentKind) -> bool {
        matches!(kind, DocumentKind::ProxyStatement | DocumentKind::AnnualReport)
    }

    async fn extract(
        &self,
        document: &Document,
        cik: &Cik,
        target_year: i32,
    ) -> ExtractionResult<Extraction> {
        let rows = Self::parse(&document.body, target_year)?;
        let confidence = 0.5 + 0.5 * consistency(&rows);
        debug!(
            cik = %cik,
            target_year,
            executives = rows.len(),
            confidence,
            "parsed summary compensation table"
        );

        let records = rows
            .into_iter()
            .map(|comp| {
                ExtractedRecord::new(
                    cik.clone(),
                    target_year,
                    RecordFacts::ExecutiveCompensation(comp),
                    document.source_id.clone(),
                )
                .with_confidence(confidence)
            })
            .collect();
        Ok(Extraction::new(records, confidence))
    }
}
